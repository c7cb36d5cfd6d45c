use std::fmt;

use tracing::trace_span;

use super::{
    proc_core::ProcCore,
    fproc_lut::{FprocLut, LutConfig, MeasInputs},
    handshake::{FprocRequest, SyncRequest},
    sync_barrier::SyncBarrier,
};
use crate::config::{ConfigError, ProcConfig};

/// Largest number of cores one LUT table entry and barrier mask can address.
pub const MAX_CORES: usize = u32::BITS as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemError {
    Config(ConfigError),
    NoCores,
    TooManyCores(usize),
    TooManyMeasLines(u32),
    TooFewMeasLines { n_meas: u32, n_cores: usize },
    RequiredMaskOutOfRange { mask: u32, n_meas: u32 },
    LutTableSize { expected: usize, actual: usize },
}

impl From<ConfigError> for SystemError {
    fn from(err: ConfigError) -> Self {
        SystemError::Config(err)
    }
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemError::Config(err) => write!(f, "{err}"),
            SystemError::NoCores => write!(f, "a system needs at least one core"),
            SystemError::TooManyCores(n) => {
                write!(f, "{n} cores requested but at most {MAX_CORES} are supported")
            }
            SystemError::TooManyMeasLines(n) => write!(f, "{n} measurement lines is too many"),
            SystemError::TooFewMeasLines { n_meas, n_cores } => write!(
                f,
                "{n_cores} cores need a measurement line each but only {n_meas} exist"
            ),
            SystemError::RequiredMaskOutOfRange { mask, n_meas } => write!(
                f,
                "required mask {mask:#b} names lines beyond the {n_meas} that exist"
            ),
            SystemError::LutTableSize { expected, actual } => {
                write!(f, "LUT table has {actual} entries, expected {expected}")
            }
        }
    }
}

impl std::error::Error for SystemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SystemError::Config(err) => Some(err),
            _ => None,
        }
    }
}

/// Several cores sharing one measurement LUT distributor and one sync
/// barrier, all stepped by the same clock.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcSystem {
    cores: Vec<ProcCore>,
    lut: FprocLut,
    barrier: SyncBarrier,
    cycle: u64,
}

impl ProcSystem {
    /// Every core takes part in the barrier.
    pub fn new(config: ProcConfig, n_cores: usize, lut: LutConfig) -> Result<Self, SystemError> {
        if n_cores == 0 {
            return Err(SystemError::NoCores);
        }
        if n_cores > MAX_CORES {
            return Err(SystemError::TooManyCores(n_cores));
        }
        let core = ProcCore::new(config)?;
        Ok(Self {
            cores: vec![core; n_cores],
            lut: FprocLut::new(lut, n_cores)?,
            barrier: SyncBarrier::new(u32::MAX >> (MAX_CORES - n_cores)),
            cycle: 0,
        })
    }

    /// Replace the barrier participant mask.
    pub fn with_barrier(mut self, participants: u32) -> Self {
        self.barrier = SyncBarrier::new(participants);
        self
    }

    pub fn cores(&self) -> &[ProcCore] {
        &self.cores
    }

    pub fn core(&self, index: usize) -> &ProcCore {
        &self.cores[index]
    }

    pub fn core_mut(&mut self, index: usize) -> &mut ProcCore {
        &mut self.cores[index]
    }

    pub fn lut(&self) -> &FprocLut {
        &self.lut
    }

    pub fn barrier(&self) -> &SyncBarrier {
        &self.barrier
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn done(&self) -> bool {
        self.cores.iter().all(ProcCore::done)
    }

    pub fn reset(&mut self) {
        self.lut.reset();
        self.barrier.reset();
        self.cores.iter_mut().for_each(ProcCore::reset);
        self.cycle = 0;
        self.propagate(MeasInputs::default());
    }

    /// Clock edge for every component.
    pub fn latch(&mut self) {
        let fproc: Vec<FprocRequest> = self.cores.iter().map(ProcCore::fproc_request).collect();
        let sync: Vec<SyncRequest> = self.cores.iter().map(ProcCore::sync_request).collect();
        self.lut.latch(&fproc);
        self.barrier.latch(&sync);
        for (index, core) in self.cores.iter_mut().enumerate() {
            let _span = trace_span!("core", index).entered();
            core.latch();
        }
        self.cycle += 1;
    }

    /// Settle the distributor and barrier outputs, then the cores that read them.
    pub fn propagate(&mut self, meas: MeasInputs) {
        self.lut.propagate(meas);
        for (index, core) in self.cores.iter_mut().enumerate() {
            core.set_fproc_response(self.lut.response(index));
            core.set_sync_ready(self.barrier.ready(index));
            core.propagate();
        }
    }

    /// One cycle, with `meas` on the measurement lines during the new cycle.
    pub fn clock(&mut self, meas: MeasInputs) {
        self.latch();
        self.propagate(meas);
    }

    /// Clock until every core is done. `meas` supplies the measurement lines
    /// for each cycle. Returns the cycle count, or `None` on timeout.
    pub fn clock_until_done(
        &mut self,
        max_cycles: u64,
        mut meas: impl FnMut(u64) -> MeasInputs,
    ) -> Option<u64> {
        for _ in 0..max_cycles {
            if self.done() {
                break;
            }
            let next = self.cycle + 1;
            self.clock(meas(next));
        }
        self.done().then_some(self.cycle)
    }
}
