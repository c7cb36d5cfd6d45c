//! Measurement LUT distributor.
//!
//! One shared aggregator collects measurement bits into a table address.
//! Each attached core has its own client state machine that answers the
//! core's fproc requests, either with the core's own measurement bit
//! (request id 0) or with the core's bit of the table entry once the
//! aggregator completes a round (any other id).

use strum::Display;
use tracing::debug;

use super::handshake::{FprocRequest, FprocResponse};
use super::system::SystemError;
use crate::bitmask;

/// Largest supported number of measurement lines.
pub const MAX_MEAS_LINES: u32 = 16;

/// Measurement lines presented by the external classifiers for one cycle.
/// Bit `i` of each word belongs to measurement line `i`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasInputs {
    pub meas: u32,
    pub valid: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LutConfig {
    pub n_meas: u32,
    /// Lines that must all be valid before the table is consulted.
    pub required_mask: u32,
    /// `2^n_meas` entries; bit `i` of an entry is the output for core `i`.
    pub table: Vec<u32>,
}

impl LutConfig {
    /// Every line required, every table entry zero.
    pub fn new(n_meas: u32) -> Self {
        Self {
            n_meas,
            required_mask: bitmask!(n_meas.min(MAX_MEAS_LINES)),
            table: vec![0; 1 << n_meas.min(MAX_MEAS_LINES)],
        }
    }

    fn validate(&self, n_cores: usize) -> Result<(), SystemError> {
        if self.n_meas > MAX_MEAS_LINES {
            return Err(SystemError::TooManyMeasLines(self.n_meas));
        }
        if (self.n_meas as usize) < n_cores {
            return Err(SystemError::TooFewMeasLines {
                n_meas: self.n_meas,
                n_cores,
            });
        }
        let lines: u32 = bitmask!(self.n_meas);
        if self.required_mask & !lines != 0 {
            return Err(SystemError::RequiredMaskOutOfRange {
                mask: self.required_mask,
                n_meas: self.n_meas,
            });
        }
        if self.table.len() != 1 << self.n_meas {
            return Err(SystemError::LutTableSize {
                expected: 1 << self.n_meas,
                actual: self.table.len(),
            });
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregatorState {
    #[default]
    Wait,
    Ready,
}

/// Shared accumulation of measurement bits into a table address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LutAggregator {
    config: LutConfig,
    state: AggregatorState,
    valid: u32,
    addr: u32,
}

impl LutAggregator {
    /// Only reachable through `FprocLut::new`, which validates `config`.
    pub(crate) fn new(config: LutConfig) -> Self {
        Self {
            config,
            state: AggregatorState::Wait,
            valid: 0,
            addr: 0,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// Accumulated (valid, address) registers.
    pub fn accumulated(&self) -> (u32, u32) {
        (self.valid, self.addr)
    }

    /// Table entry for the completed round, present only in `READY`.
    pub fn output(&self) -> Option<u32> {
        match self.state {
            AggregatorState::Ready => self.config.table.get(self.addr as usize).copied(),
            AggregatorState::Wait => None,
        }
    }

    pub fn latch(&mut self, meas: MeasInputs) {
        match self.state {
            AggregatorState::Wait => {
                let mask = self.config.required_mask;
                let arrived = meas.valid & mask;
                self.valid |= arrived;
                self.addr |= meas.meas & arrived;
                if mask != 0 && self.valid == mask {
                    debug!(addr = self.addr, "lut round complete");
                    self.state = AggregatorState::Ready;
                }
            }
            AggregatorState::Ready => {
                // measurements arriving during READY belong to no round
                self.valid = 0;
                self.addr = 0;
                self.state = AggregatorState::Wait;
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = AggregatorState::Wait;
        self.valid = 0;
        self.addr = 0;
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientState {
    #[default]
    Idle,
    WaitMeas,
    WaitLut,
}

/// Answers the fproc requests of one core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LutClient {
    core: usize,
    state: ClientState,
    id: u16,
}

impl LutClient {
    pub fn new(core: usize) -> Self {
        Self {
            core,
            state: ClientState::Idle,
            id: 0,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Request id latched when the client left `IDLE`.
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn latch(&mut self, request: FprocRequest, answered: bool) {
        match self.state {
            ClientState::Idle if request.enable => {
                self.id = request.id;
                self.state = if request.id == 0 {
                    ClientState::WaitMeas
                } else {
                    ClientState::WaitLut
                };
            }
            ClientState::WaitMeas | ClientState::WaitLut if answered => {
                self.state = ClientState::Idle;
            }
            _ => {}
        }
    }

    pub fn respond(&self, meas: MeasInputs, lut: Option<u32>) -> FprocResponse {
        let bit = |word: u32| (word >> self.core) & 1;
        match self.state {
            ClientState::WaitMeas if bit(meas.valid) == 1 => FprocResponse::ready(bit(meas.meas)),
            ClientState::WaitLut => lut.map(|entry| FprocResponse::ready(bit(entry))).unwrap_or_default(),
            _ => FprocResponse::default(),
        }
    }

    pub fn reset(&mut self) {
        self.state = ClientState::Idle;
        self.id = 0;
    }
}

/// The aggregator plus one client per attached core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FprocLut {
    aggregator: LutAggregator,
    clients: Vec<LutClient>,
    meas: MeasInputs,
    responses: Vec<FprocResponse>,
}

impl FprocLut {
    pub fn new(config: LutConfig, n_cores: usize) -> Result<Self, SystemError> {
        config.validate(n_cores)?;
        Ok(Self {
            aggregator: LutAggregator::new(config),
            clients: (0..n_cores).map(LutClient::new).collect(),
            meas: MeasInputs::default(),
            responses: vec![FprocResponse::default(); n_cores],
        })
    }

    /// Clock edge. `requests` are the cores' fproc lines of the ending cycle.
    pub fn latch(&mut self, requests: &[FprocRequest]) {
        self.aggregator.latch(self.meas);
        for ((client, request), response) in self
            .clients
            .iter_mut()
            .zip(requests)
            .zip(&self.responses)
        {
            client.latch(*request, response.ready);
        }
    }

    /// Settle the responses for this cycle's measurement lines.
    pub fn propagate(&mut self, meas: MeasInputs) {
        self.meas = meas;
        let lut = self.aggregator.output();
        for (client, response) in self.clients.iter().zip(self.responses.iter_mut()) {
            *response = client.respond(meas, lut);
        }
    }

    pub fn response(&self, core: usize) -> FprocResponse {
        self.responses[core]
    }

    pub fn responses(&self) -> &[FprocResponse] {
        &self.responses
    }

    pub fn aggregator(&self) -> &LutAggregator {
        &self.aggregator
    }

    pub fn client(&self, core: usize) -> &LutClient {
        &self.clients[core]
    }

    pub fn reset(&mut self) {
        self.aggregator.reset();
        self.clients.iter_mut().for_each(LutClient::reset);
        self.meas = MeasInputs::default();
        self.responses.fill(FprocResponse::default());
    }
}
