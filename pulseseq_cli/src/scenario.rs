use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result, bail, eyre};
use pulseseq_core::{
    config::ProcConfig,
    emulator::{CoreState, LutConfig, MeasInputs, ProcSystem, PulseOutputs},
    isa::{InstrLayout, Instruction},
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A multi-core run described in JSON.
#[derive(Debug, Deserialize, Serialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: ProcConfig,
    /// Hex program file per core, relative to the scenario file.
    pub programs: Vec<PathBuf>,
    /// Defaults to one required line per core with an all-zero table.
    #[serde(default)]
    pub lut: Option<LutConfig>,
    /// Barrier participant mask. Defaults to every core.
    #[serde(default)]
    pub barrier: Option<u32>,
    #[serde(default)]
    pub meas_events: Vec<MeasEvent>,
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u64,
}

fn default_max_cycles() -> u64 {
    1_000_000
}

/// Measurement lines driven during one cycle.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct MeasEvent {
    pub cycle: u64,
    pub meas: u32,
    pub valid: u32,
}

#[derive(Debug, Serialize, Clone, Copy)]
pub struct StrobeEvent {
    pub cycle: u64,
    pub core: usize,
    pub outputs: PulseOutputs,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub cycles: u64,
    pub done: bool,
    pub strobes: Vec<StrobeEvent>,
    pub cores: Vec<CoreState>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("Failed to open scenario {}", path.display()))?;
        let mut scenario: Scenario = serde_json::from_reader(file)
            .wrap_err_with(|| format!("Failed to parse scenario {}", path.display()))?;

        let base = path.parent().unwrap_or(Path::new("."));
        for program in &mut scenario.programs {
            *program = base.join(&*program);
        }
        Ok(scenario)
    }

    pub fn build(&self) -> Result<ProcSystem> {
        let n_cores = self.programs.len();
        let lut = self
            .lut
            .clone()
            .unwrap_or_else(|| LutConfig::new(n_cores as u32));
        let mut system = ProcSystem::new(self.config, n_cores, lut)
            .wrap_err("Invalid system configuration")?;
        if let Some(mask) = self.barrier {
            system = system.with_barrier(mask);
        }

        for (index, path) in self.programs.iter().enumerate() {
            let core = system.core_mut(index);
            let program = read_program(path, core.layout())?;
            core.load_program(&program)
                .wrap_err_with(|| format!("Failed to load {}", path.display()))?;
        }
        Ok(system)
    }

    fn meas(&self, cycle: u64) -> MeasInputs {
        self.meas_events
            .iter()
            .filter(|event| event.cycle == cycle)
            .fold(MeasInputs::default(), |acc, event| MeasInputs {
                meas: acc.meas | event.meas,
                valid: acc.valid | event.valid,
            })
    }

    pub fn run(&self, max_cycles: Option<u64>) -> Result<RunReport> {
        let mut system = self.build()?;
        let max_cycles = max_cycles.unwrap_or(self.max_cycles);
        let mut strobes = Vec::new();

        while !system.done() && system.cycle() < max_cycles {
            let next = system.cycle() + 1;
            system.clock(self.meas(next));
            for (core, state) in system.cores().iter().enumerate() {
                let outputs = state.pulse_outputs();
                if outputs.cstrobe {
                    strobes.push(StrobeEvent {
                        cycle: system.cycle(),
                        core,
                        outputs,
                    });
                }
            }
        }

        let done = system.done();
        if done {
            info!(cycles = system.cycle(), "all cores done");
        } else {
            info!(cycles = system.cycle(), "cycle limit reached");
        }
        Ok(RunReport {
            cycles: system.cycle(),
            done,
            strobes,
            cores: system.cores().iter().map(|core| core.snapshot()).collect(),
        })
    }
}

/// One instruction word per line in hex, with an optional `0x` prefix.
/// Everything after `#` is a comment.
pub fn parse_program(source: &str, layout: &InstrLayout) -> Result<Vec<Instruction>> {
    let mut program = Vec::new();
    for (line_number, line) in source.lines().enumerate() {
        let word = line.split('#').next().unwrap_or_default().trim();
        if word.is_empty() {
            continue;
        }
        let digits = word.trim_start_matches("0x").replace('_', "");
        let raw = u128::from_str_radix(&digits, 16)
            .map_err(|err| eyre!("line {}: {err}: {word:?}", line_number + 1))?;
        if layout.widths.instr < u128::BITS && raw >> layout.widths.instr != 0 {
            bail!(
                "line {}: {word} is wider than {} bits",
                line_number + 1,
                layout.widths.instr
            );
        }
        program.push(Instruction::from_raw(raw));
    }
    Ok(program)
}

pub fn read_program(path: &Path, layout: &InstrLayout) -> Result<Vec<Instruction>> {
    let source = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read program {}", path.display()))?;
    parse_program(&source, layout).wrap_err_with(|| format!("Invalid program {}", path.display()))
}
