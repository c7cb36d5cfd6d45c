use std::fmt;

use crate::isa::{FieldWidths, InstrLayout, LayoutError};

/// What the control unit does when it decodes an unassigned opcode class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum UnknownOpcodePolicy {
    /// Stay in DECODE. The instruction register is not reloaded, so the core
    /// keeps re-decoding the same word and never advances.
    #[default]
    StallInDecode,
    /// Treat the word as a no-op and fetch the next instruction.
    FallThrough,
}

/// Design-time parameters of one processor core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProcConfig {
    pub widths: FieldWidths,
    /// Cycles FETCH_WAIT idles before loading the instruction register.
    /// Must cover the program memory's read latency (1 cycle).
    pub mem_read_latency: u32,
    pub unknown_opcode: UnknownOpcodePolicy,
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self {
            widths: FieldWidths::default(),
            mem_read_latency: 1,
            unknown_opcode: UnknownOpcodePolicy::default(),
        }
    }
}

impl ProcConfig {
    pub fn layout(&self) -> Result<InstrLayout, ConfigError> {
        if self.mem_read_latency == 0 {
            return Err(ConfigError::MemReadLatency);
        }
        Ok(InstrLayout::new(self.widths)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Layout(LayoutError),
    MemReadLatency,
}

impl From<LayoutError> for ConfigError {
    fn from(err: LayoutError) -> Self {
        ConfigError::Layout(err)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Layout(err) => write!(f, "invalid instruction layout: {err}"),
            ConfigError::MemReadLatency => {
                write!(f, "memory read latency must be at least one cycle")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Layout(err) => Some(err),
            ConfigError::MemReadLatency => None,
        }
    }
}
