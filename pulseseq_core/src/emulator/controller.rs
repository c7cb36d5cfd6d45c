use strum::{Display, EnumIter};

use crate::config::{ProcConfig, UnknownOpcodePolicy};
use crate::isa::{AluOp, Operand, Operation};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CtrlState {
    #[default]
    FetchWait,
    Decode,
    AluExec,
    IncQclkExec,
    JumpCondExec,
    AluFprocWait,
    JumpFprocWait,
    SyncWait,
}

/// Source of ALU input 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum In0Sel {
    Imm,
    Reg,
}

impl From<Operand> for In0Sel {
    fn from(operand: Operand) -> Self {
        match operand {
            Operand::Imm(_) => In0Sel::Imm,
            Operand::Reg(_) => In0Sel::Reg,
        }
    }
}

/// Source of ALU input 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum In1Sel {
    Reg,
    Qclk,
    Fproc,
}

/// Control signals for the core datapath.
/// Note: `Option::None` is used to represent a "don't care" value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Control {
    pub next_state: CtrlState,

    // Fetch Control
    pub instr_load: bool,   // Load the memory output into the instruction register.
    pub pc_inc: bool,       // Advance the program counter.
    pub pc_load: bool,      // Unconditional jump.
    pub pc_load_cond: bool, // Jump if bit 0 of the ALU result is set.

    // ALU Control
    pub alu_in0_sel: Option<In0Sel>,
    pub alu_in1_sel: Option<In1Sel>,
    pub alu_op: Option<AluOp>,

    // Write Control
    pub reg_write: bool,   // Register file write from the ALU result.
    pub qclk_load: bool,   // Timebase load from the ALU result.
    pub pulse_write: bool, // Commit the pulse fields the instruction enables.
    pub strobe_en: bool,   // Allow the strobe when the timebase matches.
    pub pulse_reset: bool, // One-cycle phase reset to the waveform generator.

    // Handshakes
    pub fproc_en: bool,
    pub sync_en: bool,
    pub done: bool,
}

impl Default for Control {
    fn default() -> Self {
        Self::goto(CtrlState::FetchWait)
    }
}

impl Control {
    /// No datapath activity, only a state change.
    pub fn goto(next_state: CtrlState) -> Self {
        Self {
            next_state,
            instr_load: false,
            pc_inc: false,
            pc_load: false,
            pc_load_cond: false,
            alu_in0_sel: None,
            alu_in1_sel: None,
            alu_op: None,
            reg_write: false,
            qclk_load: false,
            pulse_write: false,
            strobe_en: false,
            pulse_reset: false,
            fproc_en: false,
            sync_en: false,
            done: false,
        }
    }

    pub fn fetch() -> Self {
        Self {
            instr_load: true,
            pc_inc: true,
            ..Self::goto(CtrlState::Decode)
        }
    }

    pub fn alu(op: AluOp, in0: Operand, in1: In1Sel, next_state: CtrlState) -> Self {
        Self {
            alu_in0_sel: Some(in0.into()),
            alu_in1_sel: Some(in1),
            alu_op: Some(op),
            ..Self::goto(next_state)
        }
    }

    pub fn pulse(trigger: bool, time_match: bool) -> Self {
        if !trigger {
            return Self {
                pulse_write: true,
                ..Self::goto(CtrlState::FetchWait)
            };
        }
        // hold the instruction until the timebase reaches its command time
        Self {
            pulse_write: time_match,
            strobe_en: true,
            ..Self::goto(if time_match {
                CtrlState::FetchWait
            } else {
                CtrlState::Decode
            })
        }
    }

    pub fn fproc_wait(op: AluOp, in0: Operand, ready: bool, state: CtrlState) -> Self {
        let control = if ready {
            let exec = match state {
                CtrlState::JumpFprocWait => CtrlState::JumpCondExec,
                _ => CtrlState::AluExec,
            };
            Self::alu(op, in0, In1Sel::Fproc, exec)
        } else {
            Self::goto(state)
        };
        Self {
            fproc_en: true,
            ..control
        }
    }
}

/// Timing inputs the state machine branches on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CtrlInputs {
    /// Cycles already spent in FETCH_WAIT for this instruction.
    pub fetch_cycle: u32,
    pub time_match: bool,
    pub fproc_ready: bool,
    pub sync_ready: bool,
}

pub fn get_control_signals(
    state: CtrlState,
    operation: &Operation,
    inputs: CtrlInputs,
    config: &ProcConfig,
) -> Control {
    match state {
        CtrlState::FetchWait => {
            if inputs.fetch_cycle >= config.mem_read_latency {
                Control::fetch()
            } else {
                Control::goto(CtrlState::FetchWait)
            }
        }
        CtrlState::Decode => decode(operation, inputs, config.unknown_opcode),
        CtrlState::AluExec => Control {
            reg_write: true,
            ..Control::goto(CtrlState::FetchWait)
        },
        CtrlState::IncQclkExec => Control {
            qclk_load: true,
            ..Control::goto(CtrlState::FetchWait)
        },
        CtrlState::JumpCondExec => Control {
            pc_load_cond: true,
            ..Control::goto(CtrlState::FetchWait)
        },
        CtrlState::AluFprocWait | CtrlState::JumpFprocWait => match *operation {
            Operation::AluFproc { op, in0, .. } | Operation::JumpFproc { op, in0, .. } => {
                Control::fproc_wait(op, in0, inputs.fproc_ready, state)
            }
            // the instruction register does not change outside of FETCH_WAIT
            _ => Control::goto(CtrlState::FetchWait),
        },
        CtrlState::SyncWait => Control {
            sync_en: true,
            ..Control::goto(if inputs.sync_ready {
                CtrlState::FetchWait
            } else {
                CtrlState::SyncWait
            })
        },
    }
}

fn decode(operation: &Operation, inputs: CtrlInputs, policy: UnknownOpcodePolicy) -> Control {
    match *operation {
        Operation::PulseWrite { trigger, .. } => Control::pulse(trigger, inputs.time_match),
        Operation::RegAlu { op, in0, .. } => {
            Control::alu(op, in0, In1Sel::Reg, CtrlState::AluExec)
        }
        Operation::JumpI { .. } => Control {
            pc_load: true,
            ..Control::goto(CtrlState::FetchWait)
        },
        Operation::JumpCond { op, in0, .. } => {
            Control::alu(op, in0, In1Sel::Reg, CtrlState::JumpCondExec)
        }
        Operation::IncQclk { op, in0 } => {
            Control::alu(op, in0, In1Sel::Qclk, CtrlState::IncQclkExec)
        }
        Operation::AluFproc { .. } => Control {
            fproc_en: true,
            ..Control::goto(CtrlState::AluFprocWait)
        },
        Operation::JumpFproc { .. } => Control {
            fproc_en: true,
            ..Control::goto(CtrlState::JumpFprocWait)
        },
        Operation::Sync { .. } => Control {
            sync_en: true,
            ..Control::goto(CtrlState::SyncWait)
        },
        Operation::PulseReset => Control {
            pulse_reset: true,
            ..Control::goto(CtrlState::FetchWait)
        },
        Operation::Done => Control {
            done: true,
            ..Control::goto(CtrlState::Decode)
        },
        Operation::Unknown(_) => match policy {
            UnknownOpcodePolicy::StallInDecode => Control::goto(CtrlState::Decode),
            UnknownOpcodePolicy::FallThrough => Control::goto(CtrlState::FetchWait),
        },
    }
}
