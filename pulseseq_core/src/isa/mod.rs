mod instruction;
mod layout;
mod opcodes;

pub use instruction::{
    Instruction, InstructionBuildError, InstructionBuildErrorType, Operand, Operation,
    PulseField, PulseFields,
};
pub use layout::{DATA_WIDTH, Field, FieldWidths, InstrLayout, LayoutError, PulseFieldLayout};
pub use opcodes::{AluOp, OpClass};
