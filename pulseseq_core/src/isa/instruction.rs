use std::fmt;

use super::layout::{Field, InstrLayout, PulseFieldLayout};
use super::opcodes::{AluOp, OpClass};

/// A raw instruction word as it sits in program memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Instruction {
    instr: u128,
}

/// ALU input 0 is either an immediate or register read port 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    Imm(u32),
    Reg(u8),
}

/// One parameter of the pulse bundle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PulseField {
    pub write_en: bool,
    /// Take the value from register read port 0 instead of `value`.
    pub reg_sel: bool,
    pub value: u32,
}

impl PulseField {
    pub fn imm(value: u32) -> Self {
        Self {
            write_en: true,
            reg_sel: false,
            value,
        }
    }

    pub fn reg() -> Self {
        Self {
            write_en: true,
            reg_sel: true,
            value: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PulseFields {
    pub env_word: PulseField,
    pub phase: PulseField,
    pub freq: PulseField,
    pub amp: PulseField,
    pub cfg: PulseField,
}

/// An instruction word decoded against its opcode class. Each variant only
/// carries the fields the class gives meaning to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operation {
    /// `*write = in0 <op> *in1`
    RegAlu {
        op: AluOp,
        in0: Operand,
        in1: u8,
        write: u8,
    },
    JumpI {
        addr: u16,
    },
    /// Jump to `addr` if `in0 <op> *in1` evaluates to true.
    JumpCond {
        op: AluOp,
        in0: Operand,
        in1: u8,
        addr: u16,
    },
    /// `*write = in0 <op> fproc(id)`
    AluFproc {
        op: AluOp,
        in0: Operand,
        write: u8,
        id: u16,
    },
    /// Jump to `addr` if `in0 <op> fproc(id)` evaluates to true.
    JumpFproc {
        op: AluOp,
        in0: Operand,
        addr: u16,
        id: u16,
    },
    /// `qclk = qclk <op> in0`, with the latency of the load compensated.
    IncQclk {
        op: AluOp,
        in0: Operand,
    },
    Sync {
        id: u16,
    },
    PulseWrite {
        trigger: bool,
        cmd_time: u32,
        reg: u8,
        fields: PulseFields,
    },
    Done,
    /// Zero the accumulated phase of the waveform generator.
    PulseReset,
    /// Opcode class with no assigned meaning. Carries the raw class bits.
    Unknown(u8),
}

#[derive(Debug)]
pub struct InstructionBuildError {
    pub error_message: String,
    pub error_type: InstructionBuildErrorType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionBuildErrorType {
    InvalidOpcode,
    InvalidReg,
    InvalidAddr,
    InvalidId,
    InvalidImm,
    InvalidPulseField,
}

impl fmt::Display for InstructionBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error_message)
    }
}

impl std::error::Error for InstructionBuildError {}

impl Instruction {
    pub fn from_raw(instr: u128) -> Instruction {
        Instruction { instr }
    }

    pub fn raw(&self) -> u128 {
        self.instr
    }

    pub fn op_class_bits(&self, layout: &InstrLayout) -> u8 {
        layout.op_class.extract(self.instr) as u8
    }

    pub fn op_class(&self, layout: &InstrLayout) -> Option<OpClass> {
        OpClass::from_repr(self.op_class_bits(layout))
    }

    pub fn alu_op(&self, layout: &InstrLayout) -> AluOp {
        AluOp::from_bits(layout.alu_op.extract(self.instr) as u8)
    }

    fn field(&self, field: Field) -> u128 {
        field.extract(self.instr)
    }

    fn in0(&self, layout: &InstrLayout, immediate: bool) -> Operand {
        if immediate {
            Operand::Imm(self.field(layout.immediate) as u32)
        } else {
            Operand::Reg(self.field(layout.in0_reg) as u8)
        }
    }

    fn pulse_field(&self, layout: PulseFieldLayout) -> PulseField {
        PulseField {
            write_en: self.field(layout.write_en) == 1,
            reg_sel: self.field(layout.reg_sel) == 1,
            value: self.field(layout.value) as u32,
        }
    }

    /// Interpret the word according to its opcode class.
    pub fn decode(&self, layout: &InstrLayout) -> Operation {
        let Some(class) = self.op_class(layout) else {
            return Operation::Unknown(self.op_class_bits(layout));
        };
        let op = self.alu_op(layout);
        let in0 = self.in0(layout, class.immediate_in0());
        let in1 = self.field(layout.in1_reg) as u8;
        let write = self.field(layout.write_reg) as u8;
        let addr = self.field(layout.jump_addr) as u16;
        let id = self.field(layout.request_id) as u16;

        match class {
            OpClass::RegAluI | OpClass::RegAlu => Operation::RegAlu {
                op,
                in0,
                in1,
                write,
            },
            OpClass::JumpI => Operation::JumpI { addr },
            OpClass::JumpCondI | OpClass::JumpCond => Operation::JumpCond {
                op,
                in0,
                in1,
                addr,
            },
            OpClass::AluFprocI | OpClass::AluFproc => Operation::AluFproc {
                op,
                in0,
                write,
                id,
            },
            OpClass::JumpFprocI | OpClass::JumpFproc => Operation::JumpFproc {
                op,
                in0,
                addr,
                id,
            },
            OpClass::IncQclkI | OpClass::IncQclk => Operation::IncQclk { op, in0 },
            OpClass::Sync => Operation::Sync { id },
            OpClass::PulseWrite | OpClass::PulseWriteTrig => Operation::PulseWrite {
                trigger: class == OpClass::PulseWriteTrig,
                cmd_time: self.field(layout.immediate) as u32,
                reg: self.field(layout.pulse_reg) as u8,
                fields: PulseFields {
                    env_word: self.pulse_field(layout.env_word),
                    phase: self.pulse_field(layout.phase),
                    freq: self.pulse_field(layout.freq),
                    amp: self.pulse_field(layout.amp),
                    cfg: self.pulse_field(layout.cfg),
                },
            },
            OpClass::Done => Operation::Done,
            OpClass::PulseReset => Operation::PulseReset,
        }
    }

    /// Pack an operation into an instruction word, checking every field fits.
    pub fn try_build(
        operation: &Operation,
        layout: &InstrLayout,
    ) -> Result<Instruction, InstructionBuildError> {
        let mut builder = Builder {
            raw: 0,
            layout,
        };
        match *operation {
            Operation::RegAlu {
                op,
                in0,
                in1,
                write,
            } => {
                builder.class(Self::class_for(in0, OpClass::RegAluI, OpClass::RegAlu), op)?;
                builder.in0(in0)?;
                builder.reg(layout.in1_reg, in1)?;
                builder.reg(layout.write_reg, write)?;
            }
            Operation::JumpI { addr } => {
                builder.class(OpClass::JumpI, AluOp::Id0)?;
                builder.addr(addr)?;
            }
            Operation::JumpCond { op, in0, in1, addr } => {
                builder.class(Self::class_for(in0, OpClass::JumpCondI, OpClass::JumpCond), op)?;
                builder.in0(in0)?;
                builder.reg(layout.in1_reg, in1)?;
                builder.addr(addr)?;
            }
            Operation::AluFproc { op, in0, write, id } => {
                builder.class(Self::class_for(in0, OpClass::AluFprocI, OpClass::AluFproc), op)?;
                builder.in0(in0)?;
                builder.reg(layout.write_reg, write)?;
                builder.id(id)?;
            }
            Operation::JumpFproc { op, in0, addr, id } => {
                builder.class(
                    Self::class_for(in0, OpClass::JumpFprocI, OpClass::JumpFproc),
                    op,
                )?;
                builder.in0(in0)?;
                builder.addr(addr)?;
                builder.id(id)?;
            }
            Operation::IncQclk { op, in0 } => {
                builder.class(Self::class_for(in0, OpClass::IncQclkI, OpClass::IncQclk), op)?;
                builder.in0(in0)?;
            }
            Operation::Sync { id } => {
                builder.class(OpClass::Sync, AluOp::Id0)?;
                builder.id(id)?;
            }
            Operation::PulseWrite {
                trigger,
                cmd_time,
                reg,
                fields,
            } => {
                let class = if trigger {
                    OpClass::PulseWriteTrig
                } else {
                    OpClass::PulseWrite
                };
                builder.class(class, AluOp::Id0)?;
                builder.put(
                    layout.immediate,
                    cmd_time as u128,
                    "Command time",
                    InstructionBuildErrorType::InvalidImm,
                )?;
                builder.reg(layout.pulse_reg, reg)?;
                builder.pulse(layout.env_word, fields.env_word, "Envelope word")?;
                builder.pulse(layout.phase, fields.phase, "Phase")?;
                builder.pulse(layout.freq, fields.freq, "Frequency")?;
                builder.pulse(layout.amp, fields.amp, "Amplitude")?;
                builder.pulse(layout.cfg, fields.cfg, "Config")?;
            }
            Operation::Done => {
                builder.class(OpClass::Done, AluOp::Id0)?;
            }
            Operation::PulseReset => {
                builder.class(OpClass::PulseReset, AluOp::Id0)?;
            }
            Operation::Unknown(bits) => {
                if OpClass::from_repr(bits).is_some() {
                    return Err(InstructionBuildError {
                        error_message: format!("Opcode class {bits:#07b} is assigned."),
                        error_type: InstructionBuildErrorType::InvalidOpcode,
                    });
                }
                builder.put_raw(layout.op_class, bits as u128).map_err(|_| {
                    InstructionBuildError {
                        error_message: format!("Opcode class {bits:#x} is out of range."),
                        error_type: InstructionBuildErrorType::InvalidOpcode,
                    }
                })?;
            }
        }
        Ok(Instruction { instr: builder.raw })
    }

    pub fn build(operation: &Operation, layout: &InstrLayout) -> Instruction {
        Self::try_build(operation, layout).expect("Invalid instruction")
    }

    fn class_for(in0: Operand, immediate: OpClass, register: OpClass) -> OpClass {
        match in0 {
            Operand::Imm(_) => immediate,
            Operand::Reg(_) => register,
        }
    }
}

impl Operation {
    pub fn in0(&self) -> Option<Operand> {
        match *self {
            Operation::RegAlu { in0, .. }
            | Operation::JumpCond { in0, .. }
            | Operation::AluFproc { in0, .. }
            | Operation::JumpFproc { in0, .. }
            | Operation::IncQclk { in0, .. } => Some(in0),
            _ => None,
        }
    }

    /// Address on register read port 0: the input 0 register, or the
    /// register pulse fields select from.
    pub fn read_reg0(&self) -> Option<u8> {
        match *self {
            Operation::PulseWrite { reg, .. } => Some(reg),
            _ => match self.in0() {
                Some(Operand::Reg(reg)) => Some(reg),
                _ => None,
            },
        }
    }

    pub fn read_reg1(&self) -> Option<u8> {
        match *self {
            Operation::RegAlu { in1, .. } | Operation::JumpCond { in1, .. } => Some(in1),
            _ => None,
        }
    }

    pub fn write_reg(&self) -> Option<u8> {
        match *self {
            Operation::RegAlu { write, .. } | Operation::AluFproc { write, .. } => Some(write),
            _ => None,
        }
    }

    pub fn jump_addr(&self) -> Option<u16> {
        match *self {
            Operation::JumpI { addr }
            | Operation::JumpCond { addr, .. }
            | Operation::JumpFproc { addr, .. } => Some(addr),
            _ => None,
        }
    }

    /// fproc request id or sync barrier id.
    pub fn request_id(&self) -> Option<u16> {
        match *self {
            Operation::AluFproc { id, .. }
            | Operation::JumpFproc { id, .. }
            | Operation::Sync { id } => Some(id),
            _ => None,
        }
    }
}

struct Builder<'a> {
    raw: u128,
    layout: &'a InstrLayout,
}

impl Builder<'_> {
    fn put_raw(&mut self, field: Field, value: u128) -> Result<(), ()> {
        self.raw = field.insert(self.raw, value).ok_or(())?;
        Ok(())
    }

    fn put(
        &mut self,
        field: Field,
        value: u128,
        name: &str,
        error_type: InstructionBuildErrorType,
    ) -> Result<(), InstructionBuildError> {
        self.put_raw(field, value).map_err(|_| InstructionBuildError {
            error_message: format!("{name} {value:#x} does not fit in {} bits.", field.width),
            error_type,
        })
    }

    fn class(&mut self, class: OpClass, op: AluOp) -> Result<(), InstructionBuildError> {
        self.put_raw(self.layout.op_class, class as u128)
            .and_then(|_| self.put_raw(self.layout.alu_op, op as u128))
            .map_err(|_| InstructionBuildError {
                error_message: format!("Opcode {class} is out of range."),
                error_type: InstructionBuildErrorType::InvalidOpcode,
            })
    }

    fn reg(&mut self, field: Field, reg: u8) -> Result<(), InstructionBuildError> {
        self.put_raw(field, reg as u128)
            .map_err(|_| InstructionBuildError {
                error_message: format!("Register {reg} is out of range."),
                error_type: InstructionBuildErrorType::InvalidReg,
            })
    }

    fn in0(&mut self, in0: Operand) -> Result<(), InstructionBuildError> {
        match in0 {
            Operand::Imm(value) => self.put(
                self.layout.immediate,
                value as u128,
                "Immediate",
                InstructionBuildErrorType::InvalidImm,
            ),
            Operand::Reg(reg) => self.reg(self.layout.in0_reg, reg),
        }
    }

    fn addr(&mut self, addr: u16) -> Result<(), InstructionBuildError> {
        self.put_raw(self.layout.jump_addr, addr as u128)
            .map_err(|_| InstructionBuildError {
                error_message: format!("Jump address {addr:#x} is out of range."),
                error_type: InstructionBuildErrorType::InvalidAddr,
            })
    }

    fn id(&mut self, id: u16) -> Result<(), InstructionBuildError> {
        self.put_raw(self.layout.request_id, id as u128)
            .map_err(|_| InstructionBuildError {
                error_message: format!("Request id {id:#x} is out of range."),
                error_type: InstructionBuildErrorType::InvalidId,
            })
    }

    fn pulse(
        &mut self,
        layout: PulseFieldLayout,
        field: PulseField,
        name: &str,
    ) -> Result<(), InstructionBuildError> {
        let error_type = InstructionBuildErrorType::InvalidPulseField;
        self.put(layout.write_en, field.write_en as u128, name, error_type)?;
        self.put(layout.reg_sel, field.reg_sel as u128, name, error_type)?;
        self.put(layout.value, field.value as u128, name, error_type)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Imm(value) => write!(f, "{}", *value as i32),
            Operand::Reg(reg) => write!(f, "r{reg}"),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::RegAlu {
                op,
                in0,
                in1,
                write,
            } => write!(f, "reg_alu r{write} = {in0} {op} r{in1}"),
            Operation::JumpI { addr } => write!(f, "jump {addr:#x}"),
            Operation::JumpCond { op, in0, in1, addr } => {
                write!(f, "jump_cond {addr:#x} if {in0} {op} r{in1}")
            }
            Operation::AluFproc { op, in0, write, id } => {
                write!(f, "alu_fproc r{write} = {in0} {op} fproc[{id}]")
            }
            Operation::JumpFproc { op, in0, addr, id } => {
                write!(f, "jump_fproc {addr:#x} if {in0} {op} fproc[{id}]")
            }
            Operation::IncQclk { op, in0 } => write!(f, "inc_qclk qclk {op} {in0}"),
            Operation::Sync { id } => write!(f, "sync {id}"),
            Operation::PulseWrite {
                trigger,
                cmd_time,
                reg,
                fields,
            } => {
                write!(f, "{}", if *trigger { "pulse_trig" } else { "pulse" })?;
                if *trigger {
                    write!(f, " @{cmd_time}")?;
                }
                let named = [
                    ("env", fields.env_word),
                    ("phase", fields.phase),
                    ("freq", fields.freq),
                    ("amp", fields.amp),
                    ("cfg", fields.cfg),
                ];
                for (name, field) in named.iter().filter(|(_, field)| field.write_en) {
                    if field.reg_sel {
                        write!(f, " {name}=r{reg}")?;
                    } else {
                        write!(f, " {name}={:#x}", field.value)?;
                    }
                }
                Ok(())
            }
            Operation::Done => write!(f, "done"),
            Operation::PulseReset => write!(f, "pulse_reset"),
            Operation::Unknown(bits) => write!(f, "unknown {bits:#07b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> InstrLayout {
        InstrLayout::default()
    }

    #[test]
    fn test_reg_alu_i_matches_reference_encoding() {
        // *r2 = -7 add *r3
        let instr = Instruction::build(
            &Operation::RegAlu {
                op: AluOp::Add,
                in0: Operand::Imm((-7i32) as u32),
                in1: 3,
                write: 2,
            },
            &layout(),
        );
        let opcode: u128 = ((OpClass::RegAluI as u128) << 3) | AluOp::Add as u128;
        let expected = (opcode << 120) | ((0xFFFF_FFF9u128) << 88) | (3 << 84) | (2 << 80);
        assert_eq!(instr.raw(), expected);
    }

    #[test]
    fn test_jump_fproc_matches_reference_encoding() {
        let instr = Instruction::build(
            &Operation::JumpFproc {
                op: AluOp::Eq,
                in0: Operand::Reg(5),
                addr: 0x42,
                id: 3,
            },
            &layout(),
        );
        let opcode: u128 = ((OpClass::JumpFproc as u128) << 3) | AluOp::Eq as u128;
        let expected = (opcode << 120) | (5 << 116) | (0x42 << 76) | (3 << 68);
        assert_eq!(instr.raw(), expected);
    }

    #[test]
    fn test_decode_each_class() {
        let layout = layout();
        let operations = [
            Operation::RegAlu {
                op: AluOp::Sub,
                in0: Operand::Reg(1),
                in1: 2,
                write: 3,
            },
            Operation::JumpI { addr: 0xAB },
            Operation::JumpCond {
                op: AluOp::Le,
                in0: Operand::Imm(100),
                in1: 15,
                addr: 7,
            },
            Operation::AluFproc {
                op: AluOp::Id1,
                in0: Operand::Reg(0),
                write: 9,
                id: 0xFF,
            },
            Operation::JumpFproc {
                op: AluOp::Eq,
                in0: Operand::Imm(1),
                addr: 3,
                id: 1,
            },
            Operation::IncQclk {
                op: AluOp::Add,
                in0: Operand::Imm(u32::MAX),
            },
            Operation::Sync { id: 2 },
            Operation::PulseWrite {
                trigger: true,
                cmd_time: 1234,
                reg: 6,
                fields: PulseFields {
                    env_word: PulseField::imm(0xABCDEF),
                    phase: PulseField::reg(),
                    freq: PulseField::imm(0x1FF),
                    amp: PulseField::default(),
                    cfg: PulseField::imm(0x3),
                },
            },
            Operation::Done,
            Operation::PulseReset,
        ];
        for operation in operations {
            let instr = Instruction::build(&operation, &layout);
            assert_eq!(instr.decode(&layout), operation, "{operation}");
        }
    }

    #[test]
    fn test_register_in0_overlaps_immediate() {
        let layout = layout();
        let instr = Instruction::build(
            &Operation::RegAlu {
                op: AluOp::Add,
                in0: Operand::Imm(0xA000_0000),
                in1: 0,
                write: 0,
            },
            &layout,
        );
        // same bits read as a register address give the top nibble
        assert_eq!(layout.in0_reg.extract(instr.raw()), 0xA);
    }

    #[test]
    fn test_pulse_reset_encoding() {
        let layout = layout();
        let instr = Instruction::build(&Operation::PulseReset, &layout);
        assert_eq!(instr.raw(), (OpClass::PulseReset as u128) << 123);
        assert_eq!(instr.decode(&layout), Operation::PulseReset);
        assert_eq!(Operation::PulseReset.to_string(), "pulse_reset");
        assert_eq!(Operation::PulseReset.read_reg0(), None);

        let err = Instruction::try_build(&Operation::Unknown(OpClass::PulseReset as u8), &layout)
            .unwrap_err();
        assert_eq!(err.error_type, InstructionBuildErrorType::InvalidOpcode);
    }

    #[test]
    fn test_unknown_class() {
        let layout = layout();
        let instr = Instruction::from_raw(0);
        assert_eq!(instr.decode(&layout), Operation::Unknown(0));
        let instr = Instruction::from_raw(0b11111 << 123);
        assert_eq!(instr.decode(&layout), Operation::Unknown(0b11111));
    }

    #[test]
    fn test_build_errors() {
        let layout = layout();
        let err = Instruction::try_build(
            &Operation::RegAlu {
                op: AluOp::Add,
                in0: Operand::Reg(16),
                in1: 0,
                write: 0,
            },
            &layout,
        )
        .unwrap_err();
        assert_eq!(err.error_type, InstructionBuildErrorType::InvalidReg);

        let err = Instruction::try_build(&Operation::JumpI { addr: 0x100 }, &layout).unwrap_err();
        assert_eq!(err.error_type, InstructionBuildErrorType::InvalidAddr);

        let err = Instruction::try_build(&Operation::Sync { id: 0x100 }, &layout).unwrap_err();
        assert_eq!(err.error_type, InstructionBuildErrorType::InvalidId);

        let err = Instruction::try_build(
            &Operation::PulseWrite {
                trigger: false,
                cmd_time: 0,
                reg: 0,
                fields: PulseFields {
                    cfg: PulseField::imm(0x10),
                    ..Default::default()
                },
            },
            &layout,
        )
        .unwrap_err();
        assert_eq!(err.error_type, InstructionBuildErrorType::InvalidPulseField);

        let err = Instruction::try_build(&Operation::Unknown(OpClass::Sync as u8), &layout)
            .unwrap_err();
        assert_eq!(err.error_type, InstructionBuildErrorType::InvalidOpcode);
    }

    #[test]
    fn test_display() {
        let op = Operation::RegAlu {
            op: AluOp::Add,
            in0: Operand::Imm((-1i32) as u32),
            in1: 1,
            write: 2,
        };
        assert_eq!(op.to_string(), "reg_alu r2 = -1 add r1");
        let op = Operation::PulseWrite {
            trigger: true,
            cmd_time: 50,
            reg: 3,
            fields: PulseFields {
                phase: PulseField::reg(),
                freq: PulseField::imm(0x10),
                ..Default::default()
            },
        };
        assert_eq!(op.to_string(), "pulse_trig @50 phase=r3 freq=0x10");
    }
}
