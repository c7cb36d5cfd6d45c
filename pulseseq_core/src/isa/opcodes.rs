use strum::{Display, EnumIter, FromRepr};

/// Top five bits of an instruction word.
///
/// The `I` suffix marks the variants whose ALU input 0 comes from the
/// immediate field rather than from register read port 0.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter, FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpClass {
    #[strum(serialize = "reg_alu_i")]
    RegAluI = 0b00010,
    #[strum(serialize = "reg_alu")]
    RegAlu = 0b00011,
    #[strum(serialize = "jump_i")]
    JumpI = 0b00100,
    #[strum(serialize = "jump_cond_i")]
    JumpCondI = 0b00110,
    #[strum(serialize = "jump_cond")]
    JumpCond = 0b00111,
    #[strum(serialize = "alu_fproc_i")]
    AluFprocI = 0b01000,
    #[strum(serialize = "alu_fproc")]
    AluFproc = 0b01001,
    #[strum(serialize = "jump_fproc_i")]
    JumpFprocI = 0b01010,
    #[strum(serialize = "jump_fproc")]
    JumpFproc = 0b01011,
    #[strum(serialize = "inc_qclk_i")]
    IncQclkI = 0b01100,
    #[strum(serialize = "inc_qclk")]
    IncQclk = 0b01101,
    #[strum(serialize = "sync")]
    Sync = 0b01110,
    #[strum(serialize = "pulse_write")]
    PulseWrite = 0b10000,
    #[strum(serialize = "pulse_write_trig")]
    PulseWriteTrig = 0b10010,
    #[strum(serialize = "done")]
    Done = 0b10100,
    #[strum(serialize = "pulse_reset")]
    PulseReset = 0b10110,
}

impl OpClass {
    pub const WIDTH: u32 = 5;

    /// Whether ALU input 0 is taken from the immediate field.
    pub fn immediate_in0(&self) -> bool {
        matches!(
            self,
            OpClass::RegAluI
                | OpClass::JumpCondI
                | OpClass::AluFprocI
                | OpClass::JumpFprocI
                | OpClass::IncQclkI
        )
    }
}

/// ALU sub-opcode, the three bits below the opcode class.
/// Every encoding is assigned, so decoding an ALU op never fails.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter, FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "lowercase")]
pub enum AluOp {
    #[default]
    Id0 = 0b000,
    Add = 0b001,
    Sub = 0b010,
    Eq = 0b011,
    Le = 0b100,
    Ge = 0b101,
    Id1 = 0b110,
    Zero = 0b111,
}

impl AluOp {
    pub const WIDTH: u32 = 3;

    pub fn from_bits(bits: u8) -> Self {
        // three bits cover all eight variants
        Self::from_repr(bits & 0b111).unwrap_or(AluOp::Zero)
    }

    /// Ops that only produce a 0/1 result, i.e. are meaningful as a branch condition.
    pub fn is_comparison(&self) -> bool {
        matches!(self, AluOp::Eq | AluOp::Le | AluOp::Ge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_op_class_repr_round_trip() {
        for class in OpClass::iter() {
            assert_eq!(OpClass::from_repr(class as u8), Some(class));
            assert!((class as u8) < (1 << OpClass::WIDTH));
        }
        assert_eq!(OpClass::from_repr(0), None);
        assert_eq!(OpClass::from_repr(0b11111), None);
    }

    #[test]
    fn test_alu_op_every_encoding_assigned() {
        for bits in 0..8u8 {
            assert_eq!(AluOp::from_bits(bits) as u8, bits);
        }
        assert_eq!(AluOp::from_bits(0b1110), AluOp::Id1);
    }

    #[test]
    fn test_names() {
        assert_eq!(OpClass::PulseWriteTrig.to_string(), "pulse_write_trig");
        assert_eq!(OpClass::PulseReset.to_string(), "pulse_reset");
        assert_eq!(AluOp::Ge.to_string(), "ge");
    }
}
