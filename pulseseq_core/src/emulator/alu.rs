use crate::isa::AluOp;
use crate::utils::sign_bit;

impl AluOp {
    /// Combine two data words. Arithmetic wraps at 32 bits; comparisons are
    /// signed and return 0 or 1. `le` is the overflow-corrected sign of
    /// `in0 - in1` and `ge` is its complement, so equal operands give
    /// `le = 0, ge = 1`.
    pub fn apply(self, in0: u32, in1: u32) -> u32 {
        match self {
            AluOp::Id0 => in0,
            AluOp::Add => in0.wrapping_add(in1),
            AluOp::Sub => in0.wrapping_sub(in1),
            AluOp::Eq => (in0 == in1) as u32,
            AluOp::Le => less_than(in0, in1) as u32,
            AluOp::Ge => !less_than(in0, in1) as u32,
            AluOp::Id1 => in1,
            AluOp::Zero => 0,
        }
    }
}

/// Signed `in0 < in1` taken from the sign of the difference, corrected for
/// two's complement overflow.
fn less_than(in0: u32, in1: u32) -> bool {
    let diff = in0.wrapping_sub(in1);
    let overflow = sign_bit(in0) != sign_bit(in1) && sign_bit(diff) != sign_bit(in0);
    sign_bit(diff) ^ overflow
}

/// ALU with registered inputs: operands and op are captured on the clock
/// edge and the result is available during the following cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Alu {
    in0: Option<u32>,
    in1: Option<u32>,
    op: Option<AluOp>,
}

impl Alu {
    pub fn latch(&mut self, in0: Option<u32>, in1: Option<u32>, op: Option<AluOp>) {
        self.in0 = in0;
        self.in1 = in1;
        self.op = op;
    }

    pub fn out(&self) -> Option<u32> {
        let op = self.op?;
        // the id and zero ops ignore the missing side
        match op {
            AluOp::Id0 => self.in0,
            AluOp::Id1 => self.in1,
            AluOp::Zero => Some(0),
            _ => Some(op.apply(self.in0?, self.in1?)),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INT_MIN: u32 = i32::MIN as u32;
    const INT_MAX: u32 = i32::MAX as u32;

    #[test]
    fn test_arithmetic_wraps() {
        assert_eq!(AluOp::Add.apply(u32::MAX, 2), 1);
        assert_eq!(AluOp::Sub.apply(0, 1), u32::MAX);
        assert_eq!(AluOp::Id0.apply(3, 4), 3);
        assert_eq!(AluOp::Id1.apply(3, 4), 4);
        assert_eq!(AluOp::Zero.apply(3, 4), 0);
    }

    #[test]
    fn test_comparisons_across_overflow() {
        // INT_MIN - 1 overflows to a positive difference
        assert_eq!(AluOp::Le.apply(INT_MIN, 1), 1);
        assert_eq!(AluOp::Ge.apply(INT_MIN, 1), 0);
        assert_eq!(AluOp::Le.apply(INT_MAX, -1i32 as u32), 0);
        assert_eq!(AluOp::Ge.apply(INT_MAX, -1i32 as u32), 1);
        assert_eq!(AluOp::Le.apply(INT_MAX, INT_MIN), 0);
        assert_eq!(AluOp::Ge.apply(INT_MIN, INT_MAX), 0);
    }

    #[test]
    fn test_equal_operands() {
        for v in [0, 1, INT_MIN, INT_MAX, u32::MAX] {
            assert_eq!(AluOp::Eq.apply(v, v), 1);
            assert_eq!(AluOp::Le.apply(v, v), 0);
            assert_eq!(AluOp::Ge.apply(v, v), 1);
        }
        assert_eq!(AluOp::Eq.apply(1, 2), 0);
    }

    #[test]
    fn test_ge_is_complement_of_le() {
        let values = [0, 1, 2, INT_MIN, INT_MIN + 1, INT_MAX, INT_MAX - 1, u32::MAX];
        for in0 in values {
            for in1 in values {
                let le = AluOp::Le.apply(in0, in1);
                assert_eq!(AluOp::Ge.apply(in0, in1), 1 - le, "{in0:#x} {in1:#x}");
            }
        }
    }

    #[test]
    fn test_registered_output() {
        let mut alu = Alu::default();
        assert_eq!(alu.out(), None);

        alu.latch(Some(12), Some(5), Some(AluOp::Add));
        assert_eq!(alu.out(), Some(17));

        alu.latch(Some(7), None, Some(AluOp::Id0));
        assert_eq!(alu.out(), Some(7));

        alu.latch(Some(7), None, Some(AluOp::Add));
        assert_eq!(alu.out(), None);
    }
}
