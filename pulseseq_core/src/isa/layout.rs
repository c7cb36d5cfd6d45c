use std::fmt;

use super::opcodes::{AluOp, OpClass};
use crate::{bitmask, bits};

/// Width of the data path (registers, immediates, qclk).
pub const DATA_WIDTH: u32 = 32;

/// Component widths the instruction layout is computed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FieldWidths {
    pub instr: u32,
    pub reg_addr: u32,
    pub instr_addr: u32,
    pub request_id: u32,
    pub env_word: u32,
    pub phase: u32,
    pub freq: u32,
    pub amp: u32,
    pub cfg: u32,
}

impl Default for FieldWidths {
    fn default() -> Self {
        Self {
            instr: 128,
            reg_addr: 4,
            instr_addr: 8,
            request_id: 8,
            env_word: 24,
            phase: 17,
            freq: 9,
            amp: 16,
            cfg: 4,
        }
    }
}

/// A contiguous bit range inside the instruction word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Field {
    pub offset: u32,
    pub width: u32,
}

impl Field {
    fn below(msb_exclusive: u32, width: u32) -> Self {
        Field {
            offset: msb_exclusive - width,
            width,
        }
    }

    pub fn msb(&self) -> u32 {
        self.offset + self.width - 1
    }

    pub fn extract(&self, raw: u128) -> u128 {
        if self.width == 0 {
            0
        } else {
            bits!(raw, self.offset, self.width)
        }
    }

    /// Place `value` into this field. Returns `None` if it does not fit.
    pub fn insert(&self, raw: u128, value: u128) -> Option<u128> {
        if self.width == 0 {
            return (value == 0).then_some(raw);
        }
        let mask: u128 = bitmask!(self.width);
        if value & !mask != 0 {
            return None;
        }
        Some((raw & !(mask << self.offset)) | (value << self.offset))
    }
}

/// Bit positions of one pulse parameter: write enable, register select, immediate value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PulseFieldLayout {
    pub write_en: Field,
    pub reg_sel: Field,
    pub value: Field,
}

impl PulseFieldLayout {
    fn below(msb_exclusive: u32, width: u32) -> Self {
        let write_en = Field::below(msb_exclusive, 1);
        let reg_sel = Field::below(write_en.offset, 1);
        let value = Field::below(reg_sel.offset, width);
        Self {
            write_en,
            reg_sel,
            value,
        }
    }

    fn lsb(&self) -> u32 {
        self.value.offset
    }
}

/// Field offsets of the instruction word. Offsets are fixed once from the
/// widths and shared by every opcode class; a class only decides which of
/// the (overlapping) fields it reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstrLayout {
    pub widths: FieldWidths,
    pub op_class: Field,
    pub alu_op: Field,
    pub immediate: Field,
    pub in0_reg: Field,
    pub in1_reg: Field,
    pub write_reg: Field,
    pub jump_addr: Field,
    pub request_id: Field,
    pub pulse_reg: Field,
    pub env_word: PulseFieldLayout,
    pub phase: PulseFieldLayout,
    pub freq: PulseFieldLayout,
    pub amp: PulseFieldLayout,
    pub cfg: PulseFieldLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    InstrTooWide(u32),
    FieldTooWide { field: &'static str, width: u32, max: u32 },
    Overflow { needed: u32, available: u32 },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::InstrTooWide(width) => {
                write!(f, "instruction width {width} exceeds 128 bits")
            }
            LayoutError::FieldTooWide { field, width, max } => {
                write!(f, "{field} width {width} exceeds the maximum of {max}")
            }
            LayoutError::Overflow { needed, available } => write!(
                f,
                "fields need {needed} bits below the opcode but only {available} are available"
            ),
        }
    }
}

impl std::error::Error for LayoutError {}

impl InstrLayout {
    pub fn new(widths: FieldWidths) -> Result<Self, LayoutError> {
        if widths.instr > u128::BITS {
            return Err(LayoutError::InstrTooWide(widths.instr));
        }
        let limits = [
            ("reg_addr", widths.reg_addr, 8),
            ("instr_addr", widths.instr_addr, 16),
            ("request_id", widths.request_id, 16),
            ("env_word", widths.env_word, DATA_WIDTH),
            ("phase", widths.phase, DATA_WIDTH),
            ("freq", widths.freq, DATA_WIDTH),
            ("amp", widths.amp, DATA_WIDTH),
            ("cfg", widths.cfg, DATA_WIDTH),
        ];
        for (field, width, max) in limits {
            if width > max {
                return Err(LayoutError::FieldTooWide { field, width, max });
            }
        }

        let header = OpClass::WIDTH + AluOp::WIDTH;
        let available = widths.instr.saturating_sub(header);
        let below_imm = widths.reg_addr.max(widths.instr_addr);
        let needed_alu = DATA_WIDTH + widths.reg_addr + below_imm + widths.request_id;
        let needed_pulse = DATA_WIDTH
            + widths.reg_addr
            + [
                widths.env_word,
                widths.phase,
                widths.freq,
                widths.amp,
                widths.cfg,
            ]
            .iter()
            .map(|w| w + 2)
            .sum::<u32>();
        let needed = needed_alu.max(needed_pulse);
        if needed > available {
            return Err(LayoutError::Overflow { needed, available });
        }

        let op_class = Field::below(widths.instr, OpClass::WIDTH);
        let alu_op = Field::below(op_class.offset, AluOp::WIDTH);
        let immediate = Field::below(alu_op.offset, DATA_WIDTH);
        // input 0 register shares the top of the immediate
        let in0_reg = Field::below(alu_op.offset, widths.reg_addr);
        let in1_reg = Field::below(immediate.offset, widths.reg_addr);
        let write_reg = Field::below(in1_reg.offset, widths.reg_addr);
        let jump_addr = Field::below(in1_reg.offset, widths.instr_addr);
        let request_id = Field::below(in1_reg.offset - below_imm, widths.request_id);

        let pulse_reg = in1_reg;
        let env_word = PulseFieldLayout::below(pulse_reg.offset, widths.env_word);
        let phase = PulseFieldLayout::below(env_word.lsb(), widths.phase);
        let freq = PulseFieldLayout::below(phase.lsb(), widths.freq);
        let amp = PulseFieldLayout::below(freq.lsb(), widths.amp);
        let cfg = PulseFieldLayout::below(amp.lsb(), widths.cfg);

        Ok(Self {
            widths,
            op_class,
            alu_op,
            immediate,
            in0_reg,
            in1_reg,
            write_reg,
            jump_addr,
            request_id,
            pulse_reg,
            env_word,
            phase,
            freq,
            amp,
            cfg,
        })
    }

    pub fn num_registers(&self) -> usize {
        1 << self.widths.reg_addr
    }

    pub fn program_depth(&self) -> usize {
        1 << self.widths.instr_addr
    }
}

impl Default for InstrLayout {
    fn default() -> Self {
        // the default widths always fit
        match Self::new(FieldWidths::default()) {
            Ok(layout) => layout,
            Err(err) => unreachable!("default layout is invalid: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_offsets() {
        let layout = InstrLayout::default();
        assert_eq!(layout.op_class, Field { offset: 123, width: 5 });
        assert_eq!(layout.alu_op, Field { offset: 120, width: 3 });
        assert_eq!(layout.immediate, Field { offset: 88, width: 32 });
        assert_eq!(layout.in0_reg, Field { offset: 116, width: 4 });
        assert_eq!(layout.in1_reg, Field { offset: 84, width: 4 });
        assert_eq!(layout.write_reg, Field { offset: 80, width: 4 });
        assert_eq!(layout.jump_addr, Field { offset: 76, width: 8 });
        assert_eq!(layout.request_id, Field { offset: 68, width: 8 });

        // pulse bundle packs down from bit 83
        assert_eq!(layout.env_word.write_en.offset, 83);
        assert_eq!(layout.env_word.reg_sel.offset, 82);
        assert_eq!(layout.env_word.value, Field { offset: 58, width: 24 });
        assert_eq!(layout.phase.value, Field { offset: 39, width: 17 });
        assert_eq!(layout.freq.value, Field { offset: 28, width: 9 });
        assert_eq!(layout.amp.value, Field { offset: 10, width: 16 });
        assert_eq!(layout.cfg.value, Field { offset: 4, width: 4 });
    }

    #[test]
    fn test_field_insert_rejects_overflow() {
        let field = Field { offset: 4, width: 4 };
        assert_eq!(field.insert(0, 0xF), Some(0xF0));
        assert_eq!(field.insert(0xFFF, 0x1), Some(0xF1F));
        assert_eq!(field.insert(0, 0x10), None);
    }

    #[test]
    fn test_layout_rejects_oversized_fields() {
        let widths = FieldWidths {
            instr: 96,
            ..Default::default()
        };
        assert!(matches!(
            InstrLayout::new(widths),
            Err(LayoutError::Overflow { .. })
        ));

        let widths = FieldWidths {
            reg_addr: 9,
            ..Default::default()
        };
        assert!(matches!(
            InstrLayout::new(widths),
            Err(LayoutError::FieldTooWide { field: "reg_addr", .. })
        ));
    }

    #[test]
    fn test_small_register_file() {
        let layout = InstrLayout::new(FieldWidths {
            reg_addr: 3,
            instr_addr: 6,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(layout.num_registers(), 8);
        assert_eq!(layout.program_depth(), 64);
        assert_eq!(layout.jump_addr, Field { offset: 79, width: 6 });
    }
}
