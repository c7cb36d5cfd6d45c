use crate::isa::FieldWidths;
use crate::utils::truncate;

/// Values presented to the pulse output registers for one edge. `None`
/// leaves the field unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PulseWrites {
    pub env_word: Option<u32>,
    pub phase: Option<u32>,
    pub freq: Option<u32>,
    pub amp: Option<u32>,
    pub cfg: Option<u32>,
}

impl PulseWrites {
    pub fn any(&self) -> bool {
        [self.env_word, self.phase, self.freq, self.amp, self.cfg]
            .iter()
            .any(Option::is_some)
    }
}

/// State seen by the waveform generator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PulseOutputs {
    pub env_word: u32,
    pub phase: u32,
    pub freq: u32,
    pub amp: u32,
    pub cfg: u32,
    /// High for the one cycle after a triggered pulse commits.
    pub cstrobe: bool,
    /// High for the one cycle after a `pulse_reset` is decoded.
    pub phase_reset: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PulseRegs {
    out: PulseOutputs,
    widths: FieldWidths,
}

impl PulseRegs {
    pub fn new(widths: FieldWidths) -> Self {
        Self {
            out: PulseOutputs::default(),
            widths,
        }
    }

    pub fn outputs(&self) -> PulseOutputs {
        self.out
    }

    pub fn latch(&mut self, writes: PulseWrites, cstrobe: bool, phase_reset: bool) {
        fn store(reg: &mut u32, write: Option<u32>, width: u32) {
            if let Some(value) = write {
                *reg = truncate(value, width);
            }
        }
        store(&mut self.out.env_word, writes.env_word, self.widths.env_word);
        store(&mut self.out.phase, writes.phase, self.widths.phase);
        store(&mut self.out.freq, writes.freq, self.widths.freq);
        store(&mut self.out.amp, writes.amp, self.widths.amp);
        store(&mut self.out.cfg, writes.cfg, self.widths.cfg);
        self.out.cstrobe = cstrobe;
        self.out.phase_reset = phase_reset;
    }

    pub fn reset(&mut self) {
        self.out = PulseOutputs::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_enabled_fields_change() {
        let mut regs = PulseRegs::new(FieldWidths::default());
        regs.latch(
            PulseWrites {
                phase: Some(0x100),
                amp: Some(0x7FFF),
                ..Default::default()
            },
            false,
            false,
        );
        let out = regs.outputs();
        assert_eq!(out.phase, 0x100);
        assert_eq!(out.amp, 0x7FFF);
        assert_eq!(out.freq, 0);
        assert_eq!(out.env_word, 0);

        regs.latch(PulseWrites::default(), true, false);
        assert_eq!(regs.outputs().phase, 0x100);
        assert!(regs.outputs().cstrobe);
    }

    #[test]
    fn test_phase_reset_is_one_cycle() {
        let mut regs = PulseRegs::new(FieldWidths::default());
        regs.latch(
            PulseWrites {
                phase: Some(0x80),
                ..Default::default()
            },
            false,
            false,
        );
        regs.latch(PulseWrites::default(), false, true);
        let out = regs.outputs();
        assert!(out.phase_reset && !out.cstrobe);
        // the phase offset register itself is left alone
        assert_eq!(out.phase, 0x80);

        regs.latch(PulseWrites::default(), false, false);
        assert!(!regs.outputs().phase_reset);
    }

    #[test]
    fn test_values_masked_to_width() {
        let mut regs = PulseRegs::new(FieldWidths::default());
        regs.latch(
            PulseWrites {
                freq: Some(u32::MAX),
                cfg: Some(0x1F),
                ..Default::default()
            },
            false,
            false,
        );
        assert_eq!(regs.outputs().freq, 0x1FF);
        assert_eq!(regs.outputs().cfg, 0xF);
    }
}
