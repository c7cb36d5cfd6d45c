/// Cycles between the ALU sampling qclk and the loaded value taking effect.
/// A load of `R` stores `R + QCLK_LOAD_LATENCY` so an `inc_qclk` by `N`
/// leaves the timebase exactly `N` ahead of where it would have been.
pub const QCLK_LOAD_LATENCY: u32 = 2;

/// Free-running virtual timebase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Qclk {
    value: u32,
}

impl Qclk {
    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn tick(&mut self) {
        self.value = self.value.wrapping_add(1);
    }

    pub fn load(&mut self, alu_result: u32) {
        self.value = alu_result.wrapping_add(QCLK_LOAD_LATENCY);
    }

    pub fn latch(&mut self, load: Option<u32>) {
        match load {
            Some(alu_result) => self.load(alu_result),
            None => self.tick(),
        }
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_running() {
        let mut qclk = Qclk::default();
        for _ in 0..100 {
            qclk.latch(None);
        }
        assert_eq!(qclk.value(), 100);
    }

    #[test]
    fn test_wraps() {
        let mut qclk = Qclk::default();
        qclk.load(u32::MAX - QCLK_LOAD_LATENCY);
        assert_eq!(qclk.value(), u32::MAX);
        qclk.tick();
        assert_eq!(qclk.value(), 0);
    }

    #[test]
    fn test_load_adds_latency_then_runs() {
        let mut qclk = Qclk::default();
        qclk.latch(Some(1000));
        assert_eq!(qclk.value(), 1000 + QCLK_LOAD_LATENCY);
        qclk.latch(None);
        qclk.latch(None);
        assert_eq!(qclk.value(), 1004);
    }
}
