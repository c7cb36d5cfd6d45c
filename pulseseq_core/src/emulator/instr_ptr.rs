use crate::bitmask;

/// Program counter.
///
/// The output is the load value on a cycle with load enabled and the
/// registered value otherwise. On the edge an increment stores output + 1,
/// else a load stores the load value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstrPtr {
    value: u16,
    mask: u16,
}

impl InstrPtr {
    pub fn new(addr_width: u32) -> Self {
        Self {
            value: 0,
            mask: bitmask!(addr_width) as u16,
        }
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    pub fn out(&self, load: Option<u16>) -> u16 {
        load.unwrap_or(self.value) & self.mask
    }

    pub fn latch(&mut self, inc_en: bool, load: Option<u16>) {
        if inc_en {
            self.value = self.out(load).wrapping_add(1) & self.mask;
        } else if let Some(addr) = load {
            self.value = addr & self.mask;
        }
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }
}
