use std::ops::Index;

/// Register file with two combinational read ports and one registered write
/// port. Reads observe the value from before any write latched this cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    x: Vec<u32>,
    addr_width: u32,
}

impl RegisterFile {
    pub fn new(addr_width: u32) -> Self {
        Self {
            x: vec![0; 1 << addr_width],
            addr_width,
        }
    }

    fn slot(&self, addr: u8) -> usize {
        (addr as usize) & ((1 << self.addr_width) - 1)
    }

    pub fn read(&self, addr: u8) -> u32 {
        self.x[self.slot(addr)]
    }

    /// Clock edge of the write port.
    pub fn latch(&mut self, write_en: bool, addr: u8, data: u32) {
        if write_en {
            let slot = self.slot(addr);
            self.x[slot] = data;
        }
    }

    pub fn reset(&mut self) {
        self.x.fill(0);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &u32> {
        self.x.iter()
    }
}

impl Index<usize> for RegisterFile {
    type Output = u32;

    fn index(&self, index: usize) -> &Self::Output {
        &self.x[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let mut regs = RegisterFile::new(4);
        regs.latch(true, 3, 0xDEAD_BEEF);
        assert_eq!(regs.read(3), 0xDEAD_BEEF);
        assert_eq!(regs.read(4), 0);
        assert_eq!(regs[3], 0xDEAD_BEEF);
    }

    #[test]
    fn test_disabled_write_ignored() {
        let mut regs = RegisterFile::new(4);
        regs.latch(false, 1, 7);
        assert!(regs.iter().all(|&r| r == 0));
    }

    #[test]
    fn test_address_masked_to_width() {
        let mut regs = RegisterFile::new(2);
        assert_eq!(regs.len(), 4);
        regs.latch(true, 0b101, 9);
        assert_eq!(regs.read(1), 9);
    }
}
