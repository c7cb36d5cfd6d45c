use crate::isa::Instruction;

/// Program memory with a registered read port.
///
/// `data_out` holds the word at the address presented on the previous edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CmdMem {
    words: Vec<u128>,
    data_out: u128,
    instr_mask: u128,
}

impl CmdMem {
    pub fn new(depth: usize, instr_width: u32) -> Self {
        let instr_mask = if instr_width >= u128::BITS {
            u128::MAX
        } else {
            (1 << instr_width) - 1
        };
        Self {
            words: vec![0; depth],
            data_out: 0,
            instr_mask,
        }
    }

    pub fn depth(&self) -> usize {
        self.words.len()
    }

    /// Write port used by the program load path. The address wraps to the
    /// memory depth like the hardware address lines do.
    pub fn write_word(&mut self, addr: usize, word: u128) {
        let depth = self.words.len();
        self.words[addr % depth] = word & self.instr_mask;
    }

    pub fn read_word(&self, addr: usize) -> u128 {
        self.words[addr % self.words.len()]
    }

    pub fn data_out(&self) -> Instruction {
        Instruction::from_raw(self.data_out)
    }

    pub fn latch(&mut self, read_addr: u16) {
        self.data_out = self.read_word(read_addr as usize);
    }

    /// Clear the read register. Contents survive a reset.
    pub fn reset(&mut self) {
        self.data_out = 0;
    }

    pub fn words(&self) -> &[u128] {
        &self.words
    }
}
