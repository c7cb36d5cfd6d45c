use super::handshake::{FprocRequest, FprocResponse, SyncRequest};
use super::pulse_regs::PulseWrites;
use crate::isa::PulseFields;

/// Lines in the core datapath, settled once per cycle by `propagate`.
/// `_i` lines are driven by the core's external peers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcDatapath {
    // decoded instruction
    pub reg_addr0: u8,
    pub reg_addr1: u8,
    pub write_addr: u8,
    pub imm: u32,
    pub jump_addr: u16,
    pub cmd_time: u32,
    pub pulse_fields: PulseFields,

    // register file outputs
    pub data0: u32,
    pub data1: u32,

    // alu
    pub alu_in0: Option<u32>,
    pub alu_in1: Option<u32>,
    pub alu_out: Option<u32>,

    // program counter
    pub pc_load: Option<u16>, // Load value when a jump is taken.
    pub pc_out: u16,          // Address presented to program memory.

    // pulse output
    pub time_match: bool, // qclk == cmd_time
    pub cstrobe: bool,    // Input to the strobe register.
    pub phase_reset: bool, // Input to the phase reset register.
    pub pulse_writes: PulseWrites,

    // handshakes
    pub fproc_o: FprocRequest,
    pub fproc_i: FprocResponse,
    pub sync_o: SyncRequest,
    pub sync_ready_i: bool,
    pub done_o: bool,
}
