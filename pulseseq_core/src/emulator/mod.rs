mod alu;
mod cmd_mem;
pub mod controller;
pub mod datapath;
pub mod fproc_lut;
pub mod handshake;
mod instr_ptr;
mod proc_core;
mod pulse_regs;
mod qclk;
mod register_file;
pub mod sync_barrier;
pub mod system;

#[cfg(test)]
mod system_tests;

pub use alu::Alu;
pub use cmd_mem::CmdMem;
pub use controller::{Control, CtrlState};
pub use fproc_lut::{FprocLut, LutConfig, MeasInputs};
pub use handshake::{FprocRequest, FprocResponse, SyncRequest};
pub use instr_ptr::InstrPtr;
pub use proc_core::{CoreState, ProcCore, ProgramTooLong};
pub use pulse_regs::{PulseOutputs, PulseRegs, PulseWrites};
pub use qclk::{QCLK_LOAD_LATENCY, Qclk};
pub use register_file::RegisterFile;
pub use sync_barrier::SyncBarrier;
pub use system::{ProcSystem, SystemError};
