use std::fmt;

use tracing::{debug, info, trace};

use super::{
    alu::Alu,
    cmd_mem::CmdMem,
    controller::{Control, CtrlInputs, CtrlState, In0Sel, In1Sel, get_control_signals},
    datapath::ProcDatapath,
    handshake::{FprocRequest, FprocResponse, SyncRequest},
    instr_ptr::InstrPtr,
    pulse_regs::{PulseOutputs, PulseRegs, PulseWrites},
    qclk::Qclk,
    register_file::RegisterFile,
};
use crate::{
    config::{ConfigError, ProcConfig},
    isa::{InstrLayout, Instruction, Operand, Operation, PulseField},
};

/// One pulse-sequencing processor core.
///
/// Every call to [`ProcCore::clock`] is one hardware clock cycle: the edge
/// (`latch`) stores the lines of the ending cycle into the registers, then
/// `propagate` settles the combinational lines of the new cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcCore {
    config: ProcConfig,
    layout: InstrLayout,

    // registered state
    state: CtrlState,
    fetch_cycle: u32,
    ir: Instruction,
    pc: InstrPtr,
    cmd_mem: CmdMem,
    regs: RegisterFile,
    alu: Alu,
    qclk: Qclk,
    pulse: PulseRegs,

    // combinational state of the current cycle
    operation: Operation,
    pub datapath: ProcDatapath,
    pub control: Control,

    cycle: u64,
    retired: u64,
    done_cycle: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramTooLong {
    pub len: usize,
    pub depth: usize,
}

impl fmt::Display for ProgramTooLong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "program of {} words does not fit in {} words of program memory",
            self.len, self.depth
        )
    }
}

impl std::error::Error for ProgramTooLong {}

/// Architectural state of a core at the start of a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoreState {
    pub cycle: u64,
    pub retired: u64,
    pub state: CtrlState,
    pub pc: u16,
    pub qclk: u32,
    pub registers: Vec<u32>,
    pub pulse: PulseOutputs,
    pub done: bool,
}

impl ProcCore {
    pub fn new(config: ProcConfig) -> Result<Self, ConfigError> {
        let layout = config.layout()?;
        let widths = layout.widths;
        let mut core = Self {
            config,
            layout,
            state: CtrlState::default(),
            fetch_cycle: 0,
            ir: Instruction::default(),
            pc: InstrPtr::new(widths.instr_addr),
            cmd_mem: CmdMem::new(layout.program_depth(), widths.instr),
            regs: RegisterFile::new(widths.reg_addr),
            alu: Alu::default(),
            qclk: Qclk::default(),
            pulse: PulseRegs::new(widths),
            operation: Operation::Unknown(0),
            datapath: ProcDatapath::default(),
            control: Control::default(),
            cycle: 0,
            retired: 0,
            done_cycle: None,
        };
        core.propagate();
        Ok(core)
    }

    pub fn config(&self) -> &ProcConfig {
        &self.config
    }

    pub fn layout(&self) -> &InstrLayout {
        &self.layout
    }

    /// Program load path. Writes go straight into program memory and do not
    /// disturb the running state.
    pub fn write_program(&mut self, addr: usize, instr: Instruction) {
        self.cmd_mem.write_word(addr, instr.raw());
    }

    /// Load a program starting at address 0.
    pub fn load_program(&mut self, program: &[Instruction]) -> Result<(), ProgramTooLong> {
        if program.len() > self.cmd_mem.depth() {
            return Err(ProgramTooLong {
                len: program.len(),
                depth: self.cmd_mem.depth(),
            });
        }
        for (addr, instr) in program.iter().enumerate() {
            self.write_program(addr, *instr);
        }
        Ok(())
    }

    /// Return every register to its reset value. Program memory is kept.
    pub fn reset(&mut self) {
        self.state = CtrlState::default();
        self.fetch_cycle = 0;
        self.ir = Instruction::default();
        self.pc.reset();
        self.cmd_mem.reset();
        self.regs.reset();
        self.alu.reset();
        self.qclk.reset();
        self.pulse.reset();
        self.datapath = ProcDatapath::default();
        self.cycle = 0;
        self.retired = 0;
        self.done_cycle = None;
        self.propagate();
    }

    pub fn set_fproc_response(&mut self, response: FprocResponse) {
        self.datapath.fproc_i = response;
    }

    pub fn set_sync_ready(&mut self, ready: bool) {
        self.datapath.sync_ready_i = ready;
    }

    pub fn clock(&mut self) {
        self.latch();
        self.propagate();
    }

    /// Clock until the core reaches a `done` instruction. Returns the cycle
    /// count at that point, or `None` if `max_cycles` ran out first.
    pub fn clock_until_done(&mut self, max_cycles: u64) -> Option<u64> {
        for _ in 0..max_cycles {
            if self.done() {
                break;
            }
            self.clock();
        }
        self.done().then_some(self.cycle)
    }

    /// Clock until one more instruction retires.
    pub fn clock_until_next_instruction(&mut self, max_cycles: u64) -> Option<u64> {
        let start = self.cycle;
        let retired = self.retired;
        while self.retired == retired {
            if self.cycle - start >= max_cycles {
                return None;
            }
            self.clock();
        }
        Some(self.cycle - start)
    }

    /// Clock edge: all registers sample the lines of the ending cycle.
    pub fn latch(&mut self) {
        let control = self.control;
        let lines = self.datapath;

        self.run_state_reg();
        if control.instr_load {
            self.ir = self.cmd_mem.data_out();
        }
        self.cmd_mem.latch(lines.pc_out);
        self.run_pc_reg();
        if control.reg_write {
            if let Some(data) = lines.alu_out {
                self.regs.latch(true, lines.write_addr, data);
            }
        }
        self.alu.latch(lines.alu_in0, lines.alu_in1, control.alu_op);
        self.qclk.latch(lines.alu_out.filter(|_| control.qclk_load));
        self.run_pulse_regs();

        self.cycle += 1;
    }

    /// Settle the combinational lines for the current register state and inputs.
    pub fn propagate(&mut self) {
        self.operation = self.ir.decode(&self.layout);
        self.run_decode();
        self.run_read_registers();
        self.datapath.time_match = self.qclk.value() == self.datapath.cmd_time;

        let inputs = CtrlInputs {
            fetch_cycle: self.fetch_cycle,
            time_match: self.datapath.time_match,
            fproc_ready: self.datapath.fproc_i.ready,
            sync_ready: self.datapath.sync_ready_i,
        };
        self.control = get_control_signals(self.state, &self.operation, inputs, &self.config);

        self.run_operand_muxes();
        self.datapath.alu_out = self.alu.out();
        self.run_pc_mux();
        self.run_pulse_mux();
        self.run_handshakes();
    }

    fn run_decode(&mut self) {
        let op = &self.operation;
        let dp = &mut self.datapath;
        dp.reg_addr0 = op.read_reg0().unwrap_or(0);
        dp.reg_addr1 = op.read_reg1().unwrap_or(0);
        dp.write_addr = op.write_reg().unwrap_or(0);
        dp.jump_addr = op.jump_addr().unwrap_or(0);
        dp.imm = match op.in0() {
            Some(Operand::Imm(value)) => value,
            _ => 0,
        };
        (dp.cmd_time, dp.pulse_fields) = match *op {
            Operation::PulseWrite {
                cmd_time, fields, ..
            } => (cmd_time, fields),
            _ => Default::default(),
        };
    }

    fn run_read_registers(&mut self) {
        self.datapath.data0 = self.regs.read(self.datapath.reg_addr0);
        self.datapath.data1 = self.regs.read(self.datapath.reg_addr1);
    }

    fn run_operand_muxes(&mut self) {
        self.datapath.alu_in0 = match self.control.alu_in0_sel {
            Some(In0Sel::Imm) => Some(self.datapath.imm),
            Some(In0Sel::Reg) => Some(self.datapath.data0),
            None => None,
        };
        self.datapath.alu_in1 = match self.control.alu_in1_sel {
            Some(In1Sel::Reg) => Some(self.datapath.data1),
            Some(In1Sel::Qclk) => Some(self.qclk.value()),
            Some(In1Sel::Fproc) => Some(self.datapath.fproc_i.data),
            None => None,
        };
    }

    fn run_pc_mux(&mut self) {
        let cond = self.datapath.alu_out.is_some_and(|x| x & 1 == 1);
        let taken = self.control.pc_load || (self.control.pc_load_cond && cond);
        self.datapath.pc_load = taken.then_some(self.datapath.jump_addr);
        self.datapath.pc_out = self.pc.out(self.datapath.pc_load);
    }

    fn run_pulse_mux(&mut self) {
        let commit = self.control.pulse_write;
        let reg_value = self.datapath.data0;
        let select = |field: PulseField| {
            (commit && field.write_en).then_some(if field.reg_sel {
                reg_value
            } else {
                field.value
            })
        };
        let fields = self.datapath.pulse_fields;
        self.datapath.pulse_writes = PulseWrites {
            env_word: select(fields.env_word),
            phase: select(fields.phase),
            freq: select(fields.freq),
            amp: select(fields.amp),
            cfg: select(fields.cfg),
        };
        self.datapath.cstrobe = self.control.strobe_en && self.datapath.time_match;
        self.datapath.phase_reset = self.control.pulse_reset;
    }

    fn run_handshakes(&mut self) {
        let id = self.operation.request_id().unwrap_or(0);
        self.datapath.fproc_o = FprocRequest {
            enable: self.control.fproc_en,
            id,
        };
        self.datapath.sync_o = SyncRequest {
            enable: self.control.sync_en,
            id,
        };
        self.datapath.done_o = self.control.done;
        if self.control.done && self.done_cycle.is_none() {
            info!(cycle = self.cycle, "done");
            self.done_cycle = Some(self.cycle);
        }
    }

    fn run_state_reg(&mut self) {
        let next = self.control.next_state;
        if next != self.state {
            trace!(cycle = self.cycle, from = %self.state, to = %next, "state transition");
        }

        match (self.state, next) {
            (CtrlState::FetchWait, CtrlState::FetchWait) => self.fetch_cycle += 1,
            (CtrlState::FetchWait, _) => self.fetch_cycle = 0,
            (_, CtrlState::FetchWait) => {
                self.retired += 1;
                debug!(cycle = self.cycle, pc = self.pc.value(), instr = %self.operation, "retired");
            }
            _ => {}
        }

        match self.state {
            CtrlState::AluFprocWait | CtrlState::JumpFprocWait if next != self.state => {
                debug!(cycle = self.cycle, data = self.datapath.fproc_i.data, "fproc ready");
            }
            CtrlState::SyncWait if next != self.state => {
                debug!(cycle = self.cycle, id = self.datapath.sync_o.id, "sync released");
            }
            _ => {}
        }

        self.state = next;
    }

    fn run_pc_reg(&mut self) {
        if let Some(addr) = self.datapath.pc_load {
            debug!(cycle = self.cycle, addr, "pc load");
        }
        self.pc.latch(self.control.pc_inc, self.datapath.pc_load);
    }

    fn run_pulse_regs(&mut self) {
        let writes = self.datapath.pulse_writes;
        let cstrobe = self.datapath.cstrobe;
        let phase_reset = self.datapath.phase_reset;
        self.pulse.latch(writes, cstrobe, phase_reset);
        if phase_reset {
            info!(cycle = self.cycle, "phase reset");
        }
        if cstrobe {
            let out = self.pulse.outputs();
            info!(
                cycle = self.cycle,
                time = self.datapath.cmd_time,
                phase = out.phase,
                freq = out.freq,
                amp = out.amp,
                env = out.env_word,
                cfg = out.cfg,
                "pulse strobe"
            );
        } else if writes.any() {
            debug!(cycle = self.cycle, "pulse registers written");
        }
    }

    pub fn state(&self) -> CtrlState {
        self.state
    }

    /// Registered program counter value.
    pub fn pc(&self) -> u16 {
        self.pc.value()
    }

    pub fn ir(&self) -> Instruction {
        self.ir
    }

    /// The instruction register decoded against the layout.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn qclk(&self) -> u32 {
        self.qclk.value()
    }

    pub fn pulse_outputs(&self) -> PulseOutputs {
        self.pulse.outputs()
    }

    pub fn fproc_request(&self) -> FprocRequest {
        self.datapath.fproc_o
    }

    pub fn sync_request(&self) -> SyncRequest {
        self.datapath.sync_o
    }

    pub fn done(&self) -> bool {
        self.datapath.done_o
    }

    /// Cycle on which the core first decoded `done`.
    pub fn done_cycle(&self) -> Option<u64> {
        self.done_cycle
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn retired(&self) -> u64 {
        self.retired
    }

    pub fn program(&self) -> &[u128] {
        self.cmd_mem.words()
    }

    pub fn snapshot(&self) -> CoreState {
        CoreState {
            cycle: self.cycle,
            retired: self.retired,
            state: self.state,
            pc: self.pc(),
            qclk: self.qclk(),
            registers: self.regs.iter().copied().collect(),
            pulse: self.pulse_outputs(),
            done: self.done(),
        }
    }
}
