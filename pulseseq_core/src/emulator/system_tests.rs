use super::*;
use crate::config::{ConfigError, ProcConfig};
use crate::isa::{AluOp, Instruction, Operand, Operation, PulseField, PulseFields};

fn build(system: &mut ProcSystem, programs: &[&[Operation]]) {
    for (index, operations) in programs.iter().enumerate() {
        let core = system.core_mut(index);
        let layout = *core.layout();
        let program: Vec<Instruction> = operations
            .iter()
            .map(|op| Instruction::build(op, &layout))
            .collect();
        core.load_program(&program).unwrap();
    }
}

fn system(programs: &[&[Operation]], lut: LutConfig) -> ProcSystem {
    let mut system = ProcSystem::new(ProcConfig::default(), programs.len(), lut).unwrap();
    build(&mut system, programs);
    system
}

fn load_imm(write: u8, imm: i32) -> Operation {
    Operation::RegAlu {
        op: AluOp::Id0,
        in0: Operand::Imm(imm as u32),
        in1: 0,
        write,
    }
}

/// `r3 = add + fproc(id)`
fn read_fproc(id: u16, add: u32) -> Operation {
    Operation::AluFproc {
        op: AluOp::Add,
        in0: Operand::Imm(add),
        write: 3,
        id,
    }
}

fn no_meas(_: u64) -> MeasInputs {
    MeasInputs::default()
}

/// Cycle on which each core saw its handshake complete, i.e. the cycle it
/// leaves `state`.
fn release_cycles(
    system: &mut ProcSystem,
    state: CtrlState,
    max_cycles: u64,
    meas: impl Fn(u64) -> MeasInputs,
) -> Vec<Option<u64>> {
    let mut released = vec![None; system.cores().len()];
    for _ in 0..max_cycles {
        system.clock(meas(system.cycle() + 1));
        for (index, core) in system.cores().iter().enumerate() {
            let leaving = core.state() == state && core.control.next_state != state;
            if leaving && released[index].is_none() {
                released[index] = Some(system.cycle());
            }
        }
    }
    released
}

#[test]
fn test_sync_releases_cores_together() {
    let late = [
        load_imm(0, 1),
        load_imm(1, 2),
        Operation::Sync { id: 4 },
        Operation::Done,
    ];
    let early = [Operation::Sync { id: 4 }, Operation::Done];
    let mut system = system(&[&late, &early], LutConfig::new(2));

    let released = release_cycles(&mut system, CtrlState::SyncWait, 40, no_meas);
    // the late core decodes sync on cycle 10 and the barrier fires on the next edge
    assert_eq!(released, vec![Some(11), Some(11)]);
    assert!(system.done());
}

#[test]
fn test_sync_mismatched_ids_stall() {
    let mut system = system(
        &[
            &[Operation::Sync { id: 1 }, Operation::Done],
            &[Operation::Sync { id: 2 }, Operation::Done],
        ],
        LutConfig::new(2),
    );
    assert_eq!(system.clock_until_done(200, no_meas), None);
    for core in system.cores() {
        assert_eq!(core.state(), CtrlState::SyncWait);
        assert!(core.sync_request().enable);
    }
}

#[test]
fn test_sync_participant_subset() {
    let mut system = system(
        &[
            &[Operation::Sync { id: 0 }, load_imm(0, 5), Operation::Done],
            &[Operation::Done],
        ],
        LutConfig::new(2),
    )
    .with_barrier(0b01);
    assert!(system.clock_until_done(100, no_meas).is_some());
    assert_eq!(system.core(0).registers()[0], 5);
}

#[test]
fn test_fproc_own_measurement() {
    let mut system = system(&[&[read_fproc(0, 10), Operation::Done]], LutConfig::new(1));
    let meas = |cycle: u64| {
        if cycle == 20 {
            MeasInputs { meas: 1, valid: 1 }
        } else {
            MeasInputs::default()
        }
    };
    let released = release_cycles(&mut system, CtrlState::AluFprocWait, 30, meas);
    assert_eq!(released, vec![Some(20)]);
    assert_eq!(system.core(0).registers()[3], 11);
}

#[test]
fn test_fproc_lut_round() {
    let lut = LutConfig {
        n_meas: 2,
        required_mask: 0b11,
        // entry 0b11 sends 0 to core 0 and 1 to core 1
        table: vec![0b00, 0b01, 0b01, 0b10],
    };
    let program = [read_fproc(1, 10), Operation::Done];
    let mut system = system(&[&program, &program], lut);

    let meas = |cycle: u64| match cycle {
        10 => MeasInputs { meas: 0b01, valid: 0b01 },
        15 => MeasInputs { meas: 0b10, valid: 0b10 },
        _ => MeasInputs::default(),
    };
    let released = release_cycles(&mut system, CtrlState::AluFprocWait, 40, meas);
    // the second line is accumulated on the edge ending cycle 15
    assert_eq!(released, vec![Some(16), Some(16)]);
    assert_eq!(system.core(0).registers()[3], 10);
    assert_eq!(system.core(1).registers()[3], 11);
}

#[test]
fn test_late_lut_request_waits_for_next_round() {
    let lut = LutConfig {
        n_meas: 2,
        required_mask: 0b11,
        table: vec![0b00, 0b00, 0b00, 0b11],
    };
    let early = [read_fproc(1, 0), Operation::Done];
    let late = [
        load_imm(0, 0),
        load_imm(0, 0),
        load_imm(0, 0),
        load_imm(0, 0),
        read_fproc(1, 0),
        Operation::Done,
    ];
    let mut system = system(&[&early, &late], lut);

    let meas = |cycle: u64| match cycle {
        5 => MeasInputs { meas: 0b11, valid: 0b11 },
        30 => MeasInputs { meas: 0b00, valid: 0b11 },
        _ => MeasInputs::default(),
    };
    let released = release_cycles(&mut system, CtrlState::AluFprocWait, 50, meas);
    assert_eq!(released, vec![Some(6), Some(31)]);
    // the late core sees the second round, not the first
    assert_eq!(system.core(0).registers()[3], 1);
    assert_eq!(system.core(1).registers()[3], 0);
    assert!(system.done());
}

#[test]
fn test_stalled_core_does_not_block_others() {
    let waiting = [read_fproc(0, 0), Operation::Done];
    let running = [load_imm(2, 7), Operation::Done];
    let mut system = system(&[&waiting, &running], LutConfig::new(2));

    assert_eq!(system.clock_until_done(100, no_meas), None);
    assert_eq!(system.core(0).state(), CtrlState::AluFprocWait);
    assert!(system.core(1).done());
    assert_eq!(system.core(1).registers()[2], 7);
}

#[test]
fn test_pulses_aligned_across_cores() {
    let trigger = Operation::PulseWrite {
        trigger: true,
        cmd_time: 30,
        reg: 0,
        fields: PulseFields {
            amp: PulseField::imm(0x100),
            ..Default::default()
        },
    };
    let late = [load_imm(0, 1), load_imm(0, 2), trigger, Operation::Done];
    let early = [trigger, Operation::Done];
    let mut system = system(&[&late, &early], LutConfig::new(2));

    let mut strobes = vec![Vec::new(); 2];
    for _ in 0..40 {
        system.clock(MeasInputs::default());
        for (index, core) in system.cores().iter().enumerate() {
            if core.pulse_outputs().cstrobe {
                strobes[index].push(system.cycle());
            }
        }
    }
    assert_eq!(strobes, vec![vec![31], vec![31]]);
}

#[test]
fn test_reset_system() {
    let program = [Operation::Sync { id: 0 }, load_imm(1, 1), Operation::Done];
    let mut system = system(&[&program, &program], LutConfig::new(2));
    let first = system.clock_until_done(100, no_meas);
    assert!(first.is_some());

    system.reset();
    assert_eq!(system.cycle(), 0);
    assert!(system.cores().iter().all(|core| core.registers()[1] == 0));
    assert_eq!(system.clock_until_done(100, no_meas), first);
}

#[test]
fn test_system_errors() {
    let config = ProcConfig::default();
    assert_eq!(
        ProcSystem::new(config, 0, LutConfig::new(1)).unwrap_err(),
        SystemError::NoCores
    );
    assert_eq!(
        ProcSystem::new(config, 33, LutConfig::new(16)).unwrap_err(),
        SystemError::TooManyCores(33)
    );
    assert_eq!(
        ProcSystem::new(config, 3, LutConfig::new(2)).unwrap_err(),
        SystemError::TooFewMeasLines { n_meas: 2, n_cores: 3 }
    );
    assert_eq!(
        ProcSystem::new(config, 1, LutConfig::new(17)).unwrap_err(),
        SystemError::TooManyMeasLines(17)
    );

    let config = ProcConfig {
        mem_read_latency: 0,
        ..Default::default()
    };
    assert_eq!(
        ProcSystem::new(config, 1, LutConfig::new(1)).unwrap_err(),
        SystemError::Config(ConfigError::MemReadLatency)
    );
}
