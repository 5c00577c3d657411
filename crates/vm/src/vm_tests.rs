use starknet_types_core::felt::Felt;

use super::*;

/// A builtin that deduces every cell of its segment to the same scalar.
#[derive(Debug, Default)]
struct ConstBuiltin {
    base: Pointer,
    value: u64,
}

impl Builtin for ConstBuiltin {
    fn name(&self) -> &'static str {
        "const"
    }

    fn base(&self) -> Pointer {
        self.base
    }

    fn initialize_segments(&mut self, segments: &mut SegmentManager) {
        self.base = segments.add();
    }

    fn initial_stack(&self) -> Vec<Value> {
        vec![Value::Pointer(self.base)]
    }

    fn deduce(&self, _addr: Pointer, _memory: &Memory) -> Result<Option<Value>, Error> {
        Ok(Some(Value::Scalar(Felt::from(self.value))))
    }

    fn add_validation_rule(&self, _memory: &mut Memory) {}
}

/// A fresh machine with a program segment, an execution segment and the registers of a
/// just-initialized run.
fn initialized_vm() -> CairoVM {
    let mut vm = CairoVM::new();
    vm.segments_mut().add();
    vm.segments_mut().add();
    vm.cpu_mut().pc = Pointer::new(0, 0);
    vm.cpu_mut().ap = Pointer::new(1, 2);
    vm.cpu_mut().fp = Pointer::new(1, 2);
    vm
}

fn load_program(vm: &mut CairoVM, words: &[u64]) {
    let data: Vec<Value> = words.iter().map(|w| Value::Scalar(Felt::from(*w))).collect();
    vm.segments_mut()
        .load_data(Pointer::new(0, 0), &data)
        .unwrap();
}

#[test]
fn assert_eq_deduces_missing_op1() {
    // [fp - 1] = [fp - 2] + [ap]
    let mut vm = initialized_vm();
    load_program(&mut vm, &[0x4033_8000_7ffe_7fff]);
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 0), Felt::from(2))
        .unwrap();
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 1), Felt::from(5))
        .unwrap();

    vm.step().unwrap();

    // The missing operand has been materialized before the trace entry was recorded.
    assert_eq!(
        vm.memory().get(Pointer::new(1, 2)),
        Some(&Value::Scalar(Felt::from(3)))
    );
    assert_eq!(
        vm.trace(),
        &[TraceEntry {
            pc: Pointer::new(0, 0),
            ap: Pointer::new(1, 2),
            fp: Pointer::new(1, 2),
        }]
    );
    assert_eq!(vm.cpu().pc, Pointer::new(0, 1));
    assert_eq!(vm.cpu().ap, Pointer::new(1, 2));
    assert_eq!(vm.current_step(), 1);
}

#[test]
fn assert_eq_detects_differing_values() {
    // Same instruction, but the cell the result should land in already disagrees.
    let mut vm = initialized_vm();
    load_program(&mut vm, &[0x4033_8000_7ffe_7fff]);
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 0), Felt::from(2))
        .unwrap();
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 1), Felt::from(5))
        .unwrap();
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 2), Felt::from(4))
        .unwrap();

    assert_eq!(vm.step(), Err(Error::DiffAssertValues));
    assert!(vm.trace().is_empty());
    assert_eq!(vm.current_step(), 0);
}

#[test]
fn call_saves_the_frame() {
    // call rel 4
    let mut vm = initialized_vm();
    load_program(&mut vm, &[0x1104_8001_8001_8000, 4]);

    vm.step().unwrap();

    // The caller's frame pointer and the return program counter have been written.
    assert_eq!(
        vm.memory().get(Pointer::new(1, 2)),
        Some(&Value::Pointer(Pointer::new(1, 2)))
    );
    assert_eq!(
        vm.memory().get(Pointer::new(1, 3)),
        Some(&Value::Pointer(Pointer::new(0, 2)))
    );
    assert_eq!(vm.cpu().fp, Pointer::new(1, 4));
    assert_eq!(vm.cpu().ap, Pointer::new(1, 4));
    assert_eq!(vm.cpu().pc, Pointer::new(0, 4));
}

#[test]
fn ret_restores_the_frame() {
    let mut vm = initialized_vm();
    load_program(&mut vm, &[0x1104_8001_8001_8000, 4]);
    vm.segments_mut()
        .memory
        .insert(Pointer::new(0, 4), Felt::from(0x208b_7fff_7fff_7ffeu64))
        .unwrap();

    vm.step().unwrap();
    vm.step().unwrap();

    // The frame and program counter come back from the saved cells; ap is untouched.
    assert_eq!(vm.cpu().fp, Pointer::new(1, 2));
    assert_eq!(vm.cpu().pc, Pointer::new(0, 2));
    assert_eq!(vm.cpu().ap, Pointer::new(1, 4));
    assert_eq!(
        vm.trace(),
        &[
            TraceEntry {
                pc: Pointer::new(0, 0),
                ap: Pointer::new(1, 2),
                fp: Pointer::new(1, 2),
            },
            TraceEntry {
                pc: Pointer::new(0, 4),
                ap: Pointer::new(1, 4),
                fp: Pointer::new(1, 4),
            },
        ]
    );
}

#[test]
fn call_rejects_clobbered_return_cells() {
    let mut vm = initialized_vm();
    load_program(&mut vm, &[0x1104_8001_8001_8000, 4]);
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 3), Felt::from(99))
        .unwrap();
    assert_eq!(vm.step(), Err(Error::CantWriteReturnPc));

    let mut vm = initialized_vm();
    load_program(&mut vm, &[0x1104_8001_8001_8000, 4]);
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 2), Felt::from(7))
        .unwrap();
    assert_eq!(vm.step(), Err(Error::CantWriteReturnFp));
}

#[test]
fn conditional_jump_taken() {
    // jmp rel 7 if [fp - 2] != 0
    let mut vm = initialized_vm();
    load_program(&mut vm, &[0x0207_8001_7fff_7ffe, 7]);
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 0), Felt::from(5))
        .unwrap();
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 1), Felt::from(9))
        .unwrap();

    vm.step().unwrap();

    assert_eq!(vm.cpu().pc, Pointer::new(0, 7));
    assert_eq!(vm.cpu().ap, Pointer::new(1, 2));
    assert_eq!(vm.cpu().fp, Pointer::new(1, 2));
}

#[test]
fn conditional_jump_not_taken() {
    let mut vm = initialized_vm();
    load_program(&mut vm, &[0x0207_8001_7fff_7ffe, 7]);
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 0), Felt::ZERO)
        .unwrap();
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 1), Felt::from(9))
        .unwrap();

    vm.step().unwrap();

    // The instruction carries an immediate, so the fall-through skips two cells.
    assert_eq!(vm.cpu().pc, Pointer::new(0, 2));
}

#[test]
fn assertion_requires_a_constrained_result() {
    // An assertion under a conditional jump never constrains its result.
    let mut vm = initialized_vm();
    load_program(&mut vm, &[0x4207_8001_7fff_7ffe, 7]);
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 0), Felt::from(5))
        .unwrap();
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 1), Felt::from(1))
        .unwrap();

    assert_eq!(vm.step(), Err(Error::UnconstrainedResAssertEq));
}

#[test]
fn absolute_jump_needs_a_pointer_target() {
    // jmp abs imm: the immediate is a scalar, which is not a jump target.
    let mut vm = initialized_vm();
    load_program(&mut vm, &[0x0087_8001_7fff_7fff, 4]);
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 1), Felt::from(9))
        .unwrap();

    assert_eq!(vm.step(), Err(Error::ExpectedPointer));
    // The failing update left the registers untouched.
    assert_eq!(vm.cpu().pc, Pointer::new(0, 0));
    assert_eq!(vm.current_step(), 0);
}

#[test]
fn step_fails_without_an_instruction() {
    let mut vm = initialized_vm();
    assert_eq!(vm.step(), Err(Error::ProgramCounterLost));
}

#[test]
fn missing_operands_without_a_deduction_are_errors() {
    // [ap] = [fp - 1]: nothing constrains op0, and its cell was never written.
    let mut vm = initialized_vm();
    load_program(&mut vm, &[0x4806_8001_7fff_8000, 11]);

    assert_eq!(vm.step(), Err(Error::CantDeduceOp0));
}

#[test]
fn run_until_pc_executes_the_whole_program() {
    // Two `[ap] = imm; ap++` in a row.
    let mut vm = initialized_vm();
    load_program(
        &mut vm,
        &[0x4806_8001_7fff_8000, 11, 0x4806_8001_7fff_8000, 13],
    );
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 1), Felt::ZERO)
        .unwrap();

    vm.run_until_pc(Pointer::new(0, 4)).unwrap();

    assert_eq!(vm.current_step(), 2);
    assert_eq!(
        vm.memory().get(Pointer::new(1, 2)),
        Some(&Value::Scalar(Felt::from(11)))
    );
    assert_eq!(
        vm.memory().get(Pointer::new(1, 3)),
        Some(&Value::Scalar(Felt::from(13)))
    );
    assert_eq!(vm.cpu().ap, Pointer::new(1, 4));
}

#[test]
fn builtins_deduce_missing_operands() {
    // [fp - 1] = [[fp - 2]]: op1 is read through a pointer into the builtin's segment.
    let mut vm = initialized_vm();
    let mut builtin = Box::new(ConstBuiltin {
        base: Pointer::default(),
        value: 42,
    });
    builtin.initialize_segments(vm.segments_mut());
    let base = builtin.base();
    vm.add_builtin(builtin);

    load_program(&mut vm, &[0x4003_8000_7ffe_7fff]);
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 0), base)
        .unwrap();

    vm.step().unwrap();

    // The deduced cell has been materialized in the builtin's segment, and the
    // destination was deduced from it.
    assert_eq!(
        vm.memory().get(Pointer::new(2, 0)),
        Some(&Value::Scalar(Felt::from(42)))
    );
    assert_eq!(
        vm.memory().get(Pointer::new(1, 1)),
        Some(&Value::Scalar(Felt::from(42)))
    );
}

#[test]
fn deduce_memory_cell_matches_segments() {
    let mut vm = initialized_vm();
    let mut builtin = Box::new(ConstBuiltin {
        base: Pointer::default(),
        value: 7,
    });
    builtin.initialize_segments(vm.segments_mut());
    vm.add_builtin(builtin);

    assert_eq!(
        vm.deduce_memory_cell(Pointer::new(2, 4)).unwrap(),
        Some(Value::Scalar(Felt::from(7)))
    );
    assert_eq!(vm.deduce_memory_cell(Pointer::new(1, 0)).unwrap(), None);
    assert_eq!(vm.deduce_memory_cell(Pointer::new(-1, 0)).unwrap(), None);
}

#[test]
fn relocation_flattens_memory_and_trace() {
    let mut vm = initialized_vm();
    load_program(&mut vm, &[0x4033_8000_7ffe_7fff]);
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 0), Felt::from(2))
        .unwrap();
    vm.segments_mut()
        .memory
        .insert(Pointer::new(1, 1), Felt::from(5))
        .unwrap();
    vm.step().unwrap();

    assert_eq!(vm.get_relocated_trace(), Err(Error::TraceNotRelocated));
    vm.relocate().unwrap();

    // Segment sizes are [1, 3], so the relocation table is [1, 2, 5].
    let relocated = vm.relocated_memory();
    assert_eq!(relocated[&2], Felt::from(2));
    assert_eq!(relocated[&3], Felt::from(5));
    assert_eq!(relocated[&4], Felt::from(3));
    assert_eq!(relocated.len(), 4);

    assert_eq!(
        vm.get_relocated_trace().unwrap(),
        &[RelocatedTraceEntry {
            pc: Felt::from(1),
            ap: Felt::from(4),
            fp: Felt::from(4),
        }]
    );
}

#[test]
fn relocation_of_an_empty_run_is_a_no_op() {
    let mut vm = initialized_vm();
    vm.relocate().unwrap();
    assert!(vm.relocated_memory().is_empty());
    assert_eq!(vm.get_relocated_trace(), Err(Error::TraceNotRelocated));
}
