//! # cairo-vm-core
//!
//! A Cairo assembly interpreter producing relocatable execution traces.
//!
//! # Documentation
//!
//! - [The Cairo Whitepaper](https://www.cairo-lang.org/cairo-whitepaper/).
//!
//! # Field
//!
//! Technically, the Cairo language allows any prime field to be used as the underlying
//! field for the virtual machine. However, in practice, the only field that this crate is
//! meant to be used with is the Starknet field element [`Felt`]. For this reason, it is not
//! possible to change the underlying field of the virtual machine.
//!
//! # Components
//!
//! The [`CairoVM`] is composed of three main components:
//!
//! - [`Cpu`]: the register file of the virtual machine, holding the program counter and the
//!   allocation and frame pointers.
//!
//! - [`SegmentManager`]: the segmented, write-once memory instructions and working data are
//!   stored in, together with the machinery turning it into a flat address space once the
//!   run has ended.
//!
//! - [`Builtin`]s: external capabilities attached to dedicated segments, able to deduce
//!   memory cells and to enforce validation rules.

#![warn(missing_docs, missing_debug_implementations)]

use std::collections::HashMap;
use std::fmt;

use num_traits::ToPrimitive;
use starknet_types_core::felt::Felt;
use tracing::{debug, trace};

use builtin::Builtin;
use cpu::Cpu;
use error::Error;
use instr::{ApUpdate, FpUpdate, Instruction, OpCode, PcUpdate, ResultLogic};
use memory::{Memory, Pointer, SegmentManager, Value};
use trace::{RelocatedTraceEntry, TraceEntry};

pub mod builtin;
pub mod cpu;
pub mod error;
pub mod instr;
pub mod memory;
pub mod trace;

/// The operands of an instruction, as resolved by
/// [`compute_operands`](CairoVM::compute_operands).
///
/// Every operand that was not already present in memory has been deduced and materialized
/// into memory by the time this structure exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Operands {
    /// The destination of the instruction.
    pub dst: Value,
    /// The result of the instruction, if it is constrained.
    pub res: Option<Value>,
    /// The first operand of the instruction.
    pub op0: Value,
    /// The second operand of the instruction.
    pub op1: Value,
}

/// Contains the full state of a Cairo virtual machine.
///
/// This includes memory, registers, builtins, etc. It can be used to execute a Cairo
/// program and gather execution statistics, traces and other related information.
pub struct CairoVM {
    /// The register file of the virtual machine.
    cpu: Cpu,
    /// The segmented memory of the virtual machine, together with its segment allocator.
    segments: SegmentManager,
    /// The builtins installed in the virtual machine, in registration order.
    builtins: Vec<Box<dyn Builtin>>,
    /// The trace entries recorded so far, one per executed instruction.
    trace: Vec<TraceEntry>,
    /// The relocated form of `trace`, filled by [`relocate`](Self::relocate).
    relocated_trace: Vec<RelocatedTraceEntry>,
    /// The flat memory image, filled by [`relocate`](Self::relocate).
    relocated_memory: HashMap<usize, Felt>,
    /// The number of instructions executed so far.
    current_step: usize,
}

impl CairoVM {
    /// Creates a new [`CairoVM`] with an empty memory and zeroed registers.
    pub fn new() -> Self {
        Self {
            cpu: Cpu::default(),
            segments: SegmentManager::new(),
            builtins: Vec::new(),
            trace: Vec::new(),
            relocated_trace: Vec::new(),
            relocated_memory: HashMap::new(),
            current_step: 0,
        }
    }

    /// Returns the current state of the [`Cpu`].
    #[inline(always)]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Returns a mutable reference to the [`Cpu`], allowing a runner to set up the initial
    /// register state.
    #[inline(always)]
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// Returns the [`SegmentManager`] of the virtual machine.
    #[inline(always)]
    pub fn segments(&self) -> &SegmentManager {
        &self.segments
    }

    /// Returns a mutable reference to the [`SegmentManager`], allowing a runner to allocate
    /// segments and load program data.
    #[inline(always)]
    pub fn segments_mut(&mut self) -> &mut SegmentManager {
        &mut self.segments
    }

    /// Returns the current state of the [`Memory`].
    #[inline(always)]
    pub fn memory(&self) -> &Memory {
        &self.segments.memory
    }

    /// Returns the trace entries recorded so far.
    #[inline(always)]
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Returns the number of instructions executed so far.
    #[inline(always)]
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Returns the flat memory image computed by [`relocate`](Self::relocate).
    #[inline(always)]
    pub fn relocated_memory(&self) -> &HashMap<usize, Felt> {
        &self.relocated_memory
    }

    /// Installs a [`Builtin`] into the virtual machine.
    ///
    /// The builtin must already have its segment allocated; the virtual machine will
    /// consult it for every missing operand read from that segment.
    pub fn add_builtin(&mut self, builtin: Box<dyn Builtin>) {
        self.builtins.push(builtin);
    }

    /// Advances the virtual machine by a single step.
    ///
    /// A step fetches and decodes the instruction referenced by the program counter,
    /// resolves its operands (deducing and materializing the missing ones), checks the
    /// opcode assertions, records a trace entry and finally updates the registers.
    ///
    /// Any error leaves the registers untouched; operand values already materialized into
    /// memory remain there, which is harmless since they are exactly the values the
    /// program semantics require.
    pub fn step(&mut self) -> Result<(), Error> {
        let instruction = self.fetch_instruction()?;
        trace!(step = self.current_step, pc = %self.cpu.pc, "executing instruction");

        let operands = self.compute_operands(&instruction)?;
        self.opcode_assertions(&instruction, &operands)?;

        self.trace.push(TraceEntry {
            pc: self.cpu.pc,
            ap: self.cpu.ap,
            fp: self.cpu.fp,
        });

        self.update_registers(&instruction, &operands)?;
        self.current_step += 1;

        Ok(())
    }

    /// Steps the virtual machine until the program counter reaches `end`.
    pub fn run_until_pc(&mut self, end: Pointer) -> Result<(), Error> {
        while self.cpu.pc != end {
            self.step()?;
        }
        Ok(())
    }

    /// Fetches and decodes the instruction referenced by the program counter.
    fn fetch_instruction(&self) -> Result<Instruction, Error> {
        let cell = self
            .memory()
            .get(self.cpu.pc)
            .ok_or(Error::ProgramCounterLost)?;
        let felt = cell.scalar().ok_or(Error::ProgramCounterLost)?;
        let word = felt.to_u64().ok_or(Error::InstructionTooBig)?;

        Instruction::decode(word)
    }

    /// Resolves the operands of an instruction.
    ///
    /// Each operand is first read from memory. A missing operand is deduced, first by the
    /// builtin owning its segment and then from the other operands and the instruction
    /// itself; the deduced value is materialized into memory before the function returns.
    pub fn compute_operands(&mut self, instruction: &Instruction) -> Result<Operands, Error> {
        let dst_addr = self.cpu.compute_dst_addr(instruction)?;
        let mut dst = self.memory().get(dst_addr).copied();

        let op0_addr = self.cpu.compute_op0_addr(instruction)?;
        let op0_read = self.memory().get(op0_addr).copied();

        let op1_addr = self.cpu.compute_op1_addr(instruction, op0_read.as_ref())?;
        let op1_read = self.memory().get(op1_addr).copied();

        let mut res = None;

        let op0 = match op0_read {
            Some(op0) => op0,
            None => self.compute_op0_deductions(
                op0_addr,
                instruction,
                dst.as_ref(),
                op1_read.as_ref(),
                &mut res,
            )?,
        };

        let op1 = match op1_read {
            Some(op1) => op1,
            None => self.compute_op1_deductions(
                op1_addr,
                instruction,
                dst.as_ref(),
                Some(&op0),
                &mut res,
            )?,
        };

        if res.is_none() {
            res = self.compute_res(instruction, &op0, &op1)?;
        }

        if dst.is_none() {
            dst = self.deduce_dst(instruction, res.as_ref());
            if let Some(dst) = dst {
                self.segments.memory.insert(dst_addr, dst)?;
            }
        }

        Ok(Operands {
            dst: dst.ok_or(Error::NoDst)?,
            res,
            op0,
            op1,
        })
    }

    /// Runs the deductions for the first operand, materializing the deduced value.
    ///
    /// The builtin owning the operand's segment is consulted first; failing that, the
    /// operand is deduced from the destination and the second operand. When the result of
    /// the instruction is deduced in the process, it is stored in `res`.
    fn compute_op0_deductions(
        &mut self,
        op0_addr: Pointer,
        instruction: &Instruction,
        dst: Option<&Value>,
        op1: Option<&Value>,
        res: &mut Option<Value>,
    ) -> Result<Value, Error> {
        let mut op0 = self.deduce_memory_cell(op0_addr)?;

        if op0.is_none() {
            let (deduced_op0, deduced_res) = self.deduce_op0(instruction, dst, op1)?;
            op0 = deduced_op0;
            *res = deduced_res;
        }

        let op0 = op0.ok_or(Error::CantDeduceOp0)?;
        self.segments.memory.insert(op0_addr, op0)?;
        Ok(op0)
    }

    /// Runs the deductions for the second operand, materializing the deduced value.
    ///
    /// Symmetric to [`compute_op0_deductions`](Self::compute_op0_deductions); a result
    /// deduced here never overrides one deduced earlier.
    fn compute_op1_deductions(
        &mut self,
        op1_addr: Pointer,
        instruction: &Instruction,
        dst: Option<&Value>,
        op0: Option<&Value>,
        res: &mut Option<Value>,
    ) -> Result<Value, Error> {
        let mut op1 = self.deduce_memory_cell(op1_addr)?;

        if op1.is_none() {
            let (deduced_op1, deduced_res) = self.deduce_op1(instruction, dst, op0)?;
            op1 = deduced_op1;
            if res.is_none() {
                *res = deduced_res;
            }
        }

        let op1 = op1.ok_or(Error::CantDeduceOp1)?;
        self.segments.memory.insert(op1_addr, op1)?;
        Ok(op1)
    }

    /// Attempts to deduce the first operand from the destination and the second operand.
    ///
    /// Returns the deduced operand, if any, along with the result of the instruction when
    /// the deduction fixes it as well.
    fn deduce_op0(
        &self,
        instruction: &Instruction,
        dst: Option<&Value>,
        op1: Option<&Value>,
    ) -> Result<(Option<Value>, Option<Value>), Error> {
        match instruction.op_code()? {
            OpCode::Call => {
                // In a call, op0 holds the return program counter.
                let return_pc = self.cpu.pc.add_usize(instruction.size())?;
                Ok((Some(return_pc.into()), None))
            }
            OpCode::AssertEq => match instruction.result_logic()? {
                ResultLogic::Add => match (dst, op1) {
                    //     dst = op0 + op1
                    // =>  op0 = dst - op1
                    (Some(dst), Some(op1)) => {
                        Ok((Some(dst.subtract(op1)?), Some(*dst)))
                    }
                    _ => Ok((None, None)),
                },
                ResultLogic::Mul => match (dst, op1) {
                    //     dst = op0 * op1
                    // =>  op0 = dst / op1
                    (Some(dst), Some(op1))
                        if dst.scalar().is_some()
                            && op1.scalar().is_some_and(|f| f != &Felt::ZERO) =>
                    {
                        Ok((Some(dst.divide(op1)?), Some(*dst)))
                    }
                    _ => Ok((None, None)),
                },
                _ => Ok((None, None)),
            },
            _ => Ok((None, None)),
        }
    }

    /// Attempts to deduce the second operand from the destination and the first operand.
    fn deduce_op1(
        &self,
        instruction: &Instruction,
        dst: Option<&Value>,
        op0: Option<&Value>,
    ) -> Result<(Option<Value>, Option<Value>), Error> {
        if instruction.op_code()? != OpCode::AssertEq {
            return Ok((None, None));
        }

        match instruction.result_logic()? {
            //    dst = op1
            ResultLogic::Op1 => Ok((dst.copied(), dst.copied())),
            ResultLogic::Add => match (dst, op0) {
                //     dst = op0 + op1
                // =>  op1 = dst - op0
                (Some(dst), Some(op0)) => Ok((Some(dst.subtract(op0)?), Some(*dst))),
                _ => Ok((None, None)),
            },
            ResultLogic::Mul => match (dst, op0) {
                //     dst = op0 * op1
                // =>  op1 = dst / op0
                (Some(dst), Some(op0))
                    if dst.scalar().is_some()
                        && op0.scalar().is_some_and(|f| f != &Felt::ZERO) =>
                {
                    Ok((Some(dst.divide(op0)?), Some(*dst)))
                }
                _ => Ok((None, None)),
            },
            ResultLogic::Unconstrained => Ok((None, None)),
        }
    }

    /// Computes the result of an instruction from its two operands.
    ///
    /// An unconstrained result is not an error: it simply means the instruction never
    /// looks at it.
    fn compute_res(
        &self,
        instruction: &Instruction,
        op0: &Value,
        op1: &Value,
    ) -> Result<Option<Value>, Error> {
        match instruction.result_logic()? {
            ResultLogic::Op1 => Ok(Some(*op1)),
            ResultLogic::Add => Ok(Some(op0.add(op1)?)),
            ResultLogic::Mul => Ok(Some(op0.multiply(op1)?)),
            ResultLogic::Unconstrained => Ok(None),
        }
    }

    /// Attempts to deduce the destination of an instruction from its result.
    fn deduce_dst(&self, instruction: &Instruction, res: Option<&Value>) -> Option<Value> {
        match instruction.op_code() {
            Ok(OpCode::AssertEq) => res.copied(),
            // In a call, dst holds the caller's frame pointer.
            Ok(OpCode::Call) => Some(self.cpu.fp.into()),
            _ => None,
        }
    }

    /// Checks the assertions implied by the OP code of an instruction.
    fn opcode_assertions(
        &self,
        instruction: &Instruction,
        operands: &Operands,
    ) -> Result<(), Error> {
        match instruction.op_code()? {
            OpCode::AssertEq => {
                let res = operands.res.as_ref().ok_or(Error::UnconstrainedResAssertEq)?;
                if res != &operands.dst {
                    return Err(Error::DiffAssertValues);
                }
                Ok(())
            }
            OpCode::Call => {
                let return_pc = self.cpu.pc.add_usize(instruction.size())?;
                if operands.op0 != return_pc {
                    return Err(Error::CantWriteReturnPc);
                }
                if operands.dst != self.cpu.fp {
                    return Err(Error::CantWriteReturnFp);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Updates the registers according to the executed instruction.
    ///
    /// The frame pointer is updated first so that a return's `fp ← dst` has taken effect
    /// before the other updates run, then the allocation pointer, then the program
    /// counter.
    fn update_registers(
        &mut self,
        instruction: &Instruction,
        operands: &Operands,
    ) -> Result<(), Error> {
        self.update_fp(instruction, operands)?;
        self.update_ap(instruction, operands)?;
        self.update_pc(instruction, operands)
    }

    /// Updates the **Frame Pointer** according to the executed instruction.
    fn update_fp(&mut self, instruction: &Instruction, operands: &Operands) -> Result<(), Error> {
        match instruction.fp_update()? {
            FpUpdate::Regular => (),
            FpUpdate::ApPlus2 => self.cpu.fp = self.cpu.ap.add_usize(2)?,
            FpUpdate::Dst => match &operands.dst {
                Value::Pointer(pointer) => self.cpu.fp = *pointer,
                Value::Scalar(felt) => self.cpu.fp = self.cpu.fp.add_felt(felt)?,
            },
        }
        Ok(())
    }

    /// Updates the **Allocation Pointer** according to the executed instruction.
    fn update_ap(&mut self, instruction: &Instruction, operands: &Operands) -> Result<(), Error> {
        match instruction.ap_update()? {
            ApUpdate::Regular => (),
            ApUpdate::Add => {
                let res = operands.res.as_ref().ok_or(Error::UnconstrainedResAdd)?;
                self.cpu.ap = self.cpu.ap.add_value(res)?;
            }
            ApUpdate::Add1 => self.cpu.ap = self.cpu.ap.add_usize(1)?,
            ApUpdate::Add2 => self.cpu.ap = self.cpu.ap.add_usize(2)?,
        }
        Ok(())
    }

    /// Updates the **Program Counter** according to the executed instruction.
    fn update_pc(&mut self, instruction: &Instruction, operands: &Operands) -> Result<(), Error> {
        match instruction.pc_update()? {
            PcUpdate::Regular => {
                self.cpu.pc = self.cpu.pc.add_usize(instruction.size())?;
            }
            PcUpdate::AbsoluteJump => {
                let res = operands.res.as_ref().ok_or(Error::UnconstrainedResJump)?;
                self.cpu.pc = *res.pointer().ok_or(Error::ExpectedPointer)?;
            }
            PcUpdate::RelativeJump => {
                let res = operands.res.as_ref().ok_or(Error::UnconstrainedResJumpRel)?;
                let felt = res.scalar().ok_or(Error::ExpectedScalar)?;
                self.cpu.pc = self.cpu.pc.add_felt(felt)?;
            }
            PcUpdate::ConditionalJump => {
                if operands.dst.is_zero() {
                    self.cpu.pc = self.cpu.pc.add_usize(instruction.size())?;
                } else {
                    self.cpu.pc = self.cpu.pc.add_value(&operands.op1)?;
                }
            }
        }
        Ok(())
    }

    /// Attempts to deduce the value of a memory cell using one of the installed builtins.
    ///
    /// The builtin whose base segment matches the address is consulted; cells outside any
    /// builtin segment (including temporary ones) have no deduction.
    pub fn deduce_memory_cell(&self, addr: Pointer) -> Result<Option<Value>, Error> {
        if addr.segment < 0 {
            return Ok(None);
        }

        for builtin in &self.builtins {
            if builtin.base().segment == addr.segment {
                return builtin.deduce(addr, self.memory());
            }
        }

        Ok(None)
    }

    /// Turns the segmented memory and the recorded trace into their flat, relocated forms.
    ///
    /// Nothing is relocated when no instruction has been executed.
    pub fn relocate(&mut self) -> Result<(), Error> {
        self.segments.compute_effective_sizes();
        if self.trace.is_empty() {
            return Ok(());
        }

        let table = self.segments.relocate_segments()?;
        debug!(segments = table.len() - 1, "relocating memory and trace");

        self.relocated_memory = self.segments.relocate_memory(&table)?;
        self.relocate_trace(&table)
    }

    /// Projects every recorded trace entry through the relocation table.
    fn relocate_trace(&mut self, table: &[usize]) -> Result<(), Error> {
        if table.len() < 2 {
            return Err(Error::NoRelocationForExecutionSegment);
        }

        self.relocated_trace = self
            .trace
            .iter()
            .map(|entry| {
                Ok(RelocatedTraceEntry {
                    pc: Felt::from(entry.pc.relocate(table)? as u64),
                    ap: Felt::from(entry.ap.relocate(table)? as u64),
                    fp: Felt::from(entry.fp.relocate(table)? as u64),
                })
            })
            .collect::<Result<_, Error>>()?;

        Ok(())
    }

    /// Returns the relocated trace.
    ///
    /// Fails with [`Error::TraceNotRelocated`] until [`relocate`](Self::relocate) has run
    /// over a non-empty trace.
    pub fn get_relocated_trace(&self) -> Result<&[RelocatedTraceEntry], Error> {
        if self.relocated_trace.is_empty() {
            Err(Error::TraceNotRelocated)
        } else {
            Ok(&self.relocated_trace)
        }
    }
}

impl Default for CairoVM {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CairoVM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CairoVM")
            .field("cpu", &self.cpu)
            .field("segments", &self.segments)
            .field("builtins", &self.builtins.len())
            .field("current_step", &self.current_step)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod vm_tests;
