//! Defines the [`Cpu`] type, responsible for describing the state of the CPU.
//!
//! More information in the documentation for [`Cpu`].

use crate::error::Error;
use crate::instr::{DstRegister, Instruction, Op0Register, Op1Source};
use crate::memory::{Pointer, Value};

/// The Central Processing Unit (CPU) responsible for executing Cairo bytecode instructions.
///
/// By itself, a [`Cpu`] is not enough to execute a Cairo program. In order to do anything
/// useful, it has to be connected to a [`Memory`](crate::memory::Memory).
#[derive(Debug, Clone, Default)]
pub struct Cpu {
    /// The Program Counter of the CPU, pointing to the next instruction to be fetched from
    /// working memory.
    ///
    /// It is possible to change the segment in which **PC** points to using an absolute
    /// jump, preventing us from assuming that **PC** is always part of the same segment.
    pub pc: Pointer,
    /// The Allocation Pointer, incremented by most instructions that need to write to
    /// working memory.
    pub ap: Pointer,
    /// The Frame Pointer, pointing to the base of the current frame.
    pub fp: Pointer,
}

impl Cpu {
    /// Computes the address of the destination of an instruction.
    pub fn compute_dst_addr(&self, instruction: &Instruction) -> Result<Pointer, Error> {
        let base = match instruction.dst_register() {
            DstRegister::AP => self.ap,
            DstRegister::FP => self.fp,
        };

        base.add_offset(instruction.dst_offset() as isize)
            .map_err(|_| Error::CantComputeDstAddr)
    }

    /// Computes the address of the first operand of an instruction.
    pub fn compute_op0_addr(&self, instruction: &Instruction) -> Result<Pointer, Error> {
        let base = match instruction.op0_register() {
            Op0Register::AP => self.ap,
            Op0Register::FP => self.fp,
        };

        base.add_offset(instruction.op0_offset() as isize)
            .map_err(|_| Error::CantComputeOp0Addr)
    }

    /// Computes the address of the second operand of an instruction.
    ///
    /// When the second operand is read through the first one, the first operand must
    /// already be known and hold a pointer.
    pub fn compute_op1_addr(
        &self,
        instruction: &Instruction,
        op0: Option<&Value>,
    ) -> Result<Pointer, Error> {
        let offset = instruction.op1_offset() as isize;

        let base = match instruction.op1_source()? {
            Op1Source::Imm => {
                // An immediate always lives in the cell following the instruction.
                if offset != 1 {
                    return Err(Error::CantComputeOp1Addr);
                }
                self.pc
            }
            Op1Source::AP => self.ap,
            Op1Source::FP => self.fp,
            Op1Source::Op0 => match op0 {
                Some(value) => *value.pointer().ok_or(Error::ExpectedPointer)?,
                None => return Err(Error::CantComputeOp1Addr),
            },
        };

        base.add_offset(offset).map_err(|_| Error::CantComputeOp1Addr)
    }
}
