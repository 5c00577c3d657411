//! Defines the [`Error`] type of the crate.

use thiserror::Error;

/// An error that might occur when executing a Cairo program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The program counter is pointing to an unknown memory cell, or the memory cell was
    /// known but contained a pointer rather than a scalar value.
    #[error("the program counter points to a cell that does not hold an instruction")]
    ProgramCounterLost,
    /// A memory cell supposed to contain an instruction held a field element that did not
    /// fit in a 64-bit unsigned integer.
    #[error("the encoded instruction does not fit in 64 bits")]
    InstructionTooBig,
    /// The highest bit of an encoded instruction was set.
    ///
    /// A properly encoded instruction always has this bit cleared.
    #[error("the instruction encoding is undefined")]
    UndefinedInstruction,
    /// The source of the second operand of an instruction was invalid.
    #[error("the instruction encodes an undefined op1 source")]
    UndefinedOp1Source,
    /// The result logic of an instruction was invalid.
    #[error("the instruction encodes an undefined result logic")]
    UndefinedResultLogic,
    /// The update logic of the **Program Counter** of an instruction was invalid.
    #[error("the instruction encodes an undefined program counter update")]
    UndefinedPcUpdate,
    /// The update logic of the **Allocation Pointer** of an instruction was invalid.
    #[error("the instruction encodes an undefined allocation pointer update")]
    UndefinedApUpdate,
    /// In a `Call` instruction, the only allowed allocation pointer update is the implied
    /// two-cell increment.
    #[error("a call instruction cannot carry an explicit allocation pointer update")]
    UndefinedApUpdateInCall,
    /// The OP code of an instruction was invalid.
    #[error("the instruction encodes an undefined op code")]
    UndefinedOpCode,

    /// Attempted to insert a value into a temporary segment.
    #[error("cannot insert into a temporary segment")]
    NegativeSegment,
    /// Attempted to insert a value into a segment that has not been allocated yet.
    #[error("cannot insert into unallocated segment {segment} ({segment_count} segments allocated)")]
    UnallocatedSegment {
        /// The segment the insertion targeted.
        segment: isize,
        /// The number of segments currently allocated.
        segment_count: usize,
    },
    /// The value of one of the memory cells contradicted a previous assertion on that same
    /// memory cell.
    ///
    /// Memory is write-once; asserting a cell to two different values is a program error.
    #[error("memory is write-once, cannot overwrite a previously asserted value")]
    Contradiction,
    /// A pointer offset left the representable range.
    #[error("pointer offset out of range")]
    OffsetOverflow,
    /// Attempted to construct a pointer offset from a value that cannot be represented
    /// within the physical memory of the virtual machine.
    #[error("value too large to be used as a pointer offset")]
    PointerTooLarge,
    /// Tried to perform a pointer operation on two pointers that had different provenances.
    #[error("pointers belong to different segments")]
    IncoherentProvenance,
    /// Attempted a pointer operation that has no meaning, such as adding two pointers or
    /// multiplying by one.
    #[error("invalid pointer arithmetic")]
    InvalidPointerArithmetic,
    /// Attempted to divide by zero.
    #[error("division by zero")]
    DivideByZero,
    /// A pointer value was required but a scalar was found.
    #[error("expected a pointer value, found a scalar")]
    ExpectedPointer,
    /// A scalar value was required but a pointer was found.
    #[error("expected a scalar value, found a pointer")]
    ExpectedScalar,

    /// The destination address of an instruction could not be computed.
    #[error("failed to compute the destination address")]
    CantComputeDstAddr,
    /// The address of the first operand of an instruction could not be computed.
    #[error("failed to compute the op0 address")]
    CantComputeOp0Addr,
    /// The address of the second operand of an instruction could not be computed.
    #[error("failed to compute the op1 address")]
    CantComputeOp1Addr,
    /// The value of the first operand of an instruction could not be deduced from a builtin
    /// or a previous assertion.
    #[error("failed to compute or deduce op0")]
    CantDeduceOp0,
    /// The value of the second operand of an instruction could not be deduced from a builtin
    /// or a previous assertion.
    #[error("failed to compute or deduce op1")]
    CantDeduceOp1,
    /// The destination of an instruction was neither present in memory nor deducible.
    #[error("failed to compute or deduce the destination value")]
    NoDst,

    /// An `AssertEq` instruction ran with an unconstrained result.
    #[error("an assertion requires a constrained result")]
    UnconstrainedResAssertEq,
    /// An `AssertEq` instruction found two different values.
    #[error("assertion failed: result and destination differ")]
    DiffAssertValues,
    /// A `Call` instruction found a return program counter differing from the expected one.
    #[error("cannot write the return program counter: the cell holds a different value")]
    CantWriteReturnPc,
    /// A `Call` instruction found a return frame pointer differing from the expected one.
    #[error("cannot write the return frame pointer: the cell holds a different value")]
    CantWriteReturnFp,

    /// An unconstrained result cannot be added to the **Allocation Pointer**.
    #[error("an unconstrained result cannot be used in an ap update")]
    UnconstrainedResAdd,
    /// An unconstrained result cannot be used as an absolute jump target.
    #[error("an unconstrained result cannot be used in an absolute jump")]
    UnconstrainedResJump,
    /// An unconstrained result cannot be used as a relative jump offset.
    #[error("an unconstrained result cannot be used in a relative jump")]
    UnconstrainedResJumpRel,

    /// Segment sizes must be computed before a relocation table can be built.
    #[error("effective segment sizes have not been computed")]
    EffectiveSizesNotComputed,
    /// The relocation table is missing an entry for the execution segment.
    #[error("no relocation found for the execution segment")]
    NoRelocationForExecutionSegment,
    /// The trace has not been relocated yet.
    #[error("trace not relocated")]
    TraceNotRelocated,
    /// A stored value points into a segment that has no slot in the relocation table.
    #[error("memory holds a pointer into an unrelocated segment")]
    UnrelocatedMemory,

    /// A builtin failed to run correctly because of invalid input.
    #[error("builtin {0} rejected its input")]
    Builtin(&'static str),
}
