//! Defines the trace entry types recorded during the execution of a Cairo program.

use starknet_types_core::felt::Felt;

use crate::memory::Pointer;

/// A snapshot of the three registers, captured once per executed instruction *before* the
/// register update takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    /// The **Program Counter** at the beginning of the step.
    pub pc: Pointer,
    /// The **Allocation Pointer** at the beginning of the step.
    pub ap: Pointer,
    /// The **Frame Pointer** at the beginning of the step.
    pub fp: Pointer,
}

/// A [`TraceEntry`] whose registers have been projected into the flat address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocatedTraceEntry {
    /// The relocated **Program Counter**.
    pub pc: Felt,
    /// The relocated **Allocation Pointer**.
    pub ap: Felt,
    /// The relocated **Frame Pointer**.
    pub fp: Felt,
}
