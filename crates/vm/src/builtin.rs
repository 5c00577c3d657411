//! Defines the [`Builtin`] trait responsible for executing built-in pre-defined functions.

use crate::error::Error;
use crate::memory::{Memory, Pointer, SegmentManager, Value};

/// A builtin that may be consulted by the virtual machine.
///
/// Each builtin owns a memory segment. Cells written into that segment are subject to the
/// builtin's validation rule, and cells read from it before being written may be *deduced*
/// by the builtin from its other cells.
pub trait Builtin {
    /// Returns the name of the builtin.
    fn name(&self) -> &'static str;

    /// Returns the first address of the builtin's memory segment.
    fn base(&self) -> Pointer;

    /// Allocates the memory segment backing the builtin.
    fn initialize_segments(&mut self, segments: &mut SegmentManager);

    /// Returns the values the runner must push onto the initial stack on behalf of this
    /// builtin.
    fn initial_stack(&self) -> Vec<Value>;

    /// Attempts to deduce the value of a specific memory cell within the builtin's
    /// segment.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(_))` if the builtin computed the value of the cell.
    ///
    /// - `Ok(None)` if the builtin has no deduction for the cell.
    ///
    /// - `Err(_)` if the builtin's segment holds invalid input.
    fn deduce(&self, addr: Pointer, memory: &Memory) -> Result<Option<Value>, Error>;

    /// Installs the builtin's validation rule into the memory.
    fn add_validation_rule(&self, memory: &mut Memory);
}

/// The range-check builtin.
///
/// Every cell written into its segment must be a scalar strictly below `2^128`.
#[derive(Debug, Default, Clone)]
pub struct RangeCheck {
    base: Pointer,
}

impl RangeCheck {
    /// The number of high big-endian bytes that must be zero for a scalar to pass the
    /// range check.
    const HIGH_BYTES: usize = 16;

    /// Creates a new [`RangeCheck`] builtin.
    ///
    /// The builtin is not usable until its segment has been allocated with
    /// [`Builtin::initialize_segments`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl Builtin for RangeCheck {
    fn name(&self) -> &'static str {
        "range_check"
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
        // The range check constrains values without ever producing any.
        Ok(None)
    }

    fn add_validation_rule(&self, memory: &mut Memory) {
        let name = self.name();
        memory.add_validation_rule(
            self.base.segment as usize,
            Box::new(move |memory, addr| {
                let felt = memory
                    .get(addr)
                    .and_then(Value::scalar)
                    .ok_or(Error::Builtin(name))?;

                if felt.to_bytes_be()[..Self::HIGH_BYTES] != [0; Self::HIGH_BYTES] {
                    return Err(Error::Builtin(name));
                }

                Ok(vec![addr])
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use starknet_types_core::felt::Felt;

    use super::*;

    fn initialized_range_check() -> (RangeCheck, SegmentManager) {
        let mut segments = SegmentManager::new();
        let mut builtin = RangeCheck::new();
        builtin.initialize_segments(&mut segments);
        builtin.add_validation_rule(&mut segments.memory);
        (builtin, segments)
    }

    #[test]
    fn accepts_values_below_the_bound() {
        let (builtin, mut segments) = initialized_range_check();
        segments
            .memory
            .insert(builtin.base(), Felt::from(u128::MAX))
            .unwrap();
    }

    #[test]
    fn rejects_values_at_the_bound() {
        let (builtin, mut segments) = initialized_range_check();
        let bound = Felt::from(u128::MAX) + Felt::ONE;
        assert_eq!(
            segments.memory.insert(builtin.base(), bound),
            Err(Error::Builtin("range_check"))
        );
    }

    #[test]
    fn rejects_pointers() {
        let (builtin, mut segments) = initialized_range_check();
        assert_eq!(
            segments.memory.insert(builtin.base(), builtin.base()),
            Err(Error::Builtin("range_check"))
        );
    }

    #[test]
    fn deduces_nothing() {
        let (builtin, segments) = initialized_range_check();
        assert_eq!(
            builtin.deduce(builtin.base(), &segments.memory).unwrap(),
            None
        );
    }

    #[test]
    fn initial_stack_holds_the_base() {
        let (builtin, _) = initialized_range_check();
        assert_eq!(builtin.initial_stack(), vec![Value::Pointer(builtin.base())]);
    }
}
