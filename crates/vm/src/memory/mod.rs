//! Defines the [`Memory`] type, responsible for representing the memory of a Cairo virtual
//! machine, and the [`SegmentManager`] that allocates and relocates its segments.
//!
//! # Immutable Memory
//!
//! Note that the memory of a Cairo virtual machine does not work in the same way regular
//! computer memory does. Instead, it is mathematically immutable, and every operation that
//! would normally mutate memory instead *asserts* a memory cell to a specific value. The
//! value was previously unknown, and now it is defined to a specific value. Any access to
//! that memory cell must now confirm its value is the same as the one it was asserted to.
//!
//! # Segments
//!
//! Each cell of the memory holds an element of a field (in this case, the Starknet field is
//! used). And the total size of the memory is the size of that field. Because it's not
//! possible to represent a field of that size in a regular computer's memory, the Cairo
//! language requires programs to split their memory into *segments*. Each segment is a
//! contiguous block of memory that is located *somewhere* in the virtual machine's address
//! space. The final location of segments is not decided until the program has finished
//! running, meaning that a program can never rely on the final location of a segment.

use std::collections::{HashMap, HashSet};
use std::fmt;

mod manager;
mod pointer;
mod segment;
mod value;

pub use self::manager::*;
pub use self::pointer::*;
pub use self::segment::*;
pub use self::value::*;

use crate::error::Error;

/// A function that validates a memory cell on behalf of a builtin, returning the list of
/// addresses it managed to validate.
///
/// Rules may read the memory but never write to it.
pub type ValidationRule = Box<dyn Fn(&Memory, Pointer) -> Result<Vec<Pointer>, Error>>;

/// Represents the memory of the Cairo virtual machine.
///
/// More information on memory can be found in the [module-level documentation](self).
#[derive(Default)]
pub struct Memory {
    /// The segments that have been allocated in the memory, indexed by their non-negative
    /// segment index.
    segments: Vec<Segment>,
    /// The validation rules installed by builtins, keyed by segment index.
    validation_rules: HashMap<usize, ValidationRule>,
    /// The addresses that have already been validated.
    ///
    /// Keeping this set around makes validation idempotent.
    validated_addresses: HashSet<Pointer>,
}

impl Memory {
    /// Creates a new empty [`Memory`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of segments currently allocated.
    #[inline(always)]
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Returns a [`Segment`] of the memory, if it has been allocated.
    #[inline(always)]
    pub fn segment(&self, segment: usize) -> Option<&Segment> {
        self.segments.get(segment)
    }

    /// Allocates a new segment and returns its index.
    pub(crate) fn push_segment(&mut self) -> usize {
        self.segments.push(Segment::new());
        self.segments.len() - 1
    }

    /// Returns the value stored at `addr`, if it is known.
    ///
    /// Temporary, unallocated and unknown addresses all read back as `None`; it is up to
    /// the caller to decide whether that absence is an error.
    pub fn get(&self, addr: Pointer) -> Option<&Value> {
        if addr.segment < 0 {
            return None;
        }
        self.segments.get(addr.segment as usize)?.get(addr.offset)
    }

    /// Attempts to assert that the memory cell at `addr` has a given value.
    ///
    /// Memory is write-once: asserting an unknown cell defines it, re-asserting the same
    /// value is a no-op, and asserting a different value fails with
    /// [`Error::Contradiction`]. A successful insertion triggers the validation rule
    /// installed for the segment, if any.
    pub fn insert(&mut self, addr: Pointer, value: impl Into<Value>) -> Result<(), Error> {
        if addr.segment < 0 {
            return Err(Error::NegativeSegment);
        }

        let segment = addr.segment as usize;
        let segment_count = self.segments.len();
        self.segments
            .get_mut(segment)
            .ok_or(Error::UnallocatedSegment {
                segment: addr.segment,
                segment_count,
            })?
            .assert_eq(addr.offset, value.into())?;

        self.validate_address(addr)
    }

    /// Installs a validation rule for a given segment.
    pub fn add_validation_rule(&mut self, segment: usize, rule: ValidationRule) {
        self.validation_rules.insert(segment, rule);
    }

    /// Applies the validation rule for the segment of `addr`, if any.
    ///
    /// Temporary and already validated addresses are skipped.
    fn validate_address(&mut self, addr: Pointer) -> Result<(), Error> {
        if addr.segment < 0 || self.validated_addresses.contains(&addr) {
            return Ok(());
        }

        let validated = match self.validation_rules.get(&(addr.segment as usize)) {
            Some(rule) => rule(self, addr)?,
            None => return Ok(()),
        };

        self.validated_addresses.extend(validated);
        Ok(())
    }

    /// Applies the validation rules to every address currently stored in memory.
    ///
    /// Addresses that have already been validated are not validated again.
    pub fn validate_existing_memory(&mut self) -> Result<(), Error> {
        let addresses: Vec<Pointer> = self.iter().map(|(addr, _)| addr).collect();
        for addr in addresses {
            self.validate_address(addr)?;
        }
        Ok(())
    }

    /// Returns an iterator over every known cell of the memory and its address.
    pub fn iter(&self) -> impl Iterator<Item = (Pointer, &Value)> {
        self.segments.iter().enumerate().flat_map(|(seg, segment)| {
            segment
                .iter()
                .map(move |(offset, value)| (Pointer::new(seg as isize, offset), value))
        })
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("segments", &self.segments)
            .field("validation_rules", &self.validation_rules.len())
            .field("validated_addresses", &self.validated_addresses.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use starknet_types_core::felt::Felt;

    use super::*;

    fn memory_with_segments(n: usize) -> Memory {
        let mut memory = Memory::new();
        for _ in 0..n {
            memory.push_segment();
        }
        memory
    }

    #[test]
    fn insert_then_get() {
        let mut memory = memory_with_segments(1);
        let addr = Pointer::new(0, 0);
        memory.insert(addr, Felt::from(5)).unwrap();
        assert_eq!(memory.get(addr), Some(&Value::Scalar(Felt::from(5))));
        assert_eq!(memory.get(Pointer::new(0, 1)), None);
    }

    #[test]
    fn insert_is_write_once() {
        let mut memory = memory_with_segments(1);
        let addr = Pointer::new(0, 0);
        memory.insert(addr, Felt::from(5)).unwrap();
        memory.insert(addr, Felt::from(5)).unwrap();
        assert_eq!(memory.insert(addr, Felt::from(6)), Err(Error::Contradiction));
        assert_eq!(memory.get(addr), Some(&Value::Scalar(Felt::from(5))));
    }

    #[test]
    fn insert_checks_segment_bounds() {
        let mut memory = memory_with_segments(1);
        assert_eq!(
            memory.insert(Pointer::new(-1, 0), Felt::ONE),
            Err(Error::NegativeSegment)
        );
        assert_eq!(
            memory.insert(Pointer::new(1, 0), Felt::ONE),
            Err(Error::UnallocatedSegment {
                segment: 1,
                segment_count: 1
            })
        );
    }

    #[test]
    fn validation_rule_runs_on_insert() {
        let mut memory = memory_with_segments(1);
        memory.add_validation_rule(
            0,
            Box::new(|memory, addr| match memory.get(addr) {
                Some(Value::Scalar(_)) => Ok(vec![addr]),
                _ => Err(Error::Builtin("test")),
            }),
        );

        memory.insert(Pointer::new(0, 0), Felt::from(7)).unwrap();
        assert!(memory.validated_addresses.contains(&Pointer::new(0, 0)));
        assert_eq!(
            memory.insert(Pointer::new(0, 1), Pointer::new(0, 0)),
            Err(Error::Builtin("test"))
        );
    }

    #[test]
    fn validate_existing_memory_covers_prior_inserts() {
        let mut memory = memory_with_segments(2);
        memory.insert(Pointer::new(0, 0), Felt::from(1)).unwrap();
        memory.insert(Pointer::new(0, 2), Felt::from(2)).unwrap();
        memory.add_validation_rule(0, Box::new(|_, addr| Ok(vec![addr])));

        memory.validate_existing_memory().unwrap();
        assert!(memory.validated_addresses.contains(&Pointer::new(0, 0)));
        assert!(memory.validated_addresses.contains(&Pointer::new(0, 2)));
        // Re-running must not grow the set.
        memory.validate_existing_memory().unwrap();
        assert_eq!(memory.validated_addresses.len(), 2);
    }

    proptest! {
        #[test]
        fn write_once_over_any_insert_sequence(
            ops in prop::collection::vec((0usize..8, 0u64..4), 1..64),
        ) {
            let mut memory = memory_with_segments(1);
            let mut model: HashMap<usize, u64> = HashMap::new();

            for (offset, value) in ops {
                let result = memory.insert(Pointer::new(0, offset), Felt::from(value));
                match model.get(&offset) {
                    Some(known) if *known != value => {
                        prop_assert_eq!(result, Err(Error::Contradiction));
                    }
                    _ => {
                        prop_assert_eq!(result, Ok(()));
                        model.insert(offset, value);
                    }
                }
            }

            for (offset, value) in model {
                prop_assert_eq!(
                    memory.get(Pointer::new(0, offset)),
                    Some(&Value::Scalar(Felt::from(value)))
                );
            }
        }
    }
}
