//! Defines the [`Segment`] type.

use crate::error::Error;

use super::Value;

/// A relocatable segment of memory accessible by the Cairo virtual machine.
///
/// # Representation
///
/// A program running in the Cairo virtual machine is technically allowed to access any value
/// within the address space of the machine. This address space has the size of the Starknet
/// field, which is not realistically representable in a regular computer's memory. Therefore,
/// the Cairo language requires programs to split their memory into *segments*. Each segment
/// is a contiguous block of memory that is located *somewhere* in the virtual machine's
/// address space. The final location of segments is not decided until the program has
/// finished running, meaning that a program can never rely on the final location of a
/// segment.
///
/// This means that a program can never realistically access an arbitrary absolute memory
/// location (since it doesn't know where it is located in the first place). This is good
/// news for us because it means we don't have to deal with *a lot* of fragmentation within
/// individual segments, enabling the use of flat arrays to represent segments. It is still
/// possible for "gaps" to appear within a segment, but they should remain relatively small
/// in most cases.
#[derive(Default, Debug, Clone)]
pub struct Segment {
    /// The cells of the segment, ordered by offset.
    ///
    /// A cell is `None` as long as its value has not been asserted.
    cells: Vec<Option<Value>>,
}

impl Segment {
    /// Creates a new empty [`Segment`].
    ///
    /// This function is guaranteed not to fail. In fact, no memory will be allocated by this
    /// function.
    pub const fn new() -> Self {
        Self { cells: Vec::new() }
    }

    /// Returns the offset one past the highest known cell in the segment.
    ///
    /// This is the *effective size* of the segment: gaps below the highest known cell are
    /// counted, addresses past it are not.
    #[inline(always)]
    pub fn highest_known_cell(&self) -> usize {
        self.cells.len()
    }

    /// Returns the memory cell at offset `index` in the segment, if it has been asserted to
    /// a specific value.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.cells.get(index)?.as_ref()
    }

    /// Attempts to assert that a memory cell in the segment has a given value.
    ///
    /// # Returns
    ///
    /// - If the cell already holds `value`, the function succeeds without doing anything.
    ///
    /// - If the cell is unknown, it is asserted to the given value and the function
    ///   succeeds.
    ///
    /// - If the cell holds a different value, the function fails with
    ///   [`Error::Contradiction`].
    pub fn assert_eq(&mut self, index: usize, value: Value) -> Result<(), Error> {
        if index >= self.cells.len() {
            self.cells.resize(index + 1, None);
        }

        match &self.cells[index] {
            None => {
                self.cells[index] = Some(value);
                Ok(())
            }
            Some(known) if *known == value => Ok(()),
            Some(_) => Err(Error::Contradiction),
        }
    }

    /// Returns an iterator over the known cells of the segment and their offsets.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Value)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(offset, cell)| Some((offset, cell.as_ref()?)))
    }
}
