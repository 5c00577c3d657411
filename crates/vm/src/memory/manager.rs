//! Defines the [`SegmentManager`] type.

use std::collections::HashMap;

use starknet_types_core::felt::Felt;

use crate::error::Error;

use super::{Memory, Pointer, Segment, Value};

/// Allocates the segments of a [`Memory`] and turns them into a flat address space once the
/// program has finished running.
///
/// Segment sizes are only known at the end of a run. The manager first computes the
/// *effective size* of every segment (one past its highest known cell), derives from those
/// sizes a relocation table assigning each segment a base in the flat address space, and
/// finally projects every stored value through that table.
#[derive(Default, Debug)]
pub struct SegmentManager {
    /// The memory whose segments are being managed.
    pub memory: Memory,
    /// The number of temporary segments handed out so far.
    num_temporary_segments: usize,
    /// The effective segment sizes, once computed.
    segment_sizes: Option<Vec<usize>>,
}

impl SegmentManager {
    /// Creates a new [`SegmentManager`] with an empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new memory segment and returns a pointer to its first cell.
    pub fn add(&mut self) -> Pointer {
        let segment = self.memory.push_segment();
        Pointer::new(segment as isize, 0)
    }

    /// Allocates a new *temporary* segment and returns a pointer to its first cell.
    ///
    /// Temporary segments have negative indices (-1, -2, …) and are not backed by memory
    /// cells; they exist so that pointers into them can circulate before being given a
    /// final location.
    pub fn add_temporary_segment(&mut self) -> Pointer {
        self.num_temporary_segments += 1;
        Pointer::new(-(self.num_temporary_segments as isize), 0)
    }

    /// Writes a slice of values to consecutive addresses starting at `base`.
    ///
    /// Returns the first address past the written block. The usual write-once rules apply
    /// to every cell.
    pub fn load_data(&mut self, base: Pointer, data: &[Value]) -> Result<Pointer, Error> {
        for (i, value) in data.iter().enumerate() {
            self.memory.insert(base.add_usize(i)?, *value)?;
        }
        base.add_usize(data.len())
    }

    /// Computes the effective size of every allocated segment.
    ///
    /// The effective size of a segment is one past its highest known cell (zero for an
    /// empty segment). The result is cached for later relocation.
    pub fn compute_effective_sizes(&mut self) -> &[usize] {
        let sizes = (0..self.memory.num_segments())
            .map(|seg| {
                self.memory
                    .segment(seg)
                    .map(Segment::highest_known_cell)
                    .unwrap_or(0)
            })
            .collect();
        self.segment_sizes.insert(sizes)
    }

    /// Builds the relocation table from the effective segment sizes.
    ///
    /// The table has one entry per segment plus a final sentinel; entry `i` is the base
    /// address of segment `i` in the flat address space. Address `0` is reserved, so the
    /// first segment is relocated to `1`.
    pub fn relocate_segments(&self) -> Result<Vec<usize>, Error> {
        let sizes = self
            .segment_sizes
            .as_ref()
            .ok_or(Error::EffectiveSizesNotComputed)?;

        let mut table: Vec<usize> = Vec::with_capacity(sizes.len() + 1);
        table.push(1);
        for (i, size) in sizes.iter().enumerate() {
            let base = table[i].checked_add(*size).ok_or(Error::OffsetOverflow)?;
            table.push(base);
        }
        Ok(table)
    }

    /// Projects every stored value through the relocation table, producing the flat memory
    /// image.
    ///
    /// Scalars keep their value; pointers become the field element of their flat address.
    /// A stored pointer into a temporary segment has no flat address and fails with
    /// [`Error::UnrelocatedMemory`].
    pub fn relocate_memory(&self, table: &[usize]) -> Result<HashMap<usize, Felt>, Error> {
        let mut relocated = HashMap::new();
        for (addr, value) in self.memory.iter() {
            let flat_addr = addr.relocate(table)?;
            let felt = match value {
                Value::Scalar(felt) => *felt,
                Value::Pointer(pointer) => Felt::from(pointer.relocate(table)? as u64),
            };
            relocated.insert(flat_addr, felt);
        }
        Ok(relocated)
    }
}
