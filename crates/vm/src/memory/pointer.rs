//! Defines the [`Pointer`] type.

use std::fmt;

use num_traits::ToPrimitive;
use starknet_types_core::felt::Felt;

use crate::error::Error;

/// A pointer within a [`Memory`](super::Memory) segment.
///
/// A negative `segment` designates a *temporary* segment, created during execution and
/// only given a final location once the run has ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Pointer {
    /// The index of the segment in the memory.
    ///
    /// This can be thought of as the provenance of the pointer.
    pub segment: isize,
    /// The offset within the segment.
    pub offset: usize,
}

impl Pointer {
    /// Creates a new [`Pointer`] from a segment index and an offset.
    #[inline(always)]
    pub const fn new(segment: isize, offset: usize) -> Self {
        Self { segment, offset }
    }

    /// Adds a signed offset to `self.offset`, keeping the provenance.
    ///
    /// Fails with [`Error::OffsetOverflow`] if the resulting offset leaves the representable
    /// range.
    pub fn add_offset(self, offset: isize) -> Result<Self, Error> {
        let offset = self
            .offset
            .checked_add_signed(offset)
            .ok_or(Error::OffsetOverflow)?;
        Ok(Self {
            segment: self.segment,
            offset,
        })
    }

    /// Adds an unsigned offset to `self.offset`, keeping the provenance.
    pub fn add_usize(self, offset: usize) -> Result<Self, Error> {
        let offset = self
            .offset
            .checked_add(offset)
            .ok_or(Error::OffsetOverflow)?;
        Ok(Self {
            segment: self.segment,
            offset,
        })
    }

    /// Adds a field element to `self.offset`, keeping the provenance.
    ///
    /// The field element must fit in the physical address range of the machine, otherwise
    /// [`Error::PointerTooLarge`] is returned.
    pub fn add_felt(self, felt: &Felt) -> Result<Self, Error> {
        let offset = felt.to_usize().ok_or(Error::PointerTooLarge)?;
        self.add_usize(offset)
    }

    /// Subtracts a field element from `self.offset`, keeping the provenance.
    pub fn sub_felt(self, felt: &Felt) -> Result<Self, Error> {
        let offset = felt.to_usize().ok_or(Error::PointerTooLarge)?;
        let offset = self
            .offset
            .checked_sub(offset)
            .ok_or(Error::OffsetOverflow)?;
        Ok(Self {
            segment: self.segment,
            offset,
        })
    }

    /// Returns the distance between `self` and `other`, given that both refer to the same
    /// segment.
    ///
    /// Fails with [`Error::IncoherentProvenance`] when the provenances differ and with
    /// [`Error::OffsetOverflow`] when `other` lies past `self`.
    pub fn sub(&self, other: &Self) -> Result<usize, Error> {
        if self.segment != other.segment {
            return Err(Error::IncoherentProvenance);
        }
        self.offset
            .checked_sub(other.offset)
            .ok_or(Error::OffsetOverflow)
    }

    /// Adds a [`Value`](super::Value) to `self`.
    ///
    /// Only scalar values can be used as displacements; adding a pointer to a pointer is
    /// rejected with [`Error::InvalidPointerArithmetic`].
    pub fn add_value(self, value: &super::Value) -> Result<Self, Error> {
        match value {
            super::Value::Scalar(felt) => self.add_felt(felt),
            super::Value::Pointer(_) => Err(Error::InvalidPointerArithmetic),
        }
    }

    /// Computes the flat address of `self` given a relocation table.
    ///
    /// Pointers into temporary segments have no slot in the table and fail with
    /// [`Error::UnrelocatedMemory`].
    pub fn relocate(&self, table: &[usize]) -> Result<usize, Error> {
        if self.segment < 0 {
            return Err(Error::UnrelocatedMemory);
        }
        let base = table
            .get(self.segment as usize)
            .ok_or(Error::UnrelocatedMemory)?;
        base.checked_add(self.offset).ok_or(Error::OffsetOverflow)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.offset)
    }
}
