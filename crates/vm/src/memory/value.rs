//! Defines the [`Value`] type.

use std::fmt;

use num_traits::Zero;
use starknet_types_core::felt::Felt;

use crate::error::Error;

use super::Pointer;

/// A value that may be stored in a [`Memory`](super::Memory) segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// A scalar with no provenance information.
    ///
    /// In that case, the value simply carries a field element without any more information.
    Scalar(Felt),
    /// A pointer with an associated segment.
    ///
    /// In that case, the value is actually a pointer within a specific segment.
    Pointer(Pointer),
}

impl Value {
    /// Attempts to add two [`Value`]s.
    pub fn add(&self, other: &Self) -> Result<Self, Error> {
        match self {
            Self::Scalar(left) => match other {
                Self::Scalar(right) => Ok(Value::Scalar(left + right)),
                Self::Pointer(right) => Ok(right.add_felt(left)?.into()),
            },
            Self::Pointer(left) => match other {
                Self::Scalar(right) => Ok(left.add_felt(right)?.into()),
                Self::Pointer(_) => Err(Error::InvalidPointerArithmetic),
            },
        }
    }

    /// Attempts to subtract two [`Value`]s.
    ///
    /// Subtracting two pointers of the same provenance yields the scalar distance between
    /// them; subtracting a pointer from a scalar makes no sense.
    pub fn subtract(&self, other: &Self) -> Result<Self, Error> {
        match self {
            Self::Scalar(left) => match other {
                Self::Scalar(right) => Ok(Value::Scalar(left - right)),
                Self::Pointer(_) => Err(Error::InvalidPointerArithmetic),
            },
            Self::Pointer(left) => match other {
                Self::Scalar(right) => Ok(left.sub_felt(right)?.into()),
                Self::Pointer(right) => {
                    let dist = left.sub(right)?;
                    Ok(Value::Scalar(Felt::from(dist as u64)))
                }
            },
        }
    }

    /// Attempts to multiply two values.
    ///
    /// Note that only scalars can be multiplied together.
    pub fn multiply(&self, other: &Self) -> Result<Self, Error> {
        match (self, other) {
            (Self::Scalar(left), Self::Scalar(right)) => Ok(Value::Scalar(left * right)),
            _ => Err(Error::InvalidPointerArithmetic),
        }
    }

    /// Attempts to divide two values.
    ///
    /// Note that only scalars can be used to divide other scalars.
    pub fn divide(&self, other: &Self) -> Result<Self, Error> {
        match other {
            Self::Scalar(other) => match other.try_into() {
                Ok(d) => match self {
                    Self::Scalar(n) => Ok(Value::Scalar(n.field_div(&d))),
                    Self::Pointer(_) => Err(Error::InvalidPointerArithmetic),
                },
                Err(_) => Err(Error::DivideByZero),
            },
            Self::Pointer(_) => Err(Error::InvalidPointerArithmetic),
        }
    }

    /// Returns whether this [`Value`] equals zero.
    ///
    /// Pointers are never zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Scalar(value) => value.is_zero(),
            Self::Pointer(_) => false,
        }
    }

    /// Attempts to view the value as a scalar.
    #[inline(always)]
    pub const fn scalar(&self) -> Option<&Felt> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Pointer(_) => None,
        }
    }

    /// Attempts to view the value as a pointer.
    #[inline(always)]
    pub const fn pointer(&self) -> Option<&Pointer> {
        match self {
            Self::Scalar(_) => None,
            Self::Pointer(pointer) => Some(pointer),
        }
    }
}

impl From<Felt> for Value {
    #[inline(always)]
    fn from(value: Felt) -> Self {
        Self::Scalar(value)
    }
}

impl From<Pointer> for Value {
    #[inline(always)]
    fn from(value: Pointer) -> Self {
        Self::Pointer(value)
    }
}

impl PartialEq<Pointer> for Value {
    fn eq(&self, other: &Pointer) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Pointer(pointer) => pointer == other,
        }
    }
}

impl PartialEq<Felt> for Value {
    fn eq(&self, other: &Felt) -> bool {
        match self {
            Self::Scalar(value) => value == other,
            Self::Pointer(_) => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{value}"),
            Self::Pointer(pointer) => write!(f, "{pointer}"),
        }
    }
}
