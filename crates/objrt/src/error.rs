use std::fmt;

use smallvec::SmallVec;
use strum::{Display, IntoStaticStr};

use crate::{object::ObjId, resource::ResourceError};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Coarse classification of a [`RunError`].
///
/// Uses strum derives for `Display` and `Into<&'static str>`; the string form
/// matches the variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum ErrorKind {
    /// No operand's type implements the requested capability.
    NotImplemented,
    /// A handler was given an operand type it does not accept.
    TypeMismatch,
    /// Checked arithmetic overflowed the value's representation.
    Overflow,
    /// Division or modulus by zero.
    ZeroDivision,
    /// An operand has the right type but an unusable value.
    InvalidOperand,
    /// The underlying allocator's budget is exhausted, or recursion is too deep.
    Resource,
    /// Refcount or free-list bookkeeping is inconsistent.
    Invariant,
}

/// Refcount / free-list bookkeeping inconsistencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    /// The id does not name any slot in the heap.
    UnknownObject(ObjId),
    /// The slot was already returned to the underlying allocator.
    AlreadyFreed(ObjId),
    /// The slot is linked into a size-class pool.
    Pooled(ObjId),
    /// A release would drive an immortal (cached) object's refcount to zero.
    ImmortalReleased { id: ObjId, type_name: &'static str },
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownObject(id) => write!(f, "no object at {id}"),
            Self::AlreadyFreed(id) => write!(f, "object {id} already freed"),
            Self::Pooled(id) => write!(f, "object {id} is a pooled free-list node"),
            Self::ImmortalReleased { id, type_name } => {
                write!(f, "immortal {type_name} object {id} released past its last reference")
            }
        }
    }
}

/// Error produced by dispatch, constructors and the checked heap API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Neither operand type implements `op`.
    NotImplemented {
        op: &'static str,
        operand_types: SmallVec<[&'static str; 3]>,
    },
    /// A capability handler received an operand of the wrong type.
    TypeMismatch {
        op: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    /// Checked arithmetic overflowed.
    Overflow { op: &'static str },
    /// Division or modulus by zero.
    ZeroDivision { op: &'static str },
    /// An operand has the right type but a value the operation can't accept,
    /// such as an out-of-range index or a negative exponent.
    InvalidOperand { op: &'static str, reason: &'static str },
    /// The underlying allocator refused a block, or recursion went too deep.
    Resource(ResourceError),
    /// Bookkeeping inconsistency detected by the checked heap API.
    Invariant(InvariantError),
}

impl RunError {
    /// Builds the error for an operator that no operand type supports.
    #[must_use]
    pub fn not_implemented(op: &'static str, operand_types: &[&'static str]) -> Self {
        Self::NotImplemented {
            op,
            operand_types: operand_types.iter().copied().collect(),
        }
    }

    /// Returns the coarse classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::Overflow { .. } => ErrorKind::Overflow,
            Self::ZeroDivision { .. } => ErrorKind::ZeroDivision,
            Self::InvalidOperand { .. } => ErrorKind::InvalidOperand,
            Self::Resource(_) => ErrorKind::Resource,
            Self::Invariant(_) => ErrorKind::Invariant,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotImplemented { op, operand_types } => {
                write!(
                    f,
                    "unsupported operand type(s) for {op}: {}",
                    operand_types
                        .iter()
                        .map(|name| format!("'{name}'"))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            Self::TypeMismatch { op, expected, found } => {
                write!(f, "{op} expected '{expected}' operand, got '{found}'")
            }
            Self::Overflow { op } => write!(f, "integer overflow in {op}"),
            Self::ZeroDivision { op } => write!(f, "division by zero in {op}"),
            Self::InvalidOperand { op, reason } => write!(f, "{op}: {reason}"),
            Self::Resource(err) => write!(f, "{err}"),
            Self::Invariant(err) => write!(f, "invariant violation: {err}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        Self::Resource(err)
    }
}

impl From<InvariantError> for RunError {
    fn from(err: InvariantError) -> Self {
        Self::Invariant(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_implemented_message_lists_operand_types() {
        let err = RunError::not_implemented("+", &["NoneType", "tuple"]);
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
        assert_eq!(err.to_string(), "unsupported operand type(s) for +: 'NoneType', 'tuple'");
    }

    #[test]
    fn resource_errors_convert_and_keep_source() {
        let err: RunError = ResourceError::Allocation { limit: 1, count: 2 }.into();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(std::error::Error::source(&err).is_some());
        let kind: &'static str = err.kind().into();
        assert_eq!(kind, "Resource");
    }
}
