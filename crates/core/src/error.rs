//! Error types for Tabula tables.

use crate::capability::Operation;
use alloc::borrow::Cow;
use alloc::string::String;
use thiserror::Error;

/// Result type alias for Tabula operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Why a request for memory could not be satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum OutOfMemory {
    /// The allocator returned no memory.
    #[error("allocation of {bytes} bytes (alignment {alignment}) failed")]
    Allocation { bytes: usize, alignment: usize },
    /// The requested row count cannot be represented in one allocation.
    #[error("{requested} rows exceeds the maximum capacity of {max}")]
    CapacityExceeded { requested: usize, max: usize },
}

/// Failure raised by a fallible column constructor or assignment.
///
/// User types return this from [`TryClone`](crate::TryClone),
/// [`TryDefault`](crate::TryDefault) and [`AssignFrom`](crate::AssignFrom).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConstructionError {
    message: Cow<'static, str>,
}

impl ConstructionError {
    /// Creates a construction error with the given message.
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error types for table operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Memory could not be obtained for the requested capacity.
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] OutOfMemory),
    /// A column constructor failed; the partially built row was rolled back.
    #[error("construction of column {column} failed: {source}")]
    Construction {
        column: usize,
        #[source]
        source: ConstructionError,
    },
    /// Row index past the end of the table.
    #[error("row index {index} out of range for table of {len} rows")]
    OutOfRange { index: usize, len: usize },
    /// A column lacks the capability an operation needs.
    #[error("column {column} ({type_name}) does not support {operation}")]
    Unsupported {
        operation: Operation,
        column: usize,
        type_name: &'static str,
    },
    /// Invalid schema definition.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
    /// A column was accessed as a type it does not store.
    #[error("column {column} stores {found}, not {expected}")]
    TypeMismatch {
        column: usize,
        expected: &'static str,
        found: &'static str,
    },
}

impl Error {
    /// Creates an allocation failure error.
    pub fn allocation_failed(bytes: usize, alignment: usize) -> Self {
        Error::OutOfMemory(OutOfMemory::Allocation { bytes, alignment })
    }

    /// Creates a capacity overflow error.
    pub fn capacity_exceeded(requested: usize, max: usize) -> Self {
        Error::OutOfMemory(OutOfMemory::CapacityExceeded { requested, max })
    }

    /// Creates a construction failure for the given column.
    pub fn construction(column: usize, source: ConstructionError) -> Self {
        Error::Construction { column, source }
    }

    /// Creates an out of range error.
    pub fn out_of_range(index: usize, len: usize) -> Self {
        Error::OutOfRange { index, len }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(operation: Operation, column: usize, type_name: &'static str) -> Self {
        Error::Unsupported {
            operation,
            column,
            type_name,
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(column: usize, expected: &'static str, found: &'static str) -> Self {
        Error::TypeMismatch {
            column,
            expected,
            found,
        }
    }

    /// Returns true for both flavors of [`OutOfMemory`].
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Error::OutOfMemory(_))
    }
}
