//! Error types for tables and recording views

use crate::value::ValueKind;

/// Errors raised while shaping or reading tabular values
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    /// A required column is absent from the table
    #[error("missing required column: '{0}'")]
    MissingColumn(String),

    /// A cell holds a value of the wrong shape
    #[error("invalid value in column '{column}': {reason}")]
    InvalidField {
        /// Column holding the offending cell
        column: String,
        /// Human readable cause
        reason: String,
    },

    /// A value was not of the expected kind
    #[error("expected {expected} value, found {found}")]
    UnexpectedKind {
        /// Kind the caller asked for
        expected: ValueKind,
        /// Kind actually held
        found: ValueKind,
    },

    /// Partition count below one
    #[error("partition count must be at least 1, got {0}")]
    InvalidPartitionCount(usize),

    /// Row index past the end of the table
    #[error("row index {index} out of bounds for table of {len} rows")]
    RowOutOfBounds {
        /// Requested index
        index: usize,
        /// Table length
        len: usize,
    },
}

impl TableError {
    /// Create invalid field error for column
    pub fn invalid_field(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            column: column.into(),
            reason: reason.into(),
        }
    }
}
