//! # Core Error Types
//!
//! Record access failures and policy denials. The policy checker lives in
//! another crate, but its denial travels through the field interceptor
//! interface defined here, so the error type is defined here too.

use crate::record::RecordKey;
use std::fmt;
use thiserror::Error;

/// Errors raised by the record contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// No record with this key exists.
    #[error("record not found: {0}")]
    NotFound(RecordKey),

    /// The field cannot be written.
    #[error("field `{field}` of {record} is read-only")]
    ReadOnlyField {
        /// Record that was written.
        record: RecordKey,
        /// Field name.
        field: String,
    },

    /// The query target does not support the operation.
    #[error("query `{op}` not supported on {target}")]
    UnsupportedQuery {
        /// Target description.
        target: String,
        /// Operation name.
        op: String,
    },

    /// Query arguments did not match what the operation expects.
    #[error("bad arguments for query `{op}`: {reason}")]
    BadQueryArgs {
        /// Operation name.
        op: String,
        /// What was wrong.
        reason: String,
    },
}

/// Kind of field access being authorized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// Field read.
    Read,
    /// Field write.
    Write,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// A policy rule forbade a field access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{op} access to field `{field}` of {record} denied by rule: {rule}")]
pub struct AccessDenied {
    /// Attempted operation.
    pub op: AccessKind,
    /// Description of the rule that failed.
    pub rule: String,
    /// Record being accessed.
    pub record: RecordKey,
    /// Full field name (`Type.field`).
    pub field: String,
}

/// Failure of an intercepted field access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Policy violation.
    #[error(transparent)]
    Denied(#[from] AccessDenied),

    /// Underlying record failure.
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Convenience result for record operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Convenience result for intercepted accesses.
pub type AccessResult<T> = Result<T, AccessError>;
