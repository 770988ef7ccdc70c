//! # Record Contract
//!
//! The persistence layer is an external collaborator. Everything Tessera
//! needs from it is captured here:
//!
//! - [`Record`]: field read/write plus a stable identity key
//! - [`QueryExecutor`]: re-runnable queries
//! - lifecycle notifications, delivered through [`crate::ChangeHub`]
//!
//! [`memory`] carries an in-memory implementation used by tests and demos.

pub mod memory;
mod set;
mod value;

pub use set::RecordSet;
pub use value::Value;

use crate::error::RecordError;
use std::fmt;
use std::sync::Arc;

/// Stable identity of a record, usable as a map key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    type_name: Arc<str>,
    id: u64,
}

impl RecordKey {
    /// Creates a key for record `id` of type `type_name`.
    #[must_use]
    pub fn new(type_name: impl Into<Arc<str>>, id: u64) -> Self {
        Self {
            type_name: type_name.into(),
            id,
        }
    }

    /// The record's type name.
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Shared handle to the type name.
    #[inline]
    #[must_use]
    pub fn type_name_arc(&self) -> Arc<str> {
        Arc::clone(&self.type_name)
    }

    /// The record's id within its type.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}

/// A persisted object exposing field access.
///
/// Implementations use interior mutability: records are shared between
/// render trees, sessions and the store.
pub trait Record: Send + Sync + fmt::Debug {
    /// Stable identity.
    fn key(&self) -> RecordKey;

    /// Reads the current value of `field`; unknown fields read as null.
    fn read_field(&self, field: &str) -> Value;

    /// Writes `value` into `field` without persisting it.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the field cannot be written.
    fn write_field(&self, field: &str, value: Value) -> Result<(), RecordError>;
}

/// Shared handle to a record.
pub type RecordRef = Arc<dyn Record>;

/// What a query runs against.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryTarget {
    /// Class-level query, e.g. `User.all`.
    Type(Arc<str>),
    /// Instance-level query, e.g. `room.messages`.
    Record(RecordKey),
}

impl QueryTarget {
    /// The type name the query concerns.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Type(t) => t,
            Self::Record(key) => key.type_name(),
        }
    }
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(t) => f.write_str(t),
            Self::Record(key) => write!(f, "{key}"),
        }
    }
}

/// Query execution hook of the persistence layer.
pub trait QueryExecutor: Send + Sync {
    /// Executes `op` with `args` against `target`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] for unknown targets or operations.
    fn execute(&self, target: &QueryTarget, op: &str, args: &[Value]) -> Result<Value, RecordError>;
}
