//! # Field Interception
//!
//! Every tracked field access runs through a chain of interceptors wrapped
//! around the raw record call:
//!
//! ```text
//!   before_read[0] → before_read[1] → record.read_field → after_read[1] → after_read[0]
//!                                      (or replace_read)
//! ```
//!
//! Outer links see the value last. The renderer puts the policy guard
//! outside the dependency recorder, so a read is authorized first, recorded
//! with the value the template will see, and only then filtered. A link
//! may stand in for the raw read with `replace_read`; the record is then
//! not read at all.

use crate::error::AccessResult;
use crate::record::{Record, Value};
use crate::schema::FieldRef;

/// Hooks around field reads and writes.
///
/// All hooks default to pass-through.
pub trait FieldInterceptor {
    /// Called before the raw read. An error aborts the read.
    ///
    /// # Errors
    ///
    /// Returns an [`crate::AccessError`] to veto the read.
    fn before_read(&mut self, record: &dyn Record, field: &FieldRef) -> AccessResult<()> {
        let _ = (record, field);
        Ok(())
    }

    /// Supplies a value in place of the raw read. The first link returning
    /// `Some` wins.
    fn replace_read(&mut self, record: &dyn Record, field: &FieldRef) -> Option<Value> {
        let _ = (record, field);
        None
    }

    /// Called with the value produced by the inner links; returns the value
    /// handed to the outer links.
    ///
    /// # Errors
    ///
    /// Returns an [`crate::AccessError`] to veto the read.
    fn after_read(&mut self, record: &dyn Record, field: &FieldRef, value: Value) -> AccessResult<Value> {
        let _ = (record, field);
        Ok(value)
    }

    /// Called before the raw write. An error aborts the write.
    ///
    /// # Errors
    ///
    /// Returns an [`crate::AccessError`] to veto the write.
    fn before_write(&mut self, record: &dyn Record, field: &FieldRef, value: &Value) -> AccessResult<()> {
        let _ = (record, field, value);
        Ok(())
    }

    /// Called after a successful raw write.
    ///
    /// # Errors
    ///
    /// Returns an [`crate::AccessError`] if post-processing fails.
    fn after_write(&mut self, record: &dyn Record, field: &FieldRef, value: &Value) -> AccessResult<()> {
        let _ = (record, field, value);
        Ok(())
    }
}

/// Reads `field` of `record` through `chain` (outermost first).
///
/// # Errors
///
/// Propagates the first interceptor failure.
pub fn read_through(
    chain: &mut [&mut dyn FieldInterceptor],
    record: &dyn Record,
    field: &FieldRef,
) -> AccessResult<Value> {
    for link in chain.iter_mut() {
        link.before_read(record, field)?;
    }
    let replaced = chain.iter_mut().find_map(|link| link.replace_read(record, field));
    let mut value = match replaced {
        Some(value) => value,
        None => record.read_field(field.name()),
    };
    for link in chain.iter_mut().rev() {
        value = link.after_read(record, field, value)?;
    }
    Ok(value)
}

/// Writes `value` into `field` of `record` through `chain` (outermost first).
///
/// # Errors
///
/// Propagates the first interceptor failure or the record's own write error.
pub fn write_through(
    chain: &mut [&mut dyn FieldInterceptor],
    record: &dyn Record,
    field: &FieldRef,
    value: Value,
) -> AccessResult<()> {
    for link in chain.iter_mut() {
        link.before_write(record, field, &value)?;
    }
    record.write_field(field.name(), value.clone())?;
    for link in chain.iter_mut().rev() {
        link.after_write(record, field, &value)?;
    }
    Ok(())
}
