//! In-memory records and store.
//!
//! Stands in for the persistence layer in tests, benches and the demo.
//! `save`/`destroy` publish lifecycle notifications to an attached
//! [`ChangeHub`].

use super::{QueryExecutor, QueryTarget, Record, RecordKey, RecordRef, Value};
use crate::error::RecordError;
use crate::hub::{ChangeHub, ChangeKind, RecordChange};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A record whose fields live in a map.
#[derive(Debug)]
pub struct MemRecord {
    key: RecordKey,
    fields: RwLock<HashMap<String, Value>>,
}

impl MemRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new(type_name: &str, id: u64) -> Self {
        Self {
            key: RecordKey::new(type_name, id),
            fields: RwLock::new(HashMap::new()),
        }
    }

    /// Builder-style field initialization.
    #[must_use]
    pub fn with(self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.write().insert(field.to_owned(), value.into());
        self
    }

    /// Sets a field directly.
    pub fn set(&self, field: &str, value: impl Into<Value>) {
        self.fields.write().insert(field.to_owned(), value.into());
    }

    /// Wraps into a shared handle.
    #[must_use]
    pub fn shared(self) -> RecordRef {
        Arc::new(self)
    }
}

impl Record for MemRecord {
    fn key(&self) -> RecordKey {
        self.key.clone()
    }

    fn read_field(&self, field: &str) -> Value {
        self.fields.read().get(field).cloned().unwrap_or_default()
    }

    fn write_field(&self, field: &str, value: Value) -> Result<(), RecordError> {
        if field == "id" {
            return Err(RecordError::ReadOnlyField {
                record: self.key.clone(),
                field: field.to_owned(),
            });
        }
        self.fields.write().insert(field.to_owned(), value);
        Ok(())
    }
}

/// Records by type and id.
///
/// Supported queries on a type target:
/// - `all` - every record of the type, in id order
/// - `count` - number of records
/// - `find_by(field, value)` - records whose field equals value
#[derive(Debug, Default)]
pub struct MemStore {
    records: RwLock<BTreeMap<Arc<str>, BTreeMap<u64, Arc<MemRecord>>>>,
    next_id: AtomicU64,
    hub: Option<Arc<ChangeHub>>,
}

impl MemStore {
    /// Creates a store without notifications.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that reports lifecycle events to `hub`.
    #[must_use]
    pub fn with_hub(hub: Arc<ChangeHub>) -> Self {
        Self {
            hub: Some(hub),
            ..Self::default()
        }
    }

    /// Creates and stores a record with the given fields.
    pub fn create<I, K, V>(&self, type_name: &str, fields: I) -> Arc<MemRecord>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = MemRecord::new(type_name, id);
        for (k, v) in fields {
            record.set(k.as_ref(), v);
        }
        let record = Arc::new(record);
        self.records
            .write()
            .entry(Arc::from(type_name))
            .or_default()
            .insert(id, Arc::clone(&record));
        record
    }

    /// Looks a record up by key.
    #[must_use]
    pub fn find(&self, key: &RecordKey) -> Option<Arc<MemRecord>> {
        self.records
            .read()
            .get(key.type_name())
            .and_then(|by_id| by_id.get(&key.id()))
            .cloned()
    }

    /// Persists `record` and notifies subscribers.
    pub fn save(&self, record: &Arc<MemRecord>) {
        let key = record.key();
        self.records
            .write()
            .entry(key.type_name_arc())
            .or_default()
            .insert(key.id(), Arc::clone(record));
        self.notify(record, ChangeKind::Saved);
    }

    /// Removes `record` and notifies subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if it was never stored.
    pub fn destroy(&self, record: &Arc<MemRecord>) -> Result<(), RecordError> {
        let key = record.key();
        let removed = self
            .records
            .write()
            .get_mut(key.type_name())
            .and_then(|by_id| by_id.remove(&key.id()));
        if removed.is_none() {
            return Err(RecordError::NotFound(key));
        }
        self.notify(record, ChangeKind::Destroyed);
        Ok(())
    }

    /// Every record of a type in id order.
    #[must_use]
    pub fn all(&self, type_name: &str) -> Vec<Arc<MemRecord>> {
        self.records
            .read()
            .get(type_name)
            .map(|by_id| by_id.values().cloned().collect())
            .unwrap_or_default()
    }

    fn notify(&self, record: &Arc<MemRecord>, kind: ChangeKind) {
        if let Some(hub) = &self.hub {
            let shared: RecordRef = Arc::clone(record) as RecordRef;
            hub.notify(&RecordChange::new(shared, kind));
        }
    }

    fn as_values(records: Vec<Arc<MemRecord>>) -> Value {
        Value::List(
            records
                .into_iter()
                .map(|r| Value::Record(r as RecordRef))
                .collect(),
        )
    }
}

impl QueryExecutor for MemStore {
    fn execute(&self, target: &QueryTarget, op: &str, args: &[Value]) -> Result<Value, RecordError> {
        let QueryTarget::Type(type_name) = target else {
            return Err(RecordError::UnsupportedQuery {
                target: target.to_string(),
                op: op.to_owned(),
            });
        };
        match op {
            "all" => Ok(Self::as_values(self.all(type_name))),
            "count" => {
                let n = self.all(type_name).len();
                Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
            }
            "find_by" => {
                let [field, wanted] = args else {
                    return Err(RecordError::BadQueryArgs {
                        op: op.to_owned(),
                        reason: format!("expected 2 arguments, got {}", args.len()),
                    });
                };
                let Some(field) = field.as_str() else {
                    return Err(RecordError::BadQueryArgs {
                        op: op.to_owned(),
                        reason: "field name must be a string".to_owned(),
                    });
                };
                let hits = self
                    .all(type_name)
                    .into_iter()
                    .filter(|r| r.read_field(field) == *wanted)
                    .collect();
                Ok(Self::as_values(hits))
            }
            _ => Err(RecordError::UnsupportedQuery {
                target: target.to_string(),
                op: op.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_find() {
        let store = MemStore::new();
        let room = store.create("Room", [("name", "g708")]);
        let found = store.find(&room.key()).unwrap();
        assert_eq!(found.read_field("name"), Value::from("g708"));
        assert_eq!(found.read_field("missing"), Value::Null);
    }

    #[test]
    fn test_id_is_read_only() {
        let rec = MemRecord::new("User", 1);
        assert!(rec.write_field("id", Value::from(2_i64)).is_err());
    }

    #[test]
    fn test_queries() {
        let store = MemStore::new();
        store.create("User", [("status", "busy")]);
        store.create("User", [("status", "active")]);
        let ty = QueryTarget::Type(Arc::from("User"));
        assert_eq!(store.execute(&ty, "count", &[]).unwrap(), Value::Int(2));
        let busy = store
            .execute(&ty, "find_by", &["status".into(), "busy".into()])
            .unwrap();
        assert_eq!(busy.as_list().map(<[Value]>::len), Some(1));
        assert!(store.execute(&ty, "explode", &[]).is_err());
    }

    #[test]
    fn test_destroy_unknown_fails() {
        let store = MemStore::new();
        let stray = Arc::new(MemRecord::new("User", 42));
        assert!(matches!(store.destroy(&stray), Err(RecordError::NotFound(_))));
    }
}
