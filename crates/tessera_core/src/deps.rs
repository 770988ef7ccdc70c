//! # Dependency Tracking
//!
//! A [`DependencySet`] remembers what one render fragment observed while it
//! was being computed:
//!
//! ```text
//! DependencySet
//! ├── objects:  Room#1 → [(name, "g708")]
//! │             User#4 → [(status, "busy"), (name, "bob")]
//! └── queries:  [User.find_by("status", "busy") = [User#4]]
//! ```
//!
//! Staleness is decided by comparing what was observed against what the
//! data says now. A set never mutates outside a render pass; afterwards it
//! is only read by staleness checks.

use crate::access::FieldInterceptor;
use crate::error::AccessResult;
use crate::hub::Topic;
use crate::record::{QueryExecutor, QueryTarget, Record, RecordKey, Value};
use crate::schema::FieldRef;
use std::sync::Arc;

/// One observed `(field, value)` pair.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldAccess {
    /// Field name.
    pub field: Arc<str>,
    /// Value seen at access time.
    pub value: Value,
}

/// Accesses to a single object, deduplicated by `(field, value)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectAccesses {
    /// Object identity.
    pub key: RecordKey,
    /// Ordered accesses.
    pub fields: Vec<FieldAccess>,
}

/// A query observed during rendering, with its result at the time.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    /// Type or record the query ran against.
    pub target: QueryTarget,
    /// Operation name.
    pub op: String,
    /// Arguments.
    pub args: Vec<Value>,
    /// Result snapshot.
    pub result: Value,
}

impl Query {
    /// Creates a query record.
    #[must_use]
    pub fn new(target: QueryTarget, op: impl Into<String>, args: Vec<Value>, result: Value) -> Self {
        Self {
            target,
            op: op.into(),
            args,
            result,
        }
    }
}

/// A recorded query whose re-execution disagrees with its snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryChange {
    /// Index into [`DependencySet::queries`].
    pub index: usize,
    /// Fresh result.
    pub new_result: Value,
}

/// Per-node record of observed field accesses and queries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DependencySet {
    objects: Vec<ObjectAccesses>,
    queries: Vec<Query>,
}

impl DependencySet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            objects: Vec::new(),
            queries: Vec::new(),
        }
    }

    /// True when nothing was observed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.queries.is_empty()
    }

    /// Records that `field` of `key` was observed holding `value`.
    ///
    /// Idempotent per `(object, field, value)`. Returns true when this is the
    /// first access to the object, i.e. when a listener should be registered.
    pub fn record_field_access(&mut self, key: &RecordKey, field: &str, value: Value) -> bool {
        if let Some(entry) = self.objects.iter_mut().find(|o| o.key == *key) {
            let seen = entry
                .fields
                .iter()
                .any(|a| &*a.field == field && a.value == value);
            if !seen {
                entry.fields.push(FieldAccess {
                    field: Arc::from(field),
                    value,
                });
            }
            return false;
        }
        self.objects.push(ObjectAccesses {
            key: key.clone(),
            fields: vec![FieldAccess {
                field: Arc::from(field),
                value,
            }],
        });
        true
    }

    /// Appends a query. Queries are never deduplicated.
    pub fn record_query(&mut self, query: Query) {
        self.queries.push(query);
    }

    /// Folds `other` into this set, keeping the deduplication rules.
    pub fn merge(&mut self, other: &Self) {
        for obj in &other.objects {
            for access in &obj.fields {
                self.record_field_access(&obj.key, &access.field, access.value.clone());
            }
        }
        self.queries.extend(other.queries.iter().cloned());
    }

    /// Observed objects in first-access order.
    #[must_use]
    pub fn objects(&self) -> &[ObjectAccesses] {
        &self.objects
    }

    /// Observed queries in execution order.
    #[must_use]
    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    /// Accesses recorded for `key`, empty if none.
    #[must_use]
    pub fn accesses_for(&self, key: &RecordKey) -> &[FieldAccess] {
        self.objects
            .iter()
            .find(|o| o.key == *key)
            .map(|o| o.fields.as_slice())
            .unwrap_or(&[])
    }

    /// True if any field of `key` was observed.
    #[must_use]
    pub fn depends_on(&self, key: &RecordKey) -> bool {
        self.objects.iter().any(|o| o.key == *key)
    }

    /// True iff the object was observed and some recorded value for `field`
    /// differs from `new_value`.
    #[must_use]
    pub fn field_changed(&self, key: &RecordKey, field: &str, new_value: &Value) -> bool {
        self.accesses_for(key)
            .iter()
            .any(|a| &*a.field == field && a.value != *new_value)
    }

    /// True iff `record` was observed and any recorded field now reads
    /// differently.
    #[must_use]
    pub fn affected_by_field_change(&self, record: &dyn Record) -> bool {
        let key = record.key();
        self.accesses_for(&key)
            .iter()
            .any(|a| self.field_changed(&key, &a.field, &record.read_field(&a.field)))
    }

    /// Re-executes every recorded query; returns those whose canonical result
    /// changed. Queries that now fail count as changed with a null result.
    #[must_use]
    pub fn affected_by_query_change(&self, executor: &dyn QueryExecutor) -> Vec<QueryChange> {
        self.queries
            .iter()
            .enumerate()
            .filter_map(|(index, q)| {
                let fresh = match executor.execute(&q.target, &q.op, &q.args) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::debug!("Query {}.{} failed on re-execution: {}", q.target, q.op, e);
                        Value::Null
                    }
                };
                (fresh.canonical() != q.result.canonical()).then_some(QueryChange {
                    index,
                    new_result: fresh,
                })
            })
            .collect()
    }

    /// Notification topics this set listens on: each observed object, and the
    /// type of each query target.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .objects
            .iter()
            .map(|o| Topic::Record(o.key.clone()))
            .collect();
        for q in &self.queries {
            let topic = Topic::Type(Arc::from(q.target.type_name()));
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        topics
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.queries.clear();
    }
}

/// Records reads and writes as field accesses.
impl FieldInterceptor for DependencySet {
    fn after_read(&mut self, record: &dyn Record, field: &FieldRef, value: Value) -> AccessResult<Value> {
        self.record_field_access(&record.key(), field.name(), value.clone());
        Ok(value)
    }

    fn after_write(&mut self, record: &dyn Record, field: &FieldRef, value: &Value) -> AccessResult<()> {
        self.record_field_access(&record.key(), field.name(), value.clone());
        Ok(())
    }
}
