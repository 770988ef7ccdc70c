//! # Policy Checker
//!
//! Rules are partitioned once per principal type into three lists:
//!
//! ```text
//! ┌────────────────┬──────────────────┬─────────────────┐
//! │                │ conditions       │ filters         │
//! ├────────────────┼──────────────────┼─────────────────┤
//! │ Read / Both    │ read_conditions  │ read_filters    │
//! │ Write / Both   │ write_conditions │ (none)          │
//! └────────────────┴──────────────────┴─────────────────┘
//! ```
//!
//! Filters only shape values handed to readers. A filter declared for
//! writes alone has nothing to act on and is skipped when partitioning.
//!
//! The rules applicable to a given field are memoized per
//! (partition, record type, field). A [`PolicyChecker`] binds the
//! partitions to one principal; read decisions are cached per
//! (operation, record, field, principal) until the request ends.

use crate::policy::Policy;
use crate::rule::{Globals, PolicyRule, RuleEnv, RuleSubject};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{AccessDenied, AccessKind, FieldRef, Record, RecordKey, RecordRef, RecordSet, Value};

/// A rule together with the policy that declared it.
#[derive(Debug, Clone)]
pub struct RuleEntry {
    /// Declaring policy (supplies globals).
    pub policy: Arc<Policy>,
    /// The rule.
    pub rule: Arc<PolicyRule>,
}

/// One of the three rule partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Conditions governing reads.
    ReadConditions,
    /// Conditions governing writes.
    WriteConditions,
    /// Filters applied to read values.
    ReadFilters,
}

impl Partition {
    const fn kind(self) -> AccessKind {
        match self {
            Self::ReadConditions | Self::ReadFilters => AccessKind::Read,
            Self::WriteConditions => AccessKind::Write,
        }
    }

    const fn conditions(kind: AccessKind) -> Self {
        match kind {
            AccessKind::Read => Self::ReadConditions,
            AccessKind::Write => Self::WriteConditions,
        }
    }

}

type FieldMemoKey = (Partition, Arc<str>, FieldRef);

/// Rules of every policy bound to one principal type, partitioned.
#[derive(Debug)]
pub struct RuleSets {
    principal_type: Arc<str>,
    read_conditions: Vec<RuleEntry>,
    write_conditions: Vec<RuleEntry>,
    read_filters: Vec<RuleEntry>,
    memo: RwLock<HashMap<FieldMemoKey, Arc<[RuleEntry]>>>,
}

impl RuleSets {
    /// Partitions the rules of `policies`, preserving declaration order.
    #[must_use]
    pub fn build<'a>(principal_type: &str, policies: impl IntoIterator<Item = &'a Arc<Policy>>) -> Self {
        let mut sets = Self {
            principal_type: Arc::from(principal_type),
            read_conditions: Vec::new(),
            write_conditions: Vec::new(),
            read_filters: Vec::new(),
            memo: RwLock::new(HashMap::new()),
        };

        for policy in policies {
            for rule in policy.rules() {
                let entry = RuleEntry {
                    policy: Arc::clone(policy),
                    rule: Arc::clone(rule),
                };
                if !rule.is_condition() {
                    if rule.operation().covers(AccessKind::Read) {
                        sets.read_filters.push(entry);
                    } else {
                        tracing::debug!(rule = rule.description(), "write-only filter skipped");
                    }
                    continue;
                }
                for kind in [AccessKind::Read, AccessKind::Write] {
                    if rule.operation().covers(kind) {
                        sets.partition_mut(Partition::conditions(kind)).push(entry.clone());
                    }
                }
            }
        }

        tracing::debug!(
            principal = principal_type,
            read_conditions = sets.read_conditions.len(),
            write_conditions = sets.write_conditions.len(),
            read_filters = sets.read_filters.len(),
            "partitioned policy rules"
        );
        sets
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut Vec<RuleEntry> {
        match partition {
            Partition::ReadConditions => &mut self.read_conditions,
            Partition::WriteConditions => &mut self.write_conditions,
            Partition::ReadFilters => &mut self.read_filters,
        }
    }

    /// Every rule of a partition.
    #[must_use]
    pub fn partition(&self, partition: Partition) -> &[RuleEntry] {
        match partition {
            Partition::ReadConditions => &self.read_conditions,
            Partition::WriteConditions => &self.write_conditions,
            Partition::ReadFilters => &self.read_filters,
        }
    }

    /// Principal type these rules bind to.
    #[must_use]
    pub fn principal_type(&self) -> &str {
        &self.principal_type
    }

    /// Rules of `partition` that apply to `field` on a `record_type` record.
    pub fn rules_for(&self, partition: Partition, record_type: &str, field: &FieldRef) -> Arc<[RuleEntry]> {
        let key = (partition, Arc::<str>::from(record_type), field.clone());
        if let Some(hit) = self.memo.read().get(&key) {
            return Arc::clone(hit);
        }

        let kind = partition.kind();
        let rules: Arc<[RuleEntry]> = self
            .partition(partition)
            .iter()
            .filter(|e| e.rule.applies_to(kind, record_type, field))
            .cloned()
            .collect();

        let mut memo = self.memo.write();
        Arc::clone(memo.entry(key).or_insert(rules))
    }

    /// Number of memoized field lookups.
    #[must_use]
    pub fn memo_len(&self) -> usize {
        self.memo.read().len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct DecisionKey {
    op: AccessKind,
    record: RecordKey,
    field: FieldRef,
    principal: RecordKey,
}

/// Read decisions taken during the current request.
#[derive(Debug, Default)]
pub struct DecisionCache {
    decisions: Mutex<HashMap<DecisionKey, Option<AccessDenied>>>,
}

impl DecisionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every decision.
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut *self.decisions.lock()).len();
        if dropped > 0 {
            tracing::trace!(dropped, "cleared policy decisions");
        }
    }

    /// Number of cached decisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decisions.lock().len()
    }

    /// True if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decisions.lock().is_empty()
    }
}

/// The rule partitions of a principal type, bound to one principal.
#[derive(Debug)]
pub struct PolicyChecker {
    principal: RecordRef,
    principal_key: RecordKey,
    sets: Arc<RuleSets>,
    shared_globals: Arc<Globals>,
    decisions: Option<Arc<DecisionCache>>,
}

impl PolicyChecker {
    /// Binds `sets` to `principal`. Without a decision cache every check
    /// evaluates its rules.
    #[must_use]
    pub fn new(
        principal: RecordRef,
        sets: Arc<RuleSets>,
        shared_globals: Arc<Globals>,
        decisions: Option<Arc<DecisionCache>>,
    ) -> Self {
        let principal_key = principal.key();
        Self {
            principal,
            principal_key,
            sets,
            shared_globals,
            decisions,
        }
    }

    /// The bound principal.
    #[must_use]
    pub const fn principal(&self) -> &RecordRef {
        &self.principal
    }

    /// Rule partitions in use.
    #[must_use]
    pub fn rule_sets(&self) -> &RuleSets {
        &self.sets
    }

    /// Authorizes a read of `field` on `record`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied`] naming the first read condition that fails.
    pub fn check_read(&self, record: &dyn Record, field: &FieldRef) -> Result<(), AccessDenied> {
        let Some(cache) = &self.decisions else {
            return self.evaluate_conditions(AccessKind::Read, record, field, None);
        };

        let key = DecisionKey {
            op: AccessKind::Read,
            record: record.key(),
            field: field.clone(),
            principal: self.principal_key.clone(),
        };
        if let Some(decision) = cache.decisions.lock().get(&key) {
            tracing::trace!(record = %key.record, field = %field, "policy decision cache hit");
            return decision.clone().map_or(Ok(()), Err);
        }

        // Rule bodies may read records; the lock is not held while they run.
        let outcome = self.evaluate_conditions(AccessKind::Read, record, field, None);
        cache.decisions.lock().insert(key, outcome.clone().err());
        outcome
    }

    /// Authorizes writing `value` into `field` of `record`. Never cached:
    /// the outcome depends on the candidate value.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied`] naming the first write condition that fails.
    pub fn check_write(&self, record: &dyn Record, field: &FieldRef, value: &Value) -> Result<(), AccessDenied> {
        self.evaluate_conditions(AccessKind::Write, record, field, Some(value))
    }

    /// Filters a collection value read from `field`.
    /// Returns a new collection; `items` is left untouched.
    #[must_use]
    pub fn apply_filters(&self, record: &dyn Record, field: &FieldRef, items: &RecordSet) -> RecordSet {
        let key = record.key();
        let rules = self.sets.rules_for(Partition::ReadFilters, key.type_name(), field);
        if rules.is_empty() {
            return items.clone();
        }

        let mut current = items.clone();
        for entry in rules.iter() {
            let env = RuleEnv::new(&self.principal, entry.policy.globals(), &self.shared_globals);
            current = current.reject(|element| {
                let subject = RuleSubject {
                    record,
                    field,
                    value: Some(element),
                };
                entry.rule.drops(&env, &subject)
            });
        }

        if current.len() != items.len() {
            tracing::trace!(
                field = %field,
                before = items.len(),
                after = current.len(),
                "policy filters applied"
            );
        }
        current
    }

    fn evaluate_conditions(
        &self,
        kind: AccessKind,
        record: &dyn Record,
        field: &FieldRef,
        value: Option<&Value>,
    ) -> Result<(), AccessDenied> {
        let key = record.key();
        let rules = self.sets.rules_for(Partition::conditions(kind), key.type_name(), field);
        let subject = RuleSubject { record, field, value };

        for entry in rules.iter() {
            let env = RuleEnv::new(&self.principal, entry.policy.globals(), &self.shared_globals);
            if entry.rule.denies(&env, &subject) {
                tracing::debug!(
                    op = %kind,
                    record = %key,
                    field = %field,
                    rule = entry.rule.description(),
                    principal = %self.principal_key,
                    "access denied"
                );
                return Err(AccessDenied {
                    op: kind,
                    rule: entry.rule.description().to_owned(),
                    record: key,
                    field: field.full_name(),
                });
            }
        }
        Ok(())
    }
}
