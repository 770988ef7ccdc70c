//! # Policy Context
//!
//! Owns every policy cache of the process: rule partitions per principal
//! type, bound checkers per principal and the per-request decision cache.
//! Components receive the context explicitly; there is no global state.

use crate::checker::{DecisionCache, PolicyChecker, RuleSets};
use crate::registry::PolicyRegistry;
use crate::rule::Globals;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{RecordKey, RecordRef};

/// Policy checking configuration.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Clear cached read decisions at every [`PolicyContext::begin_request`].
    pub invalidate_decisions_between_requests: bool,
    /// Evaluate every check instead of caching read decisions.
    pub no_decision_cache: bool,
    /// Values visible to every rule; policy globals shadow them.
    pub globals: Globals,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            invalidate_decisions_between_requests: true,
            no_decision_cache: false,
            globals: Globals::new(),
        }
    }
}

/// Process-wide policy state with explicit reset operations.
#[derive(Debug)]
pub struct PolicyContext {
    registry: PolicyRegistry,
    config: PolicyConfig,
    shared_globals: Arc<Globals>,
    rule_sets: RwLock<HashMap<Arc<str>, Arc<RuleSets>>>,
    checkers: RwLock<HashMap<RecordKey, Arc<PolicyChecker>>>,
    decisions: Arc<DecisionCache>,
}

impl PolicyContext {
    /// Creates a context over `registry`.
    #[must_use]
    pub fn new(registry: PolicyRegistry, config: PolicyConfig) -> Self {
        let shared_globals = Arc::new(config.globals.clone());
        Self {
            registry,
            config,
            shared_globals,
            rule_sets: RwLock::new(HashMap::new()),
            checkers: RwLock::new(HashMap::new()),
            decisions: Arc::new(DecisionCache::new()),
        }
    }

    /// Declared policies.
    #[must_use]
    pub const fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Rule partitions for `principal_type`, computed on first use.
    pub fn rule_sets(&self, principal_type: &str) -> Arc<RuleSets> {
        if let Some(sets) = self.rule_sets.read().get(principal_type) {
            return Arc::clone(sets);
        }

        let sets = Arc::new(RuleSets::build(
            principal_type,
            self.registry.for_principal_type(principal_type),
        ));
        let mut all = self.rule_sets.write();
        Arc::clone(all.entry(Arc::from(principal_type)).or_insert(sets))
    }

    /// The policies of `principal`'s type bound to `principal`. One checker
    /// is kept per principal.
    pub fn checker_for(&self, principal: &RecordRef) -> Arc<PolicyChecker> {
        let key = principal.key();
        if let Some(checker) = self.checkers.read().get(&key) {
            return Arc::clone(checker);
        }

        let decisions = (!self.config.no_decision_cache).then(|| Arc::clone(&self.decisions));
        let checker = Arc::new(PolicyChecker::new(
            Arc::clone(principal),
            self.rule_sets(key.type_name()),
            Arc::clone(&self.shared_globals),
            decisions,
        ));
        tracing::debug!(principal = %key, "bound policies to principal");

        let mut checkers = self.checkers.write();
        Arc::clone(checkers.entry(key).or_insert(checker))
    }

    /// Marks the start of an independent request.
    pub fn begin_request(&self) {
        if self.config.invalidate_decisions_between_requests {
            self.decisions.clear();
        }
    }

    /// Forgets cached read decisions.
    pub fn clear_decisions(&self) {
        self.decisions.clear();
    }

    /// Drops a principal's bound checker, e.g. when its client disconnects.
    pub fn forget_principal(&self, principal: &RecordKey) -> bool {
        self.checkers.write().remove(principal).is_some()
    }

    /// Resets every cache.
    pub fn clear_all(&self) {
        self.rule_sets.write().clear();
        self.checkers.write().clear();
        self.decisions.clear();
        tracing::debug!("policy caches cleared");
    }

    /// Number of cached read decisions.
    #[must_use]
    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }

    /// Number of bound checkers.
    #[must_use]
    pub fn checker_count(&self) -> usize {
        self.checkers.read().len()
    }
}
