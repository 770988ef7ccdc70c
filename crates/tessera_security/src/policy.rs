//! # Policy Declarations
//!
//! Policies are declared once, statically, with a fluent surface:
//!
//! ```rust,ignore
//! let policy = Policy::new("HideUserPrivateData", "Client")
//!     .restrict(FieldSelector::field("User", "pswd"))
//!     .unless(|env, s| is_me(env, s.record))
//!     .restrict(FieldSelector::field("ChatRoom", "members"))
//!     .reject(|env, s| is_busy_stranger(env, s.value))
//!     .allow_write(FieldSelector::all_of("User"))
//!     .when(|env, s| is_me(env, s.record));
//! ```
//!
//! `restrict` rules deny when they match. `allow_*` rules are negated:
//! access is permitted only when they match.

use crate::rule::{
    predicate, ConditionKind, FieldSelector, FilterKind, Globals, Operation, PolicyRule, RuleCheck, RuleEnv,
    RuleSubject,
};
use std::sync::Arc;
use tessera_core::Value;

/// A named set of rules bound to one principal type.
#[derive(Debug, Clone)]
pub struct Policy {
    name: String,
    principal_type: Arc<str>,
    globals: Globals,
    rules: Vec<Arc<PolicyRule>>,
}

impl Policy {
    /// Starts a policy for principals of `principal_type`.
    #[must_use]
    pub fn new(name: impl Into<String>, principal_type: &str) -> Self {
        Self {
            name: name.into(),
            principal_type: Arc::from(principal_type),
            globals: Globals::new(),
            rules: Vec::new(),
        }
    }

    /// Binds a global value visible to every rule of this policy.
    #[must_use]
    pub fn global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    /// Adds a prebuilt rule.
    #[must_use]
    pub fn rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Starts a restriction on reads and writes of `selector`.
    #[must_use]
    pub fn restrict(self, selector: FieldSelector) -> RuleBuilder {
        RuleBuilder::new(self, selector, Operation::Both, false, "restrict")
    }

    /// Starts an allowance: reads of `selector` are allowed only when the
    /// check passes.
    #[must_use]
    pub fn allow_read(self, selector: FieldSelector) -> RuleBuilder {
        RuleBuilder::new(self, selector, Operation::Read, true, "read")
    }

    /// Starts an allowance for writes.
    #[must_use]
    pub fn allow_write(self, selector: FieldSelector) -> RuleBuilder {
        RuleBuilder::new(self, selector, Operation::Write, true, "write")
    }

    /// Starts an allowance for reads and writes.
    #[must_use]
    pub fn allow_rw(self, selector: FieldSelector) -> RuleBuilder {
        RuleBuilder::new(self, selector, Operation::Both, true, "rw")
    }

    /// Policy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Principal type this policy binds to.
    #[must_use]
    pub fn principal_type(&self) -> &str {
        &self.principal_type
    }

    /// Policy globals.
    #[must_use]
    pub const fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[Arc<PolicyRule>] {
        &self.rules
    }
}

/// A rule under construction; finished by one of the check methods, which
/// hands the policy back.
#[must_use = "a rule is only added once a check method is called"]
pub struct RuleBuilder {
    policy: Policy,
    selector: FieldSelector,
    operation: Operation,
    negated: bool,
    verb: &'static str,
    description: Option<String>,
}

impl RuleBuilder {
    fn new(policy: Policy, selector: FieldSelector, operation: Operation, negated: bool, verb: &'static str) -> Self {
        Self {
            policy,
            selector,
            operation,
            negated,
            verb,
            description: None,
        }
    }

    /// Narrows the rule to reads.
    pub fn reads(mut self) -> Self {
        self.operation = Operation::Read;
        self
    }

    /// Narrows the rule to writes.
    pub fn writes(mut self) -> Self {
        self.operation = Operation::Write;
        self
    }

    /// Sets the description shown in denial messages.
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Condition: deny (or, for allowances, permit) when `pred` holds.
    #[must_use]
    pub fn when<F>(self, pred: F) -> Policy
    where
        F: Fn(&RuleEnv<'_>, &RuleSubject<'_>) -> bool + Send + Sync + 'static,
    {
        self.finish(RuleCheck::Condition(ConditionKind::When), pred)
    }

    /// Condition: deny (or permit) unless `pred` holds.
    #[must_use]
    pub fn unless<F>(self, pred: F) -> Policy
    where
        F: Fn(&RuleEnv<'_>, &RuleSubject<'_>) -> bool + Send + Sync + 'static,
    {
        self.finish(RuleCheck::Condition(ConditionKind::Unless), pred)
    }

    /// Filter: keep elements satisfying `pred`.
    #[must_use]
    pub fn select<F>(self, pred: F) -> Policy
    where
        F: Fn(&RuleEnv<'_>, &RuleSubject<'_>) -> bool + Send + Sync + 'static,
    {
        self.finish(RuleCheck::Filter(FilterKind::Select), pred)
    }

    /// Filter: drop elements satisfying `pred`.
    #[must_use]
    pub fn reject<F>(self, pred: F) -> Policy
    where
        F: Fn(&RuleEnv<'_>, &RuleSubject<'_>) -> bool + Send + Sync + 'static,
    {
        self.finish(RuleCheck::Filter(FilterKind::Reject), pred)
    }

    /// Filter: same as [`Self::select`].
    #[must_use]
    pub fn include<F>(self, pred: F) -> Policy
    where
        F: Fn(&RuleEnv<'_>, &RuleSubject<'_>) -> bool + Send + Sync + 'static,
    {
        self.finish(RuleCheck::Filter(FilterKind::Include), pred)
    }

    /// Filter: same as [`Self::reject`].
    #[must_use]
    pub fn exclude<F>(self, pred: F) -> Policy
    where
        F: Fn(&RuleEnv<'_>, &RuleSubject<'_>) -> bool + Send + Sync + 'static,
    {
        self.finish(RuleCheck::Filter(FilterKind::Exclude), pred)
    }

    fn finish<F>(self, check: RuleCheck, pred: F) -> Policy
    where
        F: Fn(&RuleEnv<'_>, &RuleSubject<'_>) -> bool + Send + Sync + 'static,
    {
        let description = self
            .description
            .unwrap_or_else(|| format!("{}: {} {} {}", self.policy.name, self.verb, self.selector, check));
        let mut rule = PolicyRule::new(self.selector, self.operation, check, predicate(pred)).describe(description);
        if self.negated {
            rule = rule.negate();
        }
        self.policy.rule(rule)
    }
}
