//! # Policy Rules
//!
//! A rule pairs a field selector and an operation with exactly one check:
//! a condition (`When`/`Unless`) or a filter (`Select`/`Reject`/`Include`/
//! `Exclude`). [`RuleCheck`] makes "both" unrepresentable.
//!
//! Truth table, before the `negated` flip:
//!
//! | check     | predicate true | predicate false |
//! |-----------|----------------|-----------------|
//! | `When`    | deny           | allow           |
//! | `Unless`  | allow          | deny            |
//! | `Select`  | keep           | drop            |
//! | `Include` | keep           | drop            |
//! | `Reject`  | drop           | keep            |
//! | `Exclude` | drop           | keep            |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::{AccessKind, FieldRef, Record, RecordRef, Value};

/// Named values bound into every rule evaluation of a policy.
pub type Globals = BTreeMap<String, Value>;

/// Condition kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionKind {
    /// Deny when the predicate holds.
    When,
    /// Deny unless the predicate holds.
    Unless,
}

/// Filter kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    /// Keep elements satisfying the predicate.
    Select,
    /// Drop elements satisfying the predicate.
    Reject,
    /// Synonym of `Select`.
    Include,
    /// Synonym of `Reject`.
    Exclude,
}

/// The single check a rule carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleCheck {
    /// Access condition.
    Condition(ConditionKind),
    /// Collection filter.
    Filter(FilterKind),
}

impl fmt::Display for RuleCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Self::Condition(ConditionKind::When) => "when",
            Self::Condition(ConditionKind::Unless) => "unless",
            Self::Filter(FilterKind::Select) => "select",
            Self::Filter(FilterKind::Reject) => "reject",
            Self::Filter(FilterKind::Include) => "include",
            Self::Filter(FilterKind::Exclude) => "exclude",
        };
        f.write_str(word)
    }
}

/// Operations a rule governs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Reads only.
    Read,
    /// Writes only.
    Write,
    /// Reads and writes.
    Both,
}

impl Operation {
    /// True if this operation governs `kind`.
    #[must_use]
    pub const fn covers(self, kind: AccessKind) -> bool {
        matches!(
            (self, kind),
            (Self::Both, _) | (Self::Read, AccessKind::Read) | (Self::Write, AccessKind::Write)
        )
    }
}

/// Which fields a rule applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldSelector {
    /// One field, `Owner.name`.
    Field {
        /// Declaring type.
        owner: Arc<str>,
        /// Field name.
        name: Arc<str>,
    },
    /// Every field of a record type, `Type.*`.
    AllOf(Arc<str>),
}

impl FieldSelector {
    /// Selects a single field.
    #[must_use]
    pub fn field(owner: &str, name: &str) -> Self {
        Self::Field {
            owner: Arc::from(owner),
            name: Arc::from(name),
        }
    }

    /// Selects every field of `type_name`.
    #[must_use]
    pub fn all_of(type_name: &str) -> Self {
        Self::AllOf(Arc::from(type_name))
    }

    /// True if `field`, accessed on a record of `record_type`, is selected.
    #[must_use]
    pub fn matches(&self, record_type: &str, field: &FieldRef) -> bool {
        match self {
            Self::Field { owner, name } => {
                field.name() == &**name && (field.owner() == &**owner || record_type == &**owner)
            }
            Self::AllOf(ty) => record_type == &**ty || field.owner() == &**ty,
        }
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { owner, name } => write!(f, "{owner}.{name}"),
            Self::AllOf(ty) => write!(f, "{ty}.*"),
        }
    }
}

/// Evaluation environment: the principal and the policy's globals.
///
/// Rule bodies read records directly through [`Record::read_field`]; those
/// reads are neither policy-checked nor dependency-tracked.
pub struct RuleEnv<'a> {
    principal: &'a RecordRef,
    globals: &'a Globals,
    shared: &'a Globals,
}

impl<'a> RuleEnv<'a> {
    /// Creates an environment.
    #[must_use]
    pub const fn new(principal: &'a RecordRef, globals: &'a Globals, shared: &'a Globals) -> Self {
        Self {
            principal,
            globals,
            shared,
        }
    }

    /// The principal the policy is bound to.
    #[must_use]
    pub const fn principal(&self) -> &'a RecordRef {
        self.principal
    }

    /// A global value; policy globals shadow process-wide ones.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&'a Value> {
        self.globals.get(name).or_else(|| self.shared.get(name))
    }
}

/// What a rule is evaluated against.
pub struct RuleSubject<'a> {
    /// Record being accessed.
    pub record: &'a dyn Record,
    /// Field being accessed.
    pub field: &'a FieldRef,
    /// Candidate value (writes) or collection element (filters).
    pub value: Option<&'a Value>,
}

/// Rule body.
pub type RulePredicate = Arc<dyn Fn(&RuleEnv<'_>, &RuleSubject<'_>) -> bool + Send + Sync>;

/// Wraps a closure as a [`RulePredicate`].
pub fn predicate<F>(f: F) -> RulePredicate
where
    F: Fn(&RuleEnv<'_>, &RuleSubject<'_>) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A declared policy rule.
#[derive(Clone)]
pub struct PolicyRule {
    description: String,
    selector: FieldSelector,
    operation: Operation,
    check: RuleCheck,
    negated: bool,
    predicate: RulePredicate,
}

impl PolicyRule {
    /// Creates a non-negated rule.
    #[must_use]
    pub fn new(selector: FieldSelector, operation: Operation, check: RuleCheck, predicate: RulePredicate) -> Self {
        let description = format!("{selector} {check}");
        Self {
            description,
            selector,
            operation,
            check,
            negated: false,
            predicate,
        }
    }

    /// Flips the negation flag.
    #[must_use]
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// Replaces the generated description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Human readable description, used in denial messages.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Field selector.
    #[must_use]
    pub const fn selector(&self) -> &FieldSelector {
        &self.selector
    }

    /// Governed operation.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// The check.
    #[must_use]
    pub const fn check(&self) -> RuleCheck {
        self.check
    }

    /// Negation flag.
    #[must_use]
    pub const fn is_negated(&self) -> bool {
        self.negated
    }

    /// True for condition rules.
    #[must_use]
    pub const fn is_condition(&self) -> bool {
        matches!(self.check, RuleCheck::Condition(_))
    }

    /// True for filter rules.
    #[must_use]
    pub const fn is_filter(&self) -> bool {
        matches!(self.check, RuleCheck::Filter(_))
    }

    /// True if the rule governs `kind` accesses to `field` on `record_type`.
    #[must_use]
    pub fn applies_to(&self, kind: AccessKind, record_type: &str, field: &FieldRef) -> bool {
        self.operation.covers(kind) && self.selector.matches(record_type, field)
    }

    /// Condition result: true means the access is denied. Filters never deny.
    #[must_use]
    pub fn denies(&self, env: &RuleEnv<'_>, subject: &RuleSubject<'_>) -> bool {
        let RuleCheck::Condition(kind) = self.check else {
            return false;
        };
        let hit = (self.predicate)(env, subject);
        let ans = match kind {
            ConditionKind::When => hit,
            ConditionKind::Unless => !hit,
        };
        ans ^ self.negated
    }

    /// Filter result for one element: true means the element is dropped.
    /// Conditions never drop.
    #[must_use]
    pub fn drops(&self, env: &RuleEnv<'_>, subject: &RuleSubject<'_>) -> bool {
        let RuleCheck::Filter(kind) = self.check else {
            return false;
        };
        let hit = (self.predicate)(env, subject);
        let ans = match kind {
            FilterKind::Select | FilterKind::Include => !hit,
            FilterKind::Reject | FilterKind::Exclude => hit,
        };
        ans ^ self.negated
    }
}

impl fmt::Debug for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRule")
            .field("description", &self.description)
            .field("selector", &self.selector)
            .field("operation", &self.operation)
            .field("check", &self.check)
            .field("negated", &self.negated)
            .finish_non_exhaustive()
    }
}
