//! # Scoped Policy Enforcement
//!
//! Policy checking is enabled for one principal at a time, for the
//! duration of a closure:
//!
//! ```text
//! scope.with_policy_scope(alice, |s| {      active = alice
//!     s.with_policy_scope(bob, |s| { .. }); active = bob, then alice again
//!     s.without_policy(|s| { .. });         active = none, then alice again
//! });                                       active = previous (often none)
//! ```
//!
//! The previous scope is restored on every exit path, including an error
//! return or a panic unwinding through the closure.

use crate::checker::PolicyChecker;
use crate::context::PolicyContext;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tessera_core::{
    AccessDenied, AccessResult, FieldInterceptor, FieldRef, Record, RecordRef, RecordSet, Value,
};

/// The currently enforced principal of one logical request.
#[derive(Debug)]
pub struct AccessScope {
    context: Arc<PolicyContext>,
    active: Option<Arc<PolicyChecker>>,
    empty_on_read_violation: bool,
}

impl AccessScope {
    /// Creates a scope with no active principal.
    #[must_use]
    pub const fn new(context: Arc<PolicyContext>) -> Self {
        Self {
            context,
            active: None,
            empty_on_read_violation: false,
        }
    }

    /// Denied reads yield an empty value instead of an error.
    #[must_use]
    pub const fn empty_on_read_violation(mut self, enabled: bool) -> Self {
        self.empty_on_read_violation = enabled;
        self
    }

    /// The shared policy context.
    #[must_use]
    pub const fn context(&self) -> &Arc<PolicyContext> {
        &self.context
    }

    /// Runs `f` with policies enforced for `principal`.
    pub fn with_policy_scope<R>(&mut self, principal: &RecordRef, f: impl FnOnce(&mut Self) -> R) -> R {
        let checker = self.context.checker_for(principal);
        self.enter(Some(checker), f)
    }

    /// Runs `f` with policy checking disabled.
    pub fn without_policy<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.enter(None, f)
    }

    fn enter<R>(&mut self, next: Option<Arc<PolicyChecker>>, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.active, next);
        let outcome = catch_unwind(AssertUnwindSafe(|| f(&mut *self)));
        self.active = previous;
        match outcome {
            Ok(value) => value,
            Err(panic) => resume_unwind(panic),
        }
    }

    /// Principal currently enforced, if any.
    #[must_use]
    pub fn active_principal(&self) -> Option<&RecordRef> {
        self.active.as_ref().map(|c| c.principal())
    }

    /// Checker currently enforced, if any.
    #[must_use]
    pub fn active_checker(&self) -> Option<&Arc<PolicyChecker>> {
        self.active.as_ref()
    }

    /// An interceptor enforcing the active principal, if any.
    #[must_use]
    pub fn guard(&self) -> Option<PolicyGuard> {
        self.active
            .as_ref()
            .map(|c| PolicyGuard::new(Arc::clone(c)).empty_on_read_violation(self.empty_on_read_violation))
    }
}

/// Field interceptor enforcing one principal's policies.
///
/// - `before_read`: read conditions
/// - `replace_read`: the empty value standing in for a suppressed violation
/// - `after_read`: read filters on collection values
/// - `before_write`: write conditions against the candidate value
#[derive(Debug)]
pub struct PolicyGuard {
    checker: Arc<PolicyChecker>,
    empty_on_read_violation: bool,
    suppressed: Option<AccessDenied>,
}

impl PolicyGuard {
    /// Wraps a bound checker.
    #[must_use]
    pub const fn new(checker: Arc<PolicyChecker>) -> Self {
        Self {
            checker,
            empty_on_read_violation: false,
            suppressed: None,
        }
    }

    /// Denied reads yield an empty value instead of an error.
    #[must_use]
    pub const fn empty_on_read_violation(mut self, enabled: bool) -> Self {
        self.empty_on_read_violation = enabled;
        self
    }

    /// The wrapped checker.
    #[must_use]
    pub const fn checker(&self) -> &Arc<PolicyChecker> {
        &self.checker
    }
}

impl FieldInterceptor for PolicyGuard {
    fn before_read(&mut self, record: &dyn Record, field: &FieldRef) -> AccessResult<()> {
        match self.checker.check_read(record, field) {
            Ok(()) => Ok(()),
            Err(denied) if self.empty_on_read_violation => {
                self.suppressed = Some(denied);
                Ok(())
            }
            Err(denied) => Err(denied.into()),
        }
    }

    fn replace_read(&mut self, _: &dyn Record, field: &FieldRef) -> Option<Value> {
        let denied = self.suppressed.take()?;
        tracing::debug!(%denied, "read violation replaced with empty value");
        Some(if field.is_many() { Value::List(Vec::new()) } else { Value::Null })
    }

    fn after_read(&mut self, record: &dyn Record, field: &FieldRef, value: Value) -> AccessResult<Value> {
        if !field.is_many() && !matches!(value, Value::List(_)) {
            return Ok(value);
        }
        let items = RecordSet::from_value(value);
        Ok(self
            .checker
            .apply_filters(record, field, &items)
            .into_value())
    }

    fn before_write(&mut self, record: &dyn Record, field: &FieldRef, value: &Value) -> AccessResult<()> {
        self.checker.check_write(record, field, value).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PolicyConfig;
    use crate::policy::Policy;
    use crate::registry::PolicyRegistry;
    use crate::rule::FieldSelector;
    use tessera_core::record::memory::MemRecord;
    use tessera_core::{read_through, AccessError, DependencySet};

    fn scope() -> AccessScope {
        let registry = PolicyRegistry::new().with(
            Policy::new("P", "Client")
                .restrict(FieldSelector::field("User", "pswd"))
                .when(|_, _| true),
        );
        AccessScope::new(Arc::new(PolicyContext::new(registry, PolicyConfig::default())))
    }

    #[test]
    fn test_nested_scopes_restore() {
        let mut scope = scope();
        let alice = MemRecord::new("Client", 1).shared();
        let bob = MemRecord::new("Client", 2).shared();
        scope.with_policy_scope(&alice, |s| {
            assert_eq!(s.active_principal().map(|p| p.key()), Some(alice.key()));
            s.with_policy_scope(&bob, |s| {
                assert_eq!(s.active_principal().map(|p| p.key()), Some(bob.key()));
            });
            s.without_policy(|s| assert!(s.active_principal().is_none()));
            assert_eq!(s.active_principal().map(|p| p.key()), Some(alice.key()));
        });
        assert!(scope.active_principal().is_none());
    }

    #[test]
    fn test_scope_restored_after_panic() {
        let mut scope = scope();
        let alice = MemRecord::new("Client", 1).shared();
        let caught = catch_unwind(AssertUnwindSafe(|| {
            scope.with_policy_scope(&alice, |_| panic!("render blew up"));
        }));
        assert!(caught.is_err());
        assert!(scope.active_principal().is_none());
    }

    #[test]
    fn test_guard_denies_and_suppresses() {
        let mut scope = scope();
        let alice = MemRecord::new("Client", 1).shared();
        let user = MemRecord::new("User", 9).with("pswd", "hunter2");
        let field = FieldRef::new("User", "pswd");

        assert!(scope.guard().is_none());
        scope.with_policy_scope(&alice, |s| {
            let mut guard = s.guard().unwrap();
            let err = read_through(&mut [&mut guard], &user, &field).unwrap_err();
            assert!(matches!(err, AccessError::Denied(_)));

            let mut lenient = s.guard().unwrap().empty_on_read_violation(true);
            let value = read_through(&mut [&mut lenient], &user, &field).unwrap();
            assert!(value.is_null());
        });
    }

    #[test]
    fn test_suppressed_read_is_recorded_as_empty() {
        let mut scope = scope().empty_on_read_violation(true);
        let alice = MemRecord::new("Client", 1).shared();
        let user = MemRecord::new("User", 9).with("pswd", "hunter2");
        let field = FieldRef::new("User", "pswd");

        scope.with_policy_scope(&alice, |s| {
            let mut guard = s.guard().unwrap();
            let mut deps = DependencySet::new();
            let value = read_through(&mut [&mut guard, &mut deps], &user, &field).unwrap();
            assert!(value.is_null());
            assert_eq!(deps.accesses_for(&user.key())[0].value, Value::Null);
        });
    }
}
