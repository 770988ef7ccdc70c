//! Declared policies, grouped by principal type.

use crate::policy::Policy;
use std::sync::Arc;

/// Every policy known to the process, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: Vec<Arc<Policy>>,
}

impl PolicyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a policy, builder style.
    #[must_use]
    pub fn with(mut self, policy: Policy) -> Self {
        self.register(policy);
        self
    }

    /// Registers a policy.
    pub fn register(&mut self, policy: Policy) {
        tracing::debug!(
            policy = policy.name(),
            principal = policy.principal_type(),
            rules = policy.rules().len(),
            "registered policy"
        );
        self.policies.push(Arc::new(policy));
    }

    /// Policies bound to `principal_type`, in declaration order.
    pub fn for_principal_type<'a>(&'a self, principal_type: &'a str) -> impl Iterator<Item = &'a Arc<Policy>> + 'a {
        self.policies
            .iter()
            .filter(move |p| p.principal_type() == principal_type)
    }

    /// Number of policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// True if no policy is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
