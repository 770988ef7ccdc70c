//! # Tessera Security - Field-Level Access Policy
//!
//! Every field a template touches is authorized for the principal the
//! request runs as.
//!
//! ## Features
//!
//! - **Declarative rules**: `restrict` / `allow_*` over a field or a whole type
//! - **Conditions**: `when` / `unless` deny a read or write outright
//! - **Filters**: `select` / `reject` / `include` / `exclude` thin collections
//! - **Scoped enforcement**: nested principals, restored on every exit path
//!
//! ## Architecture
//!
//! ```text
//! PolicyRegistry ──▶ PolicyContext ──▶ RuleSets (per principal type)
//!                         │                  │
//!                         │                  ▼
//!                         └──────────▶ PolicyChecker (per principal)
//!                                            │
//!                  AccessScope ──guard()──▶ PolicyGuard : FieldInterceptor
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod checker;
pub mod context;
pub mod policy;
pub mod registry;
pub mod rule;
pub mod scope;

pub use checker::{DecisionCache, Partition, PolicyChecker, RuleEntry, RuleSets};
pub use context::{PolicyConfig, PolicyContext};
pub use policy::{Policy, RuleBuilder};
pub use registry::PolicyRegistry;
pub use rule::{
    predicate, ConditionKind, FieldSelector, FilterKind, Globals, Operation, PolicyRule, RuleCheck, RuleEnv,
    RulePredicate, RuleSubject,
};
pub use scope::{AccessScope, PolicyGuard};
