//! # Tessera Core
//!
//! Data-side foundation of the reactive view engine:
//! - The record contract consumed from the persistence layer
//! - The metamodel lookup table
//! - Field interception (before/after read and write)
//! - Per-fragment dependency sets
//! - Lifecycle notification routing
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        TESSERA CORE                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Record ──read_through──▶ FieldInterceptor chain             │
//! │                               │                              │
//! │                               ▼                              │
//! │                        DependencySet ──topics──▶ ChangeHub   │
//! │                                                     │        │
//! │  save/destroy ─────────────── notify ───────────────┘        │
//! │                                   └──▶ ChangeBuffer (client) │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod access;
pub mod deps;
pub mod error;
pub mod hub;
pub mod ids;
pub mod record;
pub mod schema;

pub use access::{read_through, write_through, FieldInterceptor};
pub use deps::{DependencySet, FieldAccess, ObjectAccesses, Query, QueryChange};
pub use error::{AccessDenied, AccessError, AccessKind, AccessResult, RecordError, RecordResult};
pub use hub::{ChangeBuffer, ChangeHub, ChangeKind, LiveSubscriptions, RecordChange, Subscriber, Topic};
pub use ids::{ClientId, IdAllocator, NodeId};
pub use record::{QueryExecutor, QueryTarget, Record, RecordKey, RecordRef, RecordSet, Value};
pub use schema::{FieldRef, Multiplicity, RecordType, Schema};
