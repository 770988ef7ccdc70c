//! # Tessera Shared
//!
//! Wire-level types used by both the server and the browser client.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on the engine crates. Clients and tools
//! decode push messages with nothing but `serde`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod protocol;

pub use constants::{CONST_NODE_FORMATS, DEFAULT_VIEW, PUSH_CHANNEL_PREFIX};
pub use protocol::{NodeUpdate, PushMessage, StatusKind, StatusMessage};
