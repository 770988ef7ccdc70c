//! # Tessera
//!
//! Reactive server-rendered views. Every fragment of a page remembers which
//! record fields and queries it read; when a record changes, only the
//! fragments that read it are re-rendered and pushed to their clients,
//! under the reading client's access policies.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               ENGINE                                 │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────────────┐   │
//! │  │ tessera_view │───>│ tessera_core │<───│  tessera_security    │   │
//! │  │              │    │              │    │                      │   │
//! │  │ • templates  │    │ • records    │    │ • policy rules       │   │
//! │  │ • renderer   │    │ • deps       │    │ • checker + cache    │   │
//! │  │ • node tree  │    │ • change hub │    │ • scoped guard       │   │
//! │  └──────┬───────┘    └──────┬───────┘    └──────────────────────┘   │
//! │         │                   │                                        │
//! │         │     ┌─────────────┴──┐                                     │
//! │         └────>│  tessera_push  │────> node_update / status_message   │
//! │               └────────────────┘                                     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: TOML engine configuration
//! - `engine`: client sessions, rendering, notifications, pushes
//! - `error`: engine errors

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod engine;
pub mod error;

// Re-export the units
pub use tessera_core as core;
pub use tessera_push as push;
pub use tessera_security as security;
pub use tessera_shared as shared;
pub use tessera_view as view;

// Re-export commonly used types
pub use config::{EngineConfig, PolicySection, PusherSection, RendererSection};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, EngineResult};
