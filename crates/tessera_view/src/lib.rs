//! # Tessera View
//!
//! Templates in, render trees out. Every dynamic fragment of the output
//! remembers the template and bindings that produced it and the data it
//! observed, so it can be recomputed on its own when that data changes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        TESSERA VIEW                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  RenderRequest ──normalize──▶ ViewFinder ──▶ RenderCaches    │
//! │                                   │                          │
//! │                                   ▼                          │
//! │                 TemplateEngine (.txt .html .erb, chains)     │
//! │                                   │                          │
//! │                                   ▼                          │
//! │  ViewRenderer ──RenderPass──▶ TreeBuilder ──▶ RenderTree     │
//! │       │                                        │   swap      │
//! │       └── rerender_node ── fragment ───────────┘   collapse  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod cache;
pub mod error;
pub mod finder;
pub mod renderer;
pub mod request;
pub mod template;
pub mod tree;

pub use cache::{Cache, RenderCaches};
pub use error::{ProtocolError, ProtocolResult, ViewError, ViewResult};
pub use finder::{FoundTemplate, FsSource, MemorySource, TemplateSource, ViewFinder};
pub use renderer::{escape_html, RenderPass, RendererConfig, Rerendered, ViewContext, ViewRenderer};
pub use request::{Bindings, NormalizedRequest, RenderRequest, RenderTarget};
pub use template::{CompiledTemplate, TemplateCompiler, TemplateEngine, TemplateRef};
pub use tree::{Child, ConstNode, DelimitedPrinter, NodeKind, RenderNode, RenderTree, TreeBuilder};
