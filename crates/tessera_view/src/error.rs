//! # View Error Types
//!
//! Template resolution, compilation and render failures. Protocol errors
//! signal a renderer bug and never carry user data.

use tessera_core::{AccessError, NodeId, RecordError};
use thiserror::Error;

/// Violations of the render node protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// `close` popped a different node than the caller opened.
    #[error("render stack corrupted: expected to close {expected}, found {found:?}")]
    StackCorrupted {
        /// Node the caller meant to close.
        expected: NodeId,
        /// Node actually on top, if any.
        found: Option<NodeId>,
    },

    /// The pass finished with nodes still open.
    #[error("render stack unbalanced: {open} node(s) still open")]
    Unbalanced {
        /// Number of open nodes.
        open: usize,
    },

    /// No node is open.
    #[error("no open render node")]
    NoOpenNode,

    /// Child appended to a leaf.
    #[error("cannot append a child to leaf node {0}")]
    NotComposite(NodeId),

    /// Child appended to a node that already carries output.
    #[error("cannot append a child to node {0}: output already set")]
    OutputAlreadySet(NodeId),

    /// Output set on a node with children.
    #[error("cannot set output on node {0}: it has children")]
    HasChildren(NodeId),

    /// Output set twice with different text.
    #[error("node {0} already carries different output")]
    ConflictingOutput(NodeId),

    /// Node id not present in the tree.
    #[error("unknown render node {0}")]
    UnknownNode(NodeId),

    /// A second root was opened.
    #[error("render tree already has root {0}")]
    DuplicateRoot(NodeId),

    /// A replacement fragment has no root.
    #[error("replacement fragment for node {0} is empty")]
    EmptyFragment(NodeId),
}

/// Errors of a render pass.
#[derive(Error, Debug)]
pub enum ViewError {
    /// No template matched; lists every location checked.
    #[error("template `{template}` for view `{view}` not found; candidates checked: [{}]", candidates.join(", "))]
    TemplateNotFound {
        /// View searched.
        view: String,
        /// Template searched.
        template: String,
        /// Locations checked, in order.
        candidates: Vec<String>,
    },

    /// No compiler registered for a format.
    #[error("no template compiler registered for format `{0}`")]
    UnknownFormat(String),

    /// Template source failed to compile.
    #[error("syntax error in template `{template}`: {reason}")]
    TemplateSyntax {
        /// Template name.
        template: String,
        /// What went wrong.
        reason: String,
    },

    /// Expression referenced a name that is not bound.
    #[error("unbound local `{0}`")]
    UnboundLocal(String),

    /// Expression navigated through a value that is not a record.
    #[error("`{path}` is not a record")]
    NotARecord {
        /// Offending expression prefix.
        path: String,
    },

    /// Policy violation or record failure during a tracked access.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Renderer bug.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Record or query failure outside an intercepted access.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Template file could not be read.
    #[error("failed to read template {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ViewError {
    /// The policy violation behind this error, if any.
    #[must_use]
    pub const fn access_denied(&self) -> Option<&tessera_core::AccessDenied> {
        match self {
            Self::Access(AccessError::Denied(denied)) => Some(denied),
            _ => None,
        }
    }
}

/// Result of render node protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Result of view operations.
pub type ViewResult<T> = Result<T, ViewError>;
