//! Engine error types.

use tessera_core::ClientId;
use tessera_push::{PublishError, PushError};
use tessera_view::ViewError;
use thiserror::Error;

/// Everything the engine facade can fail with.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration file could not be read.
    #[error("cannot read configuration {path}: {source}")]
    ConfigIo {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Configuration text is malformed.
    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A policy global cannot be represented as a value.
    #[error("invalid policy global {name}: {reason}")]
    InvalidGlobal {
        /// Global name.
        name: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// No connected client with this id.
    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    /// Rendering failed.
    #[error(transparent)]
    View(#[from] ViewError),

    /// A push cycle failed.
    #[error(transparent)]
    Push(#[from] PushError),

    /// A message could not be delivered.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Result of engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// The policy violation behind this error, if any.
    #[must_use]
    pub const fn access_denied(&self) -> Option<&tessera_core::AccessDenied> {
        match self {
            Self::View(e) | Self::Push(PushError::View(e)) => e.access_denied(),
            _ => None,
        }
    }
}
