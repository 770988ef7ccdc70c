//! Push and publish failures.

use tessera_core::ClientId;
use tessera_view::{ProtocolError, ViewError};
use thiserror::Error;

/// Failures of a push cycle that abort it as a whole.
///
/// Per-node re-render failures are not errors of the cycle; they are
/// logged and counted in the cycle's statistics.
#[derive(Error, Debug)]
pub enum PushError {
    /// No session for this client.
    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    /// Render failure outside a per-node update.
    #[error(transparent)]
    View(#[from] ViewError),

    /// Tree surgery failed; indicates a bug.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Failures delivering a message.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The receiving side is gone.
    #[error("push channel {channel} is disconnected")]
    Disconnected {
        /// Channel name.
        channel: String,
    },

    /// A bounded channel is full.
    #[error("push channel {channel} is full")]
    Full {
        /// Channel name.
        channel: String,
    },

    /// Nobody listens on the broadcast hub.
    #[error("no subscribers for push channel {channel}")]
    NoSubscribers {
        /// Channel name.
        channel: String,
    },

    /// The message could not be encoded.
    #[error("failed to encode push message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of push operations.
pub type PushResult<T> = Result<T, PushError>;

/// Result of publish operations.
pub type PublishResult<T> = Result<T, PublishError>;
