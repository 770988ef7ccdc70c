//! # Publishers
//!
//! Delivery of push messages to per-client channels.
//!
//! ```text
//! Pusher ──publish(channel, msg)──▶ ChannelPublisher   ──▶ crossbeam Receiver<Envelope>
//!                              └──▶ BroadcastPublisher ──▶ tokio broadcast (JSON text)
//! ```

use crate::error::{PublishError, PublishResult};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tessera_shared::PushMessage;
use tokio::sync::broadcast;

/// Delivers messages to named channels.
pub trait Publisher: Send + Sync {
    /// Publishes `message` on `channel`. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] if the message could not be handed off.
    fn publish(&self, channel: &str, message: &PushMessage) -> PublishResult<()>;
}

/// A message with its destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Channel name.
    pub channel: String,
    /// Message.
    pub message: PushMessage,
}

/// In-process publisher over a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: Sender<Envelope>,
    receiver: Receiver<Envelope>,
}

impl ChannelPublisher {
    /// Creates a bounded publisher.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self { sender, receiver }
    }

    /// Creates an unbounded publisher.
    #[must_use]
    pub fn unbounded() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// Receiving side, for the transport thread.
    #[must_use]
    pub fn receiver(&self) -> Receiver<Envelope> {
        self.receiver.clone()
    }

    /// Takes every envelope waiting in the channel.
    #[must_use]
    pub fn drain(&self) -> Vec<Envelope> {
        self.receiver.try_iter().collect()
    }
}

impl Default for ChannelPublisher {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, channel: &str, message: &PushMessage) -> PublishResult<()> {
        let envelope = Envelope {
            channel: channel.to_owned(),
            message: message.clone(),
        };
        self.sender.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => PublishError::Full {
                channel: channel.to_owned(),
            },
            TrySendError::Disconnected(_) => PublishError::Disconnected {
                channel: channel.to_owned(),
            },
        })
    }
}

/// Fan-out publisher over a tokio broadcast channel; messages travel as
/// `(channel, json)` pairs so async transports can forward them verbatim.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<(String, String)>,
}

impl BroadcastPublisher {
    /// Creates a hub retaining up to `capacity` messages per lagging
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New subscription; only messages published afterwards are seen.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<(String, String)> {
        self.sender.subscribe()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Publisher for BroadcastPublisher {
    fn publish(&self, channel: &str, message: &PushMessage) -> PublishResult<()> {
        let json = message.to_json()?;
        self.sender
            .send((channel.to_owned(), json))
            .map(|_| ())
            .map_err(|_| PublishError::NoSubscribers {
                channel: channel.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_publisher_delivers_in_order() {
        let p = ChannelPublisher::unbounded();
        p.publish("/data/update/a", &PushMessage::node_update(1, "x")).unwrap();
        p.publish("/data/update/a", &PushMessage::node_update(2, "y")).unwrap();
        let got = p.drain();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].message, PushMessage::node_update(1, "x"));
        assert!(p.drain().is_empty());
    }

    #[test]
    fn test_bounded_channel_reports_full() {
        let p = ChannelPublisher::bounded(1);
        p.publish("c", &PushMessage::node_update(1, "x")).unwrap();
        let err = p.publish("c", &PushMessage::node_update(2, "y")).unwrap_err();
        assert!(matches!(err, PublishError::Full { channel } if channel == "c"));
    }

    #[test]
    fn test_broadcast_publisher_encodes_json() {
        let p = BroadcastPublisher::new(8);
        assert!(matches!(
            p.publish("c", &PushMessage::node_update(1, "x")),
            Err(PublishError::NoSubscribers { .. })
        ));
        let mut rx = p.subscribe();
        p.publish("c", &PushMessage::node_update(7, "xxx")).unwrap();
        let (channel, json) = rx.try_recv().unwrap();
        assert_eq!(channel, "c");
        assert_eq!(json, r#"{"type":"node_update","payload":{"nodeId":7,"innerHtml":"xxx"}}"#);
    }
}
