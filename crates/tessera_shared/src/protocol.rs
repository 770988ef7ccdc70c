//! Push protocol messages.
//!
//! Every message is a JSON object `{ "type": ..., "payload": {...} }`:
//!
//! ```text
//! { "type": "node_update",    "payload": { "nodeId": 12, "innerHtml": "xxx" } }
//! { "type": "status_message", "payload": { "kind": "error", "msg": "...", "status": 412 } }
//! ```

use serde::{Deserialize, Serialize};

/// Message pushed to a client channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PushMessage {
    /// Replace the content of a rendered node.
    NodeUpdate(NodeUpdate),
    /// Outcome of an operation the client requested.
    StatusMessage(StatusMessage),
}

impl PushMessage {
    /// Builds a node update.
    #[must_use]
    pub fn node_update(node_id: u64, inner_html: impl Into<String>) -> Self {
        Self::NodeUpdate(NodeUpdate {
            node_id,
            inner_html: inner_html.into(),
        })
    }

    /// Builds a status message.
    #[must_use]
    pub fn status(kind: StatusKind, msg: impl Into<String>, status: u16) -> Self {
        Self::StatusMessage(StatusMessage {
            kind,
            msg: msg.into(),
            status,
        })
    }

    /// Encodes as JSON text.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; cannot happen for well-formed messages.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes from JSON text.
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed input.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Payload of `node_update`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    /// Id of the node whose content is replaced (stable across re-renders).
    pub node_id: u64,
    /// New content.
    pub inner_html: String,
}

/// Outcome category of a status message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Error,
}

/// Payload of `status_message`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Outcome category.
    pub kind: StatusKind,
    /// Human readable text.
    pub msg: String,
    /// HTTP-like status code.
    pub status: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_update_wire_shape() {
        let json = PushMessage::node_update(12, "xxx").to_json().unwrap();
        assert_eq!(json, r#"{"type":"node_update","payload":{"nodeId":12,"innerHtml":"xxx"}}"#);
    }

    #[test]
    fn test_status_wire_shape() {
        let json = PushMessage::status(StatusKind::Error, "denied", 412).to_json().unwrap();
        assert_eq!(
            json,
            r#"{"type":"status_message","payload":{"kind":"error","msg":"denied","status":412}}"#
        );
        assert_eq!(
            PushMessage::from_json(&json).unwrap(),
            PushMessage::status(StatusKind::Error, "denied", 412)
        );
    }
}
