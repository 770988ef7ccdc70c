//! # Protocol Constants
//!
//! Values the browser client relies on. Changes require a client update.

/// Prefix of the per-client push channel; the client's auth token follows.
pub const PUSH_CHANNEL_PREFIX: &str = "/data/update/";

/// View used when a render request names none.
pub const DEFAULT_VIEW: &str = "application";

/// Formats whose compiled output is plain constant text.
pub const CONST_NODE_FORMATS: &[&str] = &[".txt", ".html"];

/// Opening delimiter tag of a tracked node; the node id follows.
pub const NODE_START_TAG: &str = "reds_";

/// Closing delimiter tag of a tracked node; the node id follows.
pub const NODE_END_TAG: &str = "rede_";

/// Builds the push channel name for an auth token.
#[must_use]
pub fn push_channel(prefix: &str, auth_token: &str) -> String {
    format!("{prefix}{auth_token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_channel() {
        assert_eq!(push_channel(PUSH_CHANNEL_PREFIX, "abc"), "/data/update/abc");
    }
}
