use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A routable WebSocket message.
///
/// Framing is a transport concern, but every message must carry at least a
/// type tag, a payload and a path so the dispatcher can route it through the
/// same tree as HTTP requests, keyed under the `ws` protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    /// The application-level message type tag.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// The message payload.
    pub data: Value,
    /// The route path this message is addressed to.
    pub path: String,
}

impl WsMessage {
    /// Creates a message.
    pub fn new(msg_type: impl Into<String>, path: impl Into<String>, data: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
            path: path.into(),
        }
    }
}
