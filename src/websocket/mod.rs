//! WebSocket message framing and per-client connection state.
//!
//! The connection object is explicitly owned and passed to handlers through
//! [`Context`](crate::Context); there is no process-wide shared connection.

mod connection;
mod message;

pub use connection::{WsConnection, WsError};
pub use message::WsMessage;
