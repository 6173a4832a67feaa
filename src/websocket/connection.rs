use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use super::message::WsMessage;

/// An error from a [`WsConnection`] operation.
#[derive(Debug, Error)]
pub enum WsError {
    /// The connection was closed.
    #[error("connection closed")]
    Closed,

    /// The connection was already opened with a transport sink.
    #[error("connection already open")]
    AlreadyOpen,

    /// The transport dropped its receiving end.
    #[error("transport receiver dropped")]
    TransportGone,
}

enum State {
    /// Not yet attached to a transport; outbound messages queue up.
    Pending(Vec<WsMessage>),
    /// Attached; messages go straight to the transport sink.
    Open(UnboundedSender<WsMessage>),
    /// Terminal.
    Closed,
}

/// One client's WebSocket connection, with an explicit lifecycle.
///
/// A connection starts `Pending`: messages sent before the transport
/// finishes its handshake are queued. [`open`](WsConnection::open) attaches
/// the transport sink and flushes the queue in order.
/// [`close`](WsConnection::close) is terminal; sending afterwards fails.
pub struct WsConnection {
    state: Mutex<State>,
}

impl Default for WsConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl WsConnection {
    /// Creates a connection in the pending state.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Pending(Vec::new())),
        }
    }

    /// Sends a message to the client, queueing it if the connection is not
    /// open yet.
    pub fn send(&self, message: WsMessage) -> Result<(), WsError> {
        let mut state = self.state.lock();
        match &mut *state {
            State::Pending(queue) => {
                queue.push(message);
                Ok(())
            }
            State::Open(sink) => {
                if sink.send(message).is_err() {
                    *state = State::Closed;
                    return Err(WsError::TransportGone);
                }
                Ok(())
            }
            State::Closed => Err(WsError::Closed),
        }
    }

    /// Attaches the transport sink, flushing every queued message in send
    /// order. May be called exactly once, on a pending connection.
    pub fn open(&self, sink: UnboundedSender<WsMessage>) -> Result<(), WsError> {
        let mut state = self.state.lock();
        match &mut *state {
            State::Pending(queue) => {
                for message in std::mem::take(queue) {
                    if sink.send(message).is_err() {
                        *state = State::Closed;
                        return Err(WsError::TransportGone);
                    }
                }
                *state = State::Open(sink);
                Ok(())
            }
            State::Open(_) => Err(WsError::AlreadyOpen),
            State::Closed => Err(WsError::Closed),
        }
    }

    /// Closes the connection, dropping any queued messages and the sink.
    pub fn close(&self) {
        *self.state.lock() = State::Closed;
    }

    /// Whether the connection is attached to a transport sink.
    pub fn is_open(&self) -> bool {
        matches!(&*self.state.lock(), State::Open(_))
    }

    /// Whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(&*self.state.lock(), State::Closed)
    }
}
