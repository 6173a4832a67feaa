use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// The verb or channel a handler answers to at a given path.
///
/// A closed set: HTTP verbs plus the `ws` WebSocket channel. Every handler
/// is registered under exactly one protocol key.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Protocol {
    /// HTTP `OPTIONS`.
    Options,
    /// HTTP `GET`.
    Get,
    /// HTTP `POST`.
    Post,
    /// HTTP `PUT`.
    Put,
    /// HTTP `DELETE`.
    Delete,
    /// HTTP `HEAD`.
    Head,
    /// HTTP `PATCH`.
    Patch,
    /// The WebSocket message channel.
    Ws,
}

/// Error returned when parsing an unrecognized protocol key.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("unknown protocol `{0}`")]
pub struct UnknownProtocol(pub String);

impl Protocol {
    /// The wire spelling of the key: uppercase for HTTP verbs, `ws` for the
    /// WebSocket channel.
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Options => "OPTIONS",
            Protocol::Get => "GET",
            Protocol::Post => "POST",
            Protocol::Put => "PUT",
            Protocol::Delete => "DELETE",
            Protocol::Head => "HEAD",
            Protocol::Patch => "PATCH",
            Protocol::Ws => "ws",
        }
    }

    /// Whether results for this protocol may be served from the handler
    /// cache. WebSocket messages are never cached.
    pub fn is_cacheable(self) -> bool {
        !matches!(self, Protocol::Ws)
    }
}

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OPTIONS" => Ok(Protocol::Options),
            "GET" => Ok(Protocol::Get),
            "POST" => Ok(Protocol::Post),
            "PUT" => Ok(Protocol::Put),
            "DELETE" => Ok(Protocol::Delete),
            "HEAD" => Ok(Protocol::Head),
            "PATCH" => Ok(Protocol::Patch),
            "WS" => Ok(Protocol::Ws),
            _ => Err(UnknownProtocol(s.to_string())),
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
