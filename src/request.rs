use std::collections::HashMap;

use serde_json::Value;

use crate::protocol::Protocol;

/// A parsed inbound request, handed to the dispatcher by the transport.
#[derive(Debug, Clone)]
pub struct Request {
    protocol: Protocol,
    path: String,
    body: Value,
    headers: HashMap<String, String>,
}

impl Request {
    /// Creates a request with the given protocol, path and body.
    pub fn new(protocol: Protocol, path: impl Into<String>, body: Value) -> Self {
        Self {
            protocol,
            path: path.into(),
            body,
            headers: HashMap::new(),
        }
    }

    /// Creates a request builder.
    pub fn builder() -> RequestBuilder {
        RequestBuilder {
            protocol: Protocol::Get,
            path: "/".to_string(),
            headers: HashMap::new(),
        }
    }

    /// Returns the protocol the request arrived on.
    #[inline]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns the request path.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns a reference to the request body.
    #[inline]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Replaces the request body. Before-hooks use this to enrich the
    /// payload seen by the handler.
    #[inline]
    pub fn set_body(&mut self, body: Value) {
        self.body = body;
    }

    /// Take the body out of this request, leaving `null` behind.
    #[inline]
    pub fn take_body(&mut self) -> Value {
        std::mem::take(&mut self.body)
    }

    /// Returns the associated headers.
    #[inline]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Returns a mutable reference to the associated headers.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.headers
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|value| value.as_str())
    }
}

/// A builder for [`Request`].
pub struct RequestBuilder {
    protocol: Protocol,
    path: String,
    headers: HashMap<String, String>,
}

impl RequestBuilder {
    /// Sets the protocol for this request.
    ///
    /// By default this is [`Protocol::Get`].
    #[must_use]
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the path for this request.
    ///
    /// By default this is `/`.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Appends a header to this request builder.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Consumes this builder, using the provided body to return a
    /// constructed [`Request`].
    pub fn body(self, body: Value) -> Request {
        Request {
            protocol: self.protocol,
            path: self.path,
            body,
            headers: self.headers,
        }
    }
}
