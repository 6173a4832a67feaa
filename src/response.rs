use serde::Serialize;
use serde_json::Value;

/// The dispatch result handed back to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    status: u16,
    body: Value,
}

impl Response {
    /// Creates a successful response with the given body.
    pub fn new(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// Sets the HTTP-equivalent status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Returns the HTTP-equivalent status code.
    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns a reference to the response body.
    #[inline]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Replaces the response body. After-hooks use this to reshape the
    /// handler result.
    #[inline]
    pub fn set_body(&mut self, body: Value) {
        self.body = body;
    }

    /// Consumes the response, returning the body.
    #[inline]
    pub fn into_body(self) -> Value {
        self.body
    }
}

impl From<Value> for Response {
    fn from(body: Value) -> Self {
        Response::new(body)
    }
}
