//! Body-schema validation seam.
//!
//! Schema validation itself is an external collaborator; trellis only
//! defines the contract. A route configured with a schema has its request
//! body validated in the before stage, and a rejection becomes a
//! [`DispatchError::Validation`](crate::DispatchError::Validation).

use serde_json::Value;

/// A black-box body validator.
pub trait Schema: Send + Sync + 'static {
    /// Validates `value`, returning the (possibly normalized) data on
    /// success or the rejection reasons on failure.
    fn validate(&self, value: &Value) -> Result<Value, Vec<String>>;
}

impl<F> Schema for F
where
    F: Fn(&Value) -> Result<Value, Vec<String>> + Send + Sync + 'static,
{
    fn validate(&self, value: &Value) -> Result<Value, Vec<String>> {
        self(value)
    }
}
