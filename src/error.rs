//! Error types for pattern compilation, route registration and dispatch.

use thiserror::Error;

use crate::dispatcher::Stage;
use crate::protocol::Protocol;

/// An error raised while compiling a route pattern.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum PatternError {
    /// Two parameter segments in one pattern share a name.
    #[error("duplicate parameter name `{0}`")]
    DuplicateParam(String),

    /// A parameter segment has no name left after stripping its markers.
    #[error("empty parameter name in segment `{0}`")]
    EmptyParamName(String),
}

/// An error raised while building the route table.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The pattern string did not compile.
    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        /// The pattern as given to [`RouteTable::at`](crate::RouteTable::at).
        pattern: String,
        /// The underlying compilation failure.
        #[source]
        source: PatternError,
    },

    /// Two routes register different parameter names at the same tree
    /// position. The resolver could not tell them apart, so the second
    /// registration is rejected.
    #[error(
        "ambiguous dynamic segment in `{pattern}`: `:{incoming}` conflicts with `:{existing}` \
         already registered at this position"
    )]
    AmbiguousDynamic {
        /// The pattern being registered.
        pattern: String,
        /// The parameter name already owning the dynamic slot.
        existing: String,
        /// The conflicting parameter name.
        incoming: String,
    },
}

/// A per-request dispatch failure.
///
/// [`RouteNotFound`](DispatchError::RouteNotFound) and
/// [`Validation`](DispatchError::Validation) are expected, user-facing
/// conditions; their messages are safe to return to callers. Everything else
/// surfaces as a generic failure while the detail goes to the logs.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No route matched the request path and protocol.
    #[error("no route for {protocol} {path}")]
    RouteNotFound {
        /// The protocol the request arrived on.
        protocol: Protocol,
        /// The request path.
        path: String,
    },

    /// Parameter coercion or schema validation rejected the input.
    #[error("validation failed")]
    Validation {
        /// Human-readable rejection reasons.
        errors: Vec<String>,
    },

    /// A before/after hook returned an error, aborting the chain.
    #[error("hook chain failed")]
    Hook(#[source] anyhow::Error),

    /// The resolved handler returned an error.
    #[error("handler failed")]
    Handler(#[source] anyhow::Error),

    /// The cache layer could not derive or serve a key. Never fatal: the
    /// dispatcher skips caching and proceeds as if no entry existed, so this
    /// variant only appears in logs.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// The transport cancelled the request between pipeline stages.
    #[error("request cancelled during {stage}")]
    Cancelled {
        /// The stage at which cancellation was observed.
        stage: Stage,
    },
}

impl DispatchError {
    /// Stable machine-readable kind, used in structured error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::RouteNotFound { .. } => "route_not_found",
            DispatchError::Validation { .. } => "validation_failed",
            DispatchError::Hook(_) => "hook_failure",
            DispatchError::Handler(_) => "handler_failure",
            DispatchError::CacheUnavailable(_) => "cache_unavailable",
            DispatchError::Cancelled { .. } => "cancelled",
        }
    }

    /// HTTP-equivalent status code for the default error response.
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::RouteNotFound { .. } => 404,
            DispatchError::Validation { .. } => 400,
            DispatchError::Hook(_) => 500,
            DispatchError::Handler(_) => 500,
            DispatchError::CacheUnavailable(_) => 500,
            DispatchError::Cancelled { .. } => 499,
        }
    }

    /// Message safe to expose to the caller. Internal detail (handler and
    /// hook sources) is deliberately withheld.
    pub fn public_message(&self) -> String {
        match self {
            DispatchError::RouteNotFound { .. } => "route not found".into(),
            DispatchError::Validation { errors } => {
                format!("validation failed: {}", errors.join("; "))
            }
            DispatchError::Cancelled { .. } => "request cancelled".into(),
            _ => "internal error".into(),
        }
    }
}
