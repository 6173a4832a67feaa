//! Trellis is a multi-protocol request routing and dispatch core.
//!
//! Given an incoming request (an HTTP verb, a WebSocket message, or an RPC
//! call) and a path, trellis locates the registered handler in a route tree,
//! extracts and coerces typed path parameters, runs before/after hook chains
//! around the handler, and optionally serves the result from a
//! handler-scoped TTL cache. The network transport is a collaborator: it
//! parses requests, calls [`Dispatcher::handle`], and writes the returned
//! [`Response`] back to the wire.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use trellis::{handler, route, Context, Dispatcher, Protocol, Request, RouteTable};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let routes = RouteTable::new()
//!     .at(
//!         "/rpc/createUser",
//!         route::post(handler(|ctx: Context| async move {
//!             Ok(json!({ "created": true, "name": ctx.request().body()["name"] }))
//!         })),
//!     )
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::new(routes);
//! let resp = dispatcher
//!     .handle(Request::new(Protocol::Post, "/rpc/createUser", json!({ "name": "Ada" })))
//!     .await;
//! assert_eq!(resp.body(), &json!({ "created": true, "name": "Ada" }));
//! # });
//! ```
//!
//! # Route patterns
//!
//! A pattern is a `/`-separated template. A segment is either a literal or a
//! named parameter starting with `:`, optionally `?`-prefixed (optional) and
//! suffixed with a type marker: `$` (integer), `(` (date), `^` (boolean), or
//! none (string). `/users/:id$` matches `/users/42` and binds `id` to the
//! integer `42`. Static segments always win over dynamic ones at the same
//! tree position, with full backtracking into deeper levels.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod hook;
pub mod pattern;
pub mod route;
pub mod schema;
pub mod service;
pub mod websocket;

mod context;
mod handler;
mod path;
mod protocol;
mod request;
mod response;
mod tree;

pub use async_trait::async_trait;
pub use cache::{CacheConfig, HandlerCache};
pub use context::{Context, Extensions};
pub use dispatcher::{error_hook, Dispatcher, ErrorHook, Fault, Stage, WS_TYPE_HEADER};
pub use error::{DispatchError, PatternError, RouteError};
pub use handler::{handler, ClientDescriptor, FnHandler, Handler, ParamDescriptor, RouteMetadata};
pub use hook::{HookChain, HookChainBuilder};
pub use path::tokenize;
pub use pattern::{ParamMap, ParamType, ParamValue, Pattern};
pub use protocol::{Protocol, UnknownProtocol};
pub use request::{Request, RequestBuilder};
pub use response::Response;
pub use route::{Route, RouteTable};
pub use schema::Schema;
pub use service::ServiceRegistry;
