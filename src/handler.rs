use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::context::Context;
use crate::pattern::{ParamType, Pattern, Segment};
use crate::protocol::Protocol;

/// A registered request handler.
///
/// A handler is identified at registration time by its `(protocol, path)`
/// pair and owned exclusively by the route-tree node it is registered under.
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Produce the result body for the request.
    async fn handle(&self, ctx: Context) -> Result<Value>;

    /// Describe this handler for caller-side stub generation.
    fn describe(&self, metadata: &RouteMetadata) -> ClientDescriptor {
        ClientDescriptor::from_metadata(metadata)
    }
}

#[async_trait::async_trait]
impl<T: Handler + ?Sized> Handler for Box<T> {
    async fn handle(&self, ctx: Context) -> Result<Value> {
        self.as_ref().handle(ctx).await
    }

    fn describe(&self, metadata: &RouteMetadata) -> ClientDescriptor {
        self.as_ref().describe(metadata)
    }
}

#[async_trait::async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
    async fn handle(&self, ctx: Context) -> Result<Value> {
        self.as_ref().handle(ctx).await
    }

    fn describe(&self, metadata: &RouteMetadata) -> ClientDescriptor {
        self.as_ref().describe(metadata)
    }
}

/// A [`Handler`] built from an async function or closure.
pub struct FnHandler(Box<dyn Fn(Context) -> BoxFuture<'static, Result<Value>> + Send + Sync>);

/// Wraps an async function as a [`Handler`].
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use trellis::{handler, Context};
///
/// let echo = handler(|ctx: Context| async move { Ok(ctx.request().body().clone()) });
/// # let _ = echo;
/// ```
pub fn handler<F, Fut>(f: F) -> FnHandler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    FnHandler(Box::new(move |ctx| Box::pin(f(ctx))))
}

#[async_trait::async_trait]
impl Handler for FnHandler {
    async fn handle(&self, ctx: Context) -> Result<Value> {
        (self.0)(ctx).await
    }
}

/// One route parameter, as exposed to stub generators.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ParamDescriptor {
    /// The parameter name.
    pub name: String,
    /// The declared type.
    #[serde(rename = "type")]
    pub ty: ParamType,
    /// Whether the parameter may be omitted.
    pub optional: bool,
}

/// Registration metadata for one `(protocol, path)` handler.
#[derive(Debug, Clone, Serialize)]
pub struct RouteMetadata {
    /// The protocol key the handler answers to.
    pub protocol: Protocol,
    /// The canonical route path (type markers stripped).
    pub path: String,
    /// The ordered parameter descriptors of the route pattern.
    pub params: Vec<ParamDescriptor>,
}

impl RouteMetadata {
    pub(crate) fn from_pattern(protocol: Protocol, pattern: &Pattern) -> Self {
        let params = pattern
            .segments()
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(spec) => Some(ParamDescriptor {
                    name: spec.name.clone(),
                    ty: spec.ty,
                    optional: spec.optional,
                }),
                Segment::Literal(_) => None,
            })
            .collect();
        RouteMetadata {
            protocol,
            path: pattern.route_string(),
            params,
        }
    }
}

/// A serializable description of a registered handler, consumed by
/// caller-side stub generators.
#[derive(Debug, Clone, Serialize)]
pub struct ClientDescriptor {
    /// The protocol key.
    pub protocol: Protocol,
    /// The canonical route path.
    pub path: String,
    /// The route's parameter descriptors.
    pub params: Vec<ParamDescriptor>,
}

impl ClientDescriptor {
    /// Builds the default descriptor straight from registration metadata.
    pub fn from_metadata(metadata: &RouteMetadata) -> Self {
        ClientDescriptor {
            protocol: metadata.protocol,
            path: metadata.path.clone(),
            params: metadata.params.clone(),
        }
    }
}
