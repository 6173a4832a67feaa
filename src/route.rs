//! Route registration DSL and the route table.
//!
//! Routes are registered at configuration time, before traffic begins; the
//! finished [`RouteTable`] is consumed by the [`Dispatcher`](crate::Dispatcher)
//! and immutable from then on.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use fnv::FnvHashMap;

use crate::cache::CacheConfig;
use crate::context::Context;
use crate::dispatcher::{error_hook, ErrorHook, Fault};
use crate::error::RouteError;
use crate::handler::{ClientDescriptor, Handler, RouteMetadata};
use crate::hook::HookChain;
use crate::pattern::{Pattern, Segment};
use crate::protocol::Protocol;
use crate::response::Response;
use crate::schema::Schema;
use crate::tree::Tree;

/// One `(protocol, path)` registration, resolved by the dispatcher.
#[derive(Clone)]
pub(crate) struct RouteEntry {
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) pattern: Pattern,
    pub(crate) before: HookChain<Context, Context>,
    pub(crate) after: HookChain<Response, Response>,
    pub(crate) catch: Option<ErrorHook>,
    pub(crate) cache: Option<CacheConfig>,
    pub(crate) schema: Option<Arc<dyn Schema>>,
    pub(crate) handler_id: String,
}

/// The handlers and route-local configuration registered at one path.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use trellis::{handler, route, Context};
///
/// let route = route::get(handler(|_: Context| async move { Ok(json!("list")) }))
///     .post(handler(|_: Context| async move { Ok(json!("create")) }));
/// # let _ = route;
/// ```
pub struct Route {
    handlers: FnvHashMap<Protocol, Arc<dyn Handler>>,
    before: HookChain<Context, Context>,
    after: HookChain<Response, Response>,
    catch: Option<ErrorHook>,
    cache: Option<CacheConfig>,
    schema: Option<Arc<dyn Schema>>,
}

impl Default for Route {
    fn default() -> Self {
        Self::new()
    }
}

impl Route {
    /// Creates a route with no handlers registered.
    pub fn new() -> Self {
        Self {
            handlers: FnvHashMap::default(),
            before: HookChain::identity(),
            after: HookChain::identity(),
            catch: None,
            cache: None,
            schema: None,
        }
    }

    /// Sets the handler for the given protocol key.
    #[must_use]
    pub fn on(mut self, protocol: Protocol, handler: impl Handler) -> Self {
        self.handlers.insert(protocol, Arc::new(handler));
        self
    }

    /// Sets the handler for `GET`.
    #[must_use]
    pub fn get(self, handler: impl Handler) -> Self {
        self.on(Protocol::Get, handler)
    }

    /// Sets the handler for `POST`.
    #[must_use]
    pub fn post(self, handler: impl Handler) -> Self {
        self.on(Protocol::Post, handler)
    }

    /// Sets the handler for `PUT`.
    #[must_use]
    pub fn put(self, handler: impl Handler) -> Self {
        self.on(Protocol::Put, handler)
    }

    /// Sets the handler for `DELETE`.
    #[must_use]
    pub fn delete(self, handler: impl Handler) -> Self {
        self.on(Protocol::Delete, handler)
    }

    /// Sets the handler for `HEAD`.
    #[must_use]
    pub fn head(self, handler: impl Handler) -> Self {
        self.on(Protocol::Head, handler)
    }

    /// Sets the handler for `OPTIONS`.
    #[must_use]
    pub fn options(self, handler: impl Handler) -> Self {
        self.on(Protocol::Options, handler)
    }

    /// Sets the handler for `PATCH`.
    #[must_use]
    pub fn patch(self, handler: impl Handler) -> Self {
        self.on(Protocol::Patch, handler)
    }

    /// Sets the handler for the WebSocket channel.
    #[must_use]
    pub fn ws(self, handler: impl Handler) -> Self {
        self.on(Protocol::Ws, handler)
    }

    /// Sets the route-local before-hook chain, run after the global one.
    #[must_use]
    pub fn before(mut self, chain: HookChain<Context, Context>) -> Self {
        self.before = chain;
        self
    }

    /// Sets the route-local after-hook chain, run after the global one.
    #[must_use]
    pub fn after(mut self, chain: HookChain<Response, Response>) -> Self {
        self.after = chain;
        self
    }

    /// Sets the route-local error hook, consulted before the global one.
    #[must_use]
    pub fn catch<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Fault>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.catch = Some(error_hook(f));
        self
    }

    /// Enables result caching for this route's handlers.
    #[must_use]
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(config);
        self
    }

    /// Sets the body schema, validated before any hooks run.
    #[must_use]
    pub fn schema(mut self, schema: impl Schema) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }
}

/// A helper function, similar to `Route::new().on(protocol, handler)`.
pub fn on(protocol: Protocol, handler: impl Handler) -> Route {
    Route::new().on(protocol, handler)
}

/// A helper function, similar to `Route::new().get(handler)`.
pub fn get(handler: impl Handler) -> Route {
    Route::new().get(handler)
}

/// A helper function, similar to `Route::new().post(handler)`.
pub fn post(handler: impl Handler) -> Route {
    Route::new().post(handler)
}

/// A helper function, similar to `Route::new().put(handler)`.
pub fn put(handler: impl Handler) -> Route {
    Route::new().put(handler)
}

/// A helper function, similar to `Route::new().delete(handler)`.
pub fn delete(handler: impl Handler) -> Route {
    Route::new().delete(handler)
}

/// A helper function, similar to `Route::new().head(handler)`.
pub fn head(handler: impl Handler) -> Route {
    Route::new().head(handler)
}

/// A helper function, similar to `Route::new().options(handler)`.
pub fn options(handler: impl Handler) -> Route {
    Route::new().options(handler)
}

/// A helper function, similar to `Route::new().patch(handler)`.
pub fn patch(handler: impl Handler) -> Route {
    Route::new().patch(handler)
}

/// A helper function, similar to `Route::new().ws(handler)`.
pub fn ws(handler: impl Handler) -> Route {
    Route::new().ws(handler)
}

/// The registered routes of an application.
pub struct RouteTable {
    tree: Tree<RouteEntry>,
    manifest: Vec<ClientDescriptor>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable").finish_non_exhaustive()
    }
}

impl RouteTable {
    /// Creates an empty route table.
    pub fn new() -> Self {
        Self {
            tree: Tree::default(),
            manifest: Vec::new(),
        }
    }

    /// Registers a [`Route`] at the given pattern.
    ///
    /// The pattern is compiled once, here; its literal-vs-parameter shape
    /// places the route in the tree while the typed parameter descriptors
    /// stay with each handler's registration. Fails on an invalid pattern or
    /// an ambiguous dynamic segment.
    pub fn at(mut self, pattern: &str, route: Route) -> Result<Self, RouteError> {
        let compiled = Pattern::compile(pattern).map_err(|source| RouteError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;

        // A trailing run of optional parameters may be omitted from the
        // request path, so the route also registers at each prefix depth.
        let full = compiled.segments().len();
        let mut min_depth = full;
        while min_depth > 0 {
            match &compiled.segments()[min_depth - 1] {
                Segment::Param(spec) if spec.optional => min_depth -= 1,
                _ => break,
            }
        }

        for (protocol, handler) in route.handlers {
            let handler_id = format!("{} {}", protocol, compiled.route_string());
            let metadata = RouteMetadata::from_pattern(protocol, &compiled);
            self.manifest.push(handler.describe(&metadata));

            let entry = RouteEntry {
                handler,
                pattern: compiled.clone(),
                before: route.before.clone(),
                after: route.after.clone(),
                catch: route.catch.clone(),
                cache: route.cache.clone(),
                schema: route.schema.clone(),
                handler_id,
            };
            for depth in min_depth..full {
                self.tree.insert_upto(&compiled, depth, protocol, entry.clone())?;
            }
            self.tree.insert(&compiled, protocol, entry)?;
        }

        Ok(self)
    }

    pub(crate) fn resolve(&self, segments: &[&str]) -> Option<&FnvHashMap<Protocol, RouteEntry>> {
        self.tree.resolve(segments)
    }

    /// Descriptors of every registered handler, for caller-side stub
    /// generation.
    pub fn client_manifest(&self) -> &[ClientDescriptor] {
        &self.manifest
    }
}
