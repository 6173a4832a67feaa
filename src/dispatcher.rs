//! The per-request dispatch pipeline.
//!
//! Every request moves through the same fixed stages: routing, before-hooks,
//! cache check, handling, after-hooks, responding. A failure at any stage
//! short-circuits the rest of the pipeline and enters error recovery, which
//! consults the route-local error hook, then the global one, and finally
//! falls back to a generic structured response. Error hooks that themselves
//! fail are logged and skipped, so recovery always terminates.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures_util::future::BoxFuture;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::cache::HandlerCache;
use crate::context::Context;
use crate::error::DispatchError;
use crate::hook::HookChain;
use crate::path::tokenize;
use crate::protocol::Protocol;
use crate::request::Request;
use crate::response::Response;
use crate::route::RouteTable;
use crate::service::ServiceRegistry;
use crate::websocket::{WsConnection, WsMessage};

/// Header carrying the application-level type tag of a dispatched
/// [`WsMessage`].
pub const WS_TYPE_HEADER: &str = "x-ws-type";

/// The stages of the dispatch pipeline, in order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum Stage {
    /// Tokenizing the path, resolving the route and coercing parameters.
    Routing,
    /// Schema validation and the global and route-local before chains.
    BeforeHooks,
    /// Cache key derivation and lookup.
    CacheCheck,
    /// Running the resolved handler.
    Handling,
    /// The global and route-local after chains.
    AfterHooks,
    /// Producing the final response.
    Responding,
}

impl Stage {
    /// The stage name as it appears in logs and error responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Routing => "routing",
            Stage::BeforeHooks => "before_hooks",
            Stage::CacheCheck => "cache_check",
            Stage::Handling => "handling",
            Stage::AfterHooks => "after_hooks",
            Stage::Responding => "responding",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dispatch failure, as seen by error hooks.
#[derive(Debug)]
pub struct Fault {
    /// What went wrong.
    pub error: DispatchError,
    /// The protocol of the failed request.
    pub protocol: Protocol,
    /// The path of the failed request.
    pub path: String,
    /// The pipeline stage that failed.
    pub stage: Stage,
}

impl Fault {
    /// The generic structured error response, used when no error hook
    /// produces a replacement. Internal error detail stays in the logs.
    pub fn response(&self) -> Response {
        let mut error = json!({
            "kind": self.error.kind(),
            "message": self.error.public_message(),
            "path": self.path,
            "protocol": self.protocol.as_str(),
        });
        if let DispatchError::Validation { errors } = &self.error {
            error["details"] = json!(errors);
        }
        Response::new(json!({ "error": error })).with_status(self.error.status())
    }
}

/// An error hook: maps a [`Fault`] to a replacement [`Response`].
///
/// Returning `Err` declines the fault; recovery moves on to the next hook or
/// the generic response.
pub type ErrorHook = Arc<dyn Fn(Arc<Fault>) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

/// Wraps an async function as an [`ErrorHook`].
pub fn error_hook<F, Fut>(f: F) -> ErrorHook
where
    F: Fn(Arc<Fault>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(move |fault| Box::pin(f(fault)))
}

struct Failure {
    stage: Stage,
    error: DispatchError,
    catch: Option<ErrorHook>,
}

impl Failure {
    fn new(stage: Stage, error: DispatchError, catch: Option<ErrorHook>) -> Self {
        Self { stage, error, catch }
    }
}

/// The dispatch engine: owns the route table, the global hook chains, the
/// handler cache and the service registry, and runs every request through
/// the pipeline.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use trellis::{handler, route, Context, Dispatcher, Protocol, Request, RouteTable};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let routes = RouteTable::new()
///     .at("/ping", route::get(handler(|_: Context| async move { Ok(json!("pong")) })))
///     .unwrap();
///
/// let dispatcher = Dispatcher::new(routes);
/// let response = dispatcher
///     .handle(Request::new(Protocol::Get, "/ping", json!(null)))
///     .await;
/// assert_eq!(response.status(), 200);
/// # });
/// ```
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    before: HookChain<Context, Context>,
    after: HookChain<Response, Response>,
    catch: Option<ErrorHook>,
    cache: HandlerCache,
    services: Arc<ServiceRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over a finished route table, with empty global
    /// chains, no global error hook and an empty cache.
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes: Arc::new(routes),
            before: HookChain::identity(),
            after: HookChain::identity(),
            catch: None,
            cache: HandlerCache::new(),
            services: Arc::new(ServiceRegistry::new()),
        }
    }

    /// Sets the global before chain, run ahead of every route-local one.
    #[must_use]
    pub fn before(mut self, chain: HookChain<Context, Context>) -> Self {
        self.before = chain;
        self
    }

    /// Sets the global after chain, run ahead of every route-local one.
    #[must_use]
    pub fn after(mut self, chain: HookChain<Response, Response>) -> Self {
        self.after = chain;
        self
    }

    /// Sets the global error hook, consulted when a route has none or the
    /// route-local hook declines.
    #[must_use]
    pub fn catch<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Fault>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.catch = Some(error_hook(f));
        self
    }

    /// Sets the service registry handed to handlers through
    /// [`Context::services`].
    #[must_use]
    pub fn services(mut self, services: ServiceRegistry) -> Self {
        self.services = Arc::new(services);
        self
    }

    /// The registered routes.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// The handler cache, for out-of-band invalidation.
    pub fn handler_cache(&self) -> &HandlerCache {
        &self.cache
    }

    /// Dispatches one request through the pipeline. Infallible from the
    /// caller's point of view: failures come back as structured error
    /// responses.
    pub async fn handle(&self, request: Request) -> Response {
        self.dispatch(request, &CancellationToken::new(), None).await
    }

    /// Like [`handle`](Dispatcher::handle), but observes `cancel` between
    /// pipeline stages. A cancelled request gets a structured `cancelled`
    /// response instead of a handler result.
    pub async fn handle_with_cancel(&self, request: Request, cancel: CancellationToken) -> Response {
        self.dispatch(request, &cancel, None).await
    }

    /// Dispatches an inbound WebSocket message through the same pipeline,
    /// keyed under [`Protocol::Ws`]. The message's type tag travels as the
    /// [`WS_TYPE_HEADER`] header and the originating connection is exposed to
    /// the handler through [`Context::connection`].
    pub async fn dispatch_message(
        &self,
        message: WsMessage,
        connection: Arc<WsConnection>,
    ) -> Response {
        let request = Request::builder()
            .protocol(Protocol::Ws)
            .path(message.path)
            .header(WS_TYPE_HEADER, message.msg_type)
            .body(message.data);
        self.dispatch(request, &CancellationToken::new(), Some(connection)).await
    }

    async fn dispatch(
        &self,
        request: Request,
        cancel: &CancellationToken,
        connection: Option<Arc<WsConnection>>,
    ) -> Response {
        let protocol = request.protocol();
        let path = request.path().to_string();

        match self.run(request, cancel, connection).await {
            Ok(response) => response,
            Err(failure) => {
                let fault = Fault {
                    error: failure.error,
                    protocol,
                    path,
                    stage: failure.stage,
                };
                self.recover(fault, failure.catch).await
            }
        }
    }

    async fn run(
        &self,
        request: Request,
        cancel: &CancellationToken,
        connection: Option<Arc<WsConnection>>,
    ) -> Result<Response, Failure> {
        if cancel.is_cancelled() {
            let stage = Stage::Routing;
            return Err(Failure::new(stage, DispatchError::Cancelled { stage }, None));
        }

        let protocol = request.protocol();
        let path = request.path().to_string();
        let segments = tokenize(&path);

        let entry = self
            .routes
            .resolve(&segments)
            .and_then(|entries| entries.get(&protocol))
            .ok_or_else(|| {
                Failure::new(
                    Stage::Routing,
                    DispatchError::RouteNotFound {
                        protocol,
                        path: path.clone(),
                    },
                    None,
                )
            })?;
        let catch = entry.catch.clone();
        tracing::debug!(
            protocol = %protocol,
            path = %path,
            handler = %entry.handler_id,
            "route resolved"
        );

        let params = entry.pattern.match_path(&path).ok_or_else(|| {
            Failure::new(
                Stage::Routing,
                DispatchError::Validation {
                    errors: vec![format!(
                        "path does not satisfy pattern `{}`",
                        entry.pattern.raw()
                    )],
                },
                catch.clone(),
            )
        })?;

        let mut ctx = Context::new(request, params, self.services.clone(), connection);

        if let Some(schema) = &entry.schema {
            match schema.validate(ctx.request().body()) {
                Ok(body) => ctx.request_mut().set_body(body),
                Err(errors) => {
                    return Err(Failure::new(
                        Stage::BeforeHooks,
                        DispatchError::Validation { errors },
                        catch,
                    ));
                }
            }
        }

        let ctx = self.before.run(ctx).await.map_err(|error| {
            Failure::new(Stage::BeforeHooks, DispatchError::Hook(error), catch.clone())
        })?;
        let ctx = entry.before.run(ctx).await.map_err(|error| {
            Failure::new(Stage::BeforeHooks, DispatchError::Hook(error), catch.clone())
        })?;

        // A failing key derivation never fails the request; the handler just
        // runs uncached.
        let cache_key = match &entry.cache {
            Some(config) if protocol.is_cacheable() => match config.derive_key(ctx.request()) {
                Ok(key) => Some(key),
                Err(error) => {
                    let error = DispatchError::CacheUnavailable(error.to_string());
                    tracing::warn!(
                        handler = %entry.handler_id,
                        error = %error,
                        "skipping cache for this request"
                    );
                    None
                }
            },
            _ => None,
        };
        let cached = cache_key
            .as_deref()
            .and_then(|key| self.cache.get_entry(&entry.handler_id, key));

        let value = match cached {
            Some(value) => {
                tracing::debug!(handler = %entry.handler_id, "cache hit");
                value
            }
            None => {
                if cancel.is_cancelled() {
                    let stage = Stage::Handling;
                    return Err(Failure::new(stage, DispatchError::Cancelled { stage }, catch));
                }

                let value = entry.handler.handle(ctx).await.map_err(|error| {
                    Failure::new(Stage::Handling, DispatchError::Handler(error), catch.clone())
                })?;

                if cancel.is_cancelled() {
                    let stage = Stage::AfterHooks;
                    return Err(Failure::new(stage, DispatchError::Cancelled { stage }, catch));
                }

                if let (Some(key), Some(config)) = (&cache_key, &entry.cache) {
                    self.cache
                        .set_entry(&entry.handler_id, key.clone(), value.clone(), config.ttl_value());
                }
                value
            }
        };

        let response = Response::new(value);
        let response = self.after.run(response).await.map_err(|error| {
            Failure::new(Stage::AfterHooks, DispatchError::Hook(error), catch.clone())
        })?;
        let response = entry.after.run(response).await.map_err(|error| {
            Failure::new(Stage::AfterHooks, DispatchError::Hook(error), catch)
        })?;

        tracing::debug!(
            protocol = %protocol,
            path = %path,
            status = response.status(),
            "request completed"
        );
        Ok(response)
    }

    /// Routes a fault through the nearest error hook. The route-local hook
    /// goes first, then the global one; a hook that errors is skipped. When
    /// every hook declines, the generic structured response is returned.
    async fn recover(&self, fault: Fault, route_catch: Option<ErrorHook>) -> Response {
        match &fault.error {
            DispatchError::RouteNotFound { .. }
            | DispatchError::Validation { .. }
            | DispatchError::Cancelled { .. } => {
                tracing::debug!(
                    kind = fault.error.kind(),
                    protocol = %fault.protocol,
                    path = %fault.path,
                    stage = %fault.stage,
                    "request rejected"
                );
            }
            error => {
                tracing::error!(
                    kind = error.kind(),
                    protocol = %fault.protocol,
                    path = %fault.path,
                    stage = %fault.stage,
                    error = ?error,
                    "request failed"
                );
            }
        }

        let fault = Arc::new(fault);
        for hook in route_catch.iter().chain(self.catch.iter()) {
            match hook(fault.clone()).await {
                Ok(response) => return response,
                Err(error) => {
                    tracing::error!(error = %error, "error hook failed; trying next");
                }
            }
        }
        fault.response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::anyhow;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::cache::CacheConfig;
    use crate::handler::handler;
    use crate::hook::HookChainBuilder;
    use crate::route;

    fn counting_handler(hits: Arc<AtomicUsize>) -> crate::handler::FnHandler {
        handler(move |ctx: Context| {
            hits.fetch_add(1, Ordering::SeqCst);
            async move { Ok(ctx.request().body().clone()) }
        })
    }

    #[tokio::test]
    async fn end_to_end_post() {
        let routes = RouteTable::new()
            .at(
                "/rpc/createUser",
                route::post(handler(|ctx: Context| async move {
                    let name = ctx.request().body()["name"].clone();
                    Ok(json!({ "created": true, "name": name }))
                })),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let response = dispatcher
            .handle(Request::new(
                Protocol::Post,
                "/rpc/createUser",
                json!({"name": "Ada"}),
            ))
            .await;

        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), &json!({"created": true, "name": "Ada"}));
    }

    #[tokio::test]
    async fn unknown_route_gets_structured_404() {
        let dispatcher = Dispatcher::new(RouteTable::new());
        let response = dispatcher
            .handle(Request::new(Protocol::Get, "/nowhere", json!(null)))
            .await;

        assert_eq!(response.status(), 404);
        assert_eq!(response.body()["error"]["kind"], "route_not_found");
        assert_eq!(response.body()["error"]["path"], "/nowhere");
        assert_eq!(response.body()["error"]["protocol"], "GET");
    }

    #[tokio::test]
    async fn wrong_protocol_on_known_path_is_404() {
        let routes = RouteTable::new()
            .at("/users", route::get(counting_handler(Default::default())))
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let response = dispatcher
            .handle(Request::new(Protocol::Delete, "/users", json!(null)))
            .await;
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn typed_params_reach_the_handler() {
        let routes = RouteTable::new()
            .at(
                "/users/:id$/since/:day(",
                route::get(handler(|ctx: Context| async move {
                    let id = ctx.param("id").and_then(|v| v.as_int()).unwrap();
                    let day = ctx.param("day").and_then(|v| v.as_date()).unwrap();
                    Ok(json!({ "id": id, "day": day.to_string() }))
                })),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let response = dispatcher
            .handle(Request::new(
                Protocol::Get,
                "/users/42/since/2024-05-01",
                json!(null),
            ))
            .await;

        assert_eq!(response.body(), &json!({"id": 42, "day": "2024-05-01"}));
    }

    #[tokio::test]
    async fn coercion_failure_is_a_validation_error() {
        let routes = RouteTable::new()
            .at("/users/:id$", route::get(counting_handler(Default::default())))
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let response = dispatcher
            .handle(Request::new(Protocol::Get, "/users/not-a-number", json!(null)))
            .await;

        assert_eq!(response.status(), 400);
        assert_eq!(response.body()["error"]["kind"], "validation_failed");
    }

    #[tokio::test]
    async fn omitted_trailing_optional_is_absent() {
        let routes = RouteTable::new()
            .at(
                "/flags/:?enabled^",
                route::get(handler(|ctx: Context| async move {
                    Ok(match ctx.param("enabled") {
                        Some(value) if !value.is_absent() => json!(value.as_bool()),
                        _ => json!("absent"),
                    })
                })),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let with = dispatcher
            .handle(Request::new(Protocol::Get, "/flags/true", json!(null)))
            .await;
        assert_eq!(with.body(), &json!(true));

        let without = dispatcher
            .handle(Request::new(Protocol::Get, "/flags", json!(null)))
            .await;
        assert_eq!(without.body(), &json!("absent"));
    }

    #[tokio::test]
    async fn schema_rejection_is_a_validation_error() {
        let routes = RouteTable::new()
            .at(
                "/rpc/createUser",
                route::post(counting_handler(Default::default())).schema(|value: &Value| {
                    if value.get("name").is_some() {
                        Ok(value.clone())
                    } else {
                        Err(vec!["name is required".to_string()])
                    }
                }),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let response = dispatcher
            .handle(Request::new(Protocol::Post, "/rpc/createUser", json!({})))
            .await;

        assert_eq!(response.status(), 400);
        assert_eq!(response.body()["error"]["details"], json!(["name is required"]));
    }

    #[tokio::test]
    async fn cached_result_skips_the_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let routes = RouteTable::new()
            .at(
                "/expensive",
                route::post(counting_handler(hits.clone())).cache(CacheConfig::new()),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let body = json!({"q": 1});
        let first = dispatcher
            .handle(Request::new(Protocol::Post, "/expensive", body.clone()))
            .await;
        let second = dispatcher
            .handle(Request::new(Protocol::Post, "/expensive", body.clone()))
            .await;

        assert_eq!(first.body(), second.body());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A structurally different body is a different key.
        dispatcher
            .handle(Request::new(Protocol::Post, "/expensive", json!({"q": 2})))
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_expiry_reinvokes_the_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let routes = RouteTable::new()
            .at(
                "/expensive",
                route::post(counting_handler(hits.clone()))
                    .cache(CacheConfig::new().ttl(Duration::from_millis(30))),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let body = json!({"q": 1});
        dispatcher
            .handle(Request::new(Protocol::Post, "/expensive", body.clone()))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        dispatcher
            .handle(Request::new(Protocol::Post, "/expensive", body))
            .await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ws_dispatches_are_never_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let routes = RouteTable::new()
            .at(
                "/feed",
                route::ws(counting_handler(hits.clone())).cache(CacheConfig::new()),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes);
        let connection = Arc::new(WsConnection::new());

        for _ in 0..2 {
            dispatcher
                .dispatch_message(
                    WsMessage::new("query", "/feed", json!({"q": 1})),
                    connection.clone(),
                )
                .await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn global_then_route_hooks_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let push = |log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str| {
            let log = log.clone();
            move || log.lock().push(name)
        };

        let (g_before, r_before, g_after, r_after, in_handler) = (
            push(&log, "global before"),
            push(&log, "route before"),
            push(&log, "global after"),
            push(&log, "route after"),
            push(&log, "handler"),
        );

        let routes = RouteTable::new()
            .at(
                "/users",
                route::get(handler(move |_: Context| {
                    in_handler();
                    async move { Ok(json!(null)) }
                }))
                .before(
                    HookChainBuilder::new()
                        .add("route-before", move |ctx: Context| {
                            r_before();
                            async move { Ok(ctx) }
                        })
                        .build(),
                )
                .after(
                    HookChainBuilder::new()
                        .add("route-after", move |response: Response| {
                            r_after();
                            async move { Ok(response) }
                        })
                        .build(),
                ),
            )
            .unwrap();

        let dispatcher = Dispatcher::new(routes)
            .before(
                HookChainBuilder::new()
                    .add("global-before", move |ctx: Context| {
                        g_before();
                        async move { Ok(ctx) }
                    })
                    .build(),
            )
            .after(
                HookChainBuilder::new()
                    .add("global-after", move |response: Response| {
                        g_after();
                        async move { Ok(response) }
                    })
                    .build(),
            );

        dispatcher
            .handle(Request::new(Protocol::Get, "/users", json!(null)))
            .await;

        assert_eq!(
            *log.lock(),
            vec![
                "global before",
                "route before",
                "handler",
                "global after",
                "route after",
            ]
        );
    }

    #[tokio::test]
    async fn before_hook_can_rewrite_the_body() {
        let routes = RouteTable::new()
            .at(
                "/echo",
                route::post(handler(|ctx: Context| async move {
                    Ok(ctx.request().body().clone())
                }))
                .before(
                    HookChainBuilder::new()
                        .add("stamp", |mut ctx: Context| async move {
                            let mut body = ctx.request_mut().take_body();
                            body["stamped"] = json!(true);
                            ctx.request_mut().set_body(body);
                            Ok(ctx)
                        })
                        .build(),
                ),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let response = dispatcher
            .handle(Request::new(Protocol::Post, "/echo", json!({"a": 1})))
            .await;
        assert_eq!(response.body(), &json!({"a": 1, "stamped": true}));
    }

    #[tokio::test]
    async fn route_local_catch_wins_over_global() {
        let routes = RouteTable::new()
            .at(
                "/broken",
                route::get(handler(|_: Context| async move {
                    Err::<Value, _>(anyhow!("boom"))
                }))
                .catch(|fault| async move {
                    Ok(Response::new(json!({"recovered_by": "route", "stage": fault.stage.as_str()}))
                        .with_status(503))
                }),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes)
            .catch(|_| async move { Ok(Response::new(json!({"recovered_by": "global"}))) });

        let response = dispatcher
            .handle(Request::new(Protocol::Get, "/broken", json!(null)))
            .await;

        assert_eq!(response.status(), 503);
        assert_eq!(
            response.body(),
            &json!({"recovered_by": "route", "stage": "handling"})
        );
    }

    #[tokio::test]
    async fn global_catch_handles_routes_without_their_own() {
        let routes = RouteTable::new()
            .at(
                "/broken",
                route::get(handler(|_: Context| async move {
                    Err::<Value, _>(anyhow!("boom"))
                })),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes).catch(|fault| async move {
            Ok(Response::new(json!({"recovered_by": "global", "kind": fault.error.kind()})))
        });

        let response = dispatcher
            .handle(Request::new(Protocol::Get, "/broken", json!(null)))
            .await;
        assert_eq!(
            response.body(),
            &json!({"recovered_by": "global", "kind": "handler_failure"})
        );
    }

    #[tokio::test]
    async fn failing_error_hooks_fall_through_to_the_generic_response() {
        let routes = RouteTable::new()
            .at(
                "/broken",
                route::get(handler(|_: Context| async move {
                    Err::<Value, _>(anyhow!("boom"))
                }))
                .catch(|_| async move { Err(anyhow!("route hook also broken")) }),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes)
            .catch(|_| async move { Err(anyhow!("global hook also broken")) });

        let response = dispatcher
            .handle(Request::new(Protocol::Get, "/broken", json!(null)))
            .await;

        assert_eq!(response.status(), 500);
        assert_eq!(response.body()["error"]["kind"], "handler_failure");
        // Internal detail never leaks into the generic response.
        assert_eq!(response.body()["error"]["message"], "internal error");
    }

    #[tokio::test]
    async fn hook_failure_is_recoverable_too() {
        let routes = RouteTable::new()
            .at(
                "/users",
                route::get(counting_handler(Default::default())).before(
                    HookChainBuilder::new()
                        .add("reject", |_: Context| async move {
                            Err::<Context, _>(anyhow!("nope"))
                        })
                        .build(),
                ),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let response = dispatcher
            .handle(Request::new(Protocol::Get, "/users", json!(null)))
            .await;
        assert_eq!(response.status(), 500);
        assert_eq!(response.body()["error"]["kind"], "hook_failure");
    }

    #[tokio::test]
    async fn cancelled_request_never_reaches_the_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let routes = RouteTable::new()
            .at("/slow", route::get(counting_handler(hits.clone())))
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let response = dispatcher
            .handle_with_cancel(Request::new(Protocol::Get, "/slow", json!(null)), cancel)
            .await;

        assert_eq!(response.status(), 499);
        assert_eq!(response.body()["error"]["kind"], "cancelled");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ws_handler_sees_type_tag_and_connection() {
        let routes = RouteTable::new()
            .at(
                "/feed",
                route::ws(handler(|ctx: Context| async move {
                    let connection = ctx.connection().expect("ws dispatch carries a connection");
                    connection.send(WsMessage::new("event", "/feed", json!("pushed")))?;
                    Ok(json!({
                        "type": ctx.request().header(WS_TYPE_HEADER),
                        "data": ctx.request().body().clone(),
                    }))
                })),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let connection = Arc::new(WsConnection::new());
        let response = dispatcher
            .dispatch_message(
                WsMessage::new("subscribe", "/feed", json!({"topic": "news"})),
                connection.clone(),
            )
            .await;

        assert_eq!(
            response.body(),
            &json!({"type": "subscribe", "data": {"topic": "news"}})
        );

        // The push queued while pending flushes once the transport attaches.
        let (tx, mut rx) = unbounded_channel();
        connection.open(tx).unwrap();
        assert_eq!(rx.recv().await.unwrap().data, json!("pushed"));
    }

    #[tokio::test]
    async fn static_route_wins_over_dynamic_end_to_end() {
        let routes = RouteTable::new()
            .at(
                "/users/:id",
                route::get(handler(|_: Context| async move { Ok(json!("dynamic")) })),
            )
            .unwrap()
            .at(
                "/users/me",
                route::get(handler(|_: Context| async move { Ok(json!("static")) })),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(routes);

        let me = dispatcher
            .handle(Request::new(Protocol::Get, "/users/me", json!(null)))
            .await;
        assert_eq!(me.body(), &json!("static"));

        let other = dispatcher
            .handle(Request::new(Protocol::Get, "/users/7", json!(null)))
            .await;
        assert_eq!(other.body(), &json!("dynamic"));
    }
}
