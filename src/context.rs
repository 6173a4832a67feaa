use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::pattern::{ParamMap, ParamValue};
use crate::request::Request;
use crate::service::ServiceRegistry;
use crate::websocket::WsConnection;

/// A type-keyed map for data that hooks attach to a request in flight.
#[derive(Default)]
pub struct Extensions(HashMap<TypeId, Box<dyn Any + Send + Sync>>);

impl Extensions {
    /// Inserts a value, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.0.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a reference to the value of type `T`, if present.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.0
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    /// Removes and returns the value of type `T`, if present.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.0
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast().ok())
            .map(|boxed| *boxed)
    }
}

/// Everything a handler needs for one request: the (hook-enriched) request,
/// the coerced route parameters, the service registry, and, for WebSocket
/// dispatches, the originating client connection.
///
/// Before-hooks receive and return the context, so they can rewrite the
/// request body or attach typed data through [`Extensions`].
pub struct Context {
    request: Request,
    params: ParamMap,
    services: Arc<ServiceRegistry>,
    connection: Option<Arc<WsConnection>>,
    extensions: Extensions,
}

impl Context {
    pub(crate) fn new(
        request: Request,
        params: ParamMap,
        services: Arc<ServiceRegistry>,
        connection: Option<Arc<WsConnection>>,
    ) -> Self {
        Self {
            request,
            params,
            services,
            connection,
            extensions: Extensions::default(),
        }
    }

    /// Returns a reference to the request.
    #[inline]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns a mutable reference to the request.
    #[inline]
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// Returns the coerced route parameters.
    #[inline]
    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    /// Returns one route parameter by name.
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Returns the service registry.
    #[inline]
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Looks up a named service, downcast to `T`.
    pub fn get_service<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.services.get_service(name)
    }

    /// The client connection this request arrived on, for WebSocket
    /// dispatches.
    pub fn connection(&self) -> Option<&Arc<WsConnection>> {
        self.connection.as_ref()
    }

    /// Returns a reference to the hook-attached extensions.
    #[inline]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Returns a mutable reference to the hook-attached extensions.
    #[inline]
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}
