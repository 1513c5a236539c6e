//! Method bindings for one URL.
//!
//! # Responsibilities
//! - Hold exactly one action per HTTP method
//! - Validate method names against the fixed method set at construction
//! - Build one request pipeline per bound method and bind it on the router
//!
//! # Design Decisions
//! - Bindings are an explicit map; rebinding a method replaces it only
//!   through another explicit `bind`
//! - Everything that can be checked statically (schemas, services the route
//!   depends on) is checked here, before the first request

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use axum::extract::Request;
use axum::routing::MethodRouter;
use axum::Router;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::RouteError;
use crate::http::cors::cors_layer;
use crate::http::request::{Payload, RequestContext};
use crate::http::response::Reply;
use crate::http::server::AppState;
use crate::observability::logging::RouteLogger;
use crate::routing::method::HttpMethod;
use crate::routing::pipeline::{CompiledRoute, RequestPipeline};
use crate::routing::route::{RegistrationError, RouteOptions};
use crate::store::Resource;

/// Future returned by a boxed action.
pub type ActionFuture = BoxFuture<'static, Result<Reply, RouteError>>;

/// A user-supplied action: `(request, payload, resource) → reply`.
pub type HandlerMethod =
    Arc<dyn Fn(RequestContext, Payload, Option<Resource>) -> ActionFuture + Send + Sync>;

/// Box an async function as a [`HandlerMethod`].
///
/// The function may return anything convertible into a [`Reply`]: a finished
/// `Response` or a bare `serde_json::Value`.
pub fn action<F, Fut, R>(f: F) -> HandlerMethod
where
    F: Fn(RequestContext, Payload, Option<Resource>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, RouteError>> + Send + 'static,
    R: Into<Reply> + 'static,
{
    Arc::new(
        move |ctx: RequestContext, payload: Payload, resource: Option<Resource>| -> ActionFuture {
            let fut = f(ctx, payload, resource);
            async move { fut.await.map(Into::into) }.boxed()
        },
    )
}

/// The set of method → action bindings for a URL.
#[derive(Clone, Default)]
pub struct RouteHandler {
    methods: BTreeMap<HttpMethod, HandlerMethod>,
}

impl RouteHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `action` to `method`, replacing any previous binding.
    pub fn bind(mut self, method: HttpMethod, action: HandlerMethod) -> Self {
        self.methods.insert(method, action);
        self
    }

    pub fn get(self, action: HandlerMethod) -> Self {
        self.bind(HttpMethod::Get, action)
    }

    pub fn post(self, action: HandlerMethod) -> Self {
        self.bind(HttpMethod::Post, action)
    }

    pub fn put(self, action: HandlerMethod) -> Self {
        self.bind(HttpMethod::Put, action)
    }

    pub fn patch(self, action: HandlerMethod) -> Self {
        self.bind(HttpMethod::Patch, action)
    }

    pub fn delete(self, action: HandlerMethod) -> Self {
        self.bind(HttpMethod::Delete, action)
    }

    /// Build from method names, normalizing case.
    ///
    /// Unknown methods are rejected, and so is a method named twice
    /// (`"get"` and `"GET"` included); use [`bind`](Self::bind) to replace.
    pub fn from_names<I, K>(bindings: I) -> Result<Self, RegistrationError>
    where
        I: IntoIterator<Item = (K, HandlerMethod)>,
        K: AsRef<str>,
    {
        bindings
            .into_iter()
            .try_fold(Self::new(), |handler, (name, action)| {
                let method: HttpMethod = name.as_ref().parse()?;
                if handler.methods.contains_key(&method) {
                    return Err(RegistrationError::DuplicateMethod(method));
                }
                Ok(handler.bind(method, action))
            })
    }

    /// Bound methods in a stable order.
    pub fn methods(&self) -> Vec<HttpMethod> {
        self.methods.keys().copied().collect()
    }

    pub fn action(&self, method: HttpMethod) -> Option<&HandlerMethod> {
        self.methods.get(&method)
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Bind every method of this handler under `url` on `router`.
    pub fn register_url_methods(
        &self,
        url: &str,
        options: &RouteOptions,
        router: Router,
        state: &AppState,
    ) -> Result<Router, RegistrationError> {
        validate_url(url)?;
        if self.is_empty() {
            return Err(RegistrationError::NoMethods {
                url: url.to_string(),
            });
        }

        let compiled = Arc::new(CompiledRoute::new(url, options, state)?);
        let mut method_router = MethodRouter::new();

        for (method, action) in &self.methods {
            let logger = RouteLogger::configure(url, Some(*method), options.log_level);
            let pipeline = Arc::new(RequestPipeline::new(
                url,
                *method,
                action.clone(),
                compiled.clone(),
                logger.clone(),
            ));

            method_router = method_router.on(method.filter(), move |request: Request| {
                let pipeline = pipeline.clone();
                async move { pipeline.handle(request).await }
            });
            logger.debug("Action bound to HTTP method");
        }

        let logger = RouteLogger::configure(url, None, options.log_level);
        if options.enable_cors {
            let origins = state.config.server.effective_cors_origins();
            method_router = method_router.layer(cors_layer(&origins, &self.methods()));
            logger.info(format!("* CORS enabled for route: [{url}] *"));
        } else {
            logger.info(format!("* CORS disabled for route: [{url}] *"));
        }

        let protected = options.permissions.protected_methods();
        if protected.is_empty() {
            logger.info(format!("* JWT validation disabled for route: [{url}] *"));
        } else {
            logger.info(format!("* JWT validation enabled on methods: {protected:?} *"));
            logger.debug(format!("JWT permissions: {:?}", options.permissions));
        }

        // The matcher reports conflicts with routes already on `router` by panicking.
        panic::catch_unwind(AssertUnwindSafe(|| router.route(url, method_router))).map_err(
            |panic| RegistrationError::InvalidUrl {
                url: url.to_string(),
                reason: conflict_reason(panic.as_ref()),
            },
        )
    }
}

/// Check the path syntax the router accepts: a leading `/` and captures that
/// span a whole segment, `{name}` or a trailing `{*name}`.
fn validate_url(url: &str) -> Result<(), RegistrationError> {
    let invalid = |reason: &str| RegistrationError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let Some(rest) = url.strip_prefix('/') else {
        return Err(invalid("must start with '/'"));
    };

    let segments: Vec<&str> = rest.split('/').collect();
    let mut captures = HashSet::new();
    for (i, segment) in segments.iter().enumerate() {
        if segment.starts_with(':') {
            return Err(invalid("captures use '{name}', not ':name'"));
        }
        if !segment.contains(['{', '}']) {
            continue;
        }
        let name = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| invalid("captures must span a whole segment"))?;
        let name = match name.strip_prefix('*') {
            Some(_) if i + 1 != segments.len() => {
                return Err(invalid("a catch-all capture must be the last segment"))
            }
            Some(name) => name,
            None => name,
        };
        if name.is_empty() || name.contains(['{', '}', '*']) {
            return Err(invalid("capture names must be non-empty identifiers"));
        }
        if !captures.insert(name) {
            return Err(invalid("capture names must be unique"));
        }
    }
    Ok(())
}

fn conflict_reason(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "conflicts with an existing route".to_string())
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandler")
            .field("methods", &self.methods())
            .finish()
    }
}
