//! Declarative route records and route sets.

use axum::Router;

use crate::http::server::AppState;
use crate::observability::logging::{LogLevel, RouteLogger};
use crate::routing::handler::RouteHandler;
use crate::routing::method::{HttpMethod, InvalidMethod};
use crate::routing::permissions::RoutePermissions;
use crate::schema::{RouteSchema, SchemaCompileError};

/// A route that could not be registered.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    InvalidMethod(#[from] InvalidMethod),

    #[error("HTTP method [{0}] is bound more than once")]
    DuplicateMethod(HttpMethod),

    #[error(transparent)]
    InvalidSchema(#[from] SchemaCompileError),

    #[error("route [{url}] requires roles but no authorization verifier is configured")]
    MissingVerifier { url: String },

    #[error("route [{url}] uses collection [{collection}] but no resource provider is configured")]
    MissingResourceProvider { url: String, collection: String },

    #[error("route [{url}] has an invalid path: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("route [{url}] binds no HTTP methods")]
    NoMethods { url: String },

    #[error("a resource provider is required but none is configured")]
    StoreRequired,
}

/// Per-route settings applied to every bound method.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Collection opened for each request and lent to the action.
    pub collection: Option<String>,
    pub permissions: RoutePermissions,
    pub enable_cors: bool,
    pub request_schema: RouteSchema,
    pub response_schema: RouteSchema,
    pub log_level: LogLevel,
}

/// A URL, its method bindings and their shared options.
#[derive(Debug, Clone)]
pub struct Route {
    url: String,
    handler: RouteHandler,
    options: RouteOptions,
}

impl Route {
    pub fn new(url: impl Into<String>, handler: RouteHandler) -> Self {
        Self {
            url: url.into(),
            handler,
            options: RouteOptions::default(),
        }
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.options.collection = Some(name.into());
        self
    }

    pub fn permissions(mut self, permissions: RoutePermissions) -> Self {
        self.options.permissions = permissions;
        self
    }

    /// Shorthand for requiring one of `roles` on `method`.
    pub fn require<I, S>(mut self, method: HttpMethod, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.permissions = self.options.permissions.require(method, roles);
        self
    }

    pub fn cors(mut self, enabled: bool) -> Self {
        self.options.enable_cors = enabled;
        self
    }

    pub fn request_schema(mut self, schema: RouteSchema) -> Self {
        self.options.request_schema = schema;
        self
    }

    pub fn response_schema(mut self, schema: RouteSchema) -> Self {
        self.options.response_schema = schema;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.options.log_level = level;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn handler(&self) -> &RouteHandler {
        &self.handler
    }

    pub fn options(&self) -> &RouteOptions {
        &self.options
    }

    /// Bind this route's methods on `router`.
    pub fn register(&self, router: Router, state: &AppState) -> Result<Router, RegistrationError> {
        let router = self
            .handler
            .register_url_methods(&self.url, &self.options, router, state)?;
        RouteLogger::get(&self.url, None).info(format!("Created application route: [{}]", self.url));
        Ok(router)
    }
}

/// The routes of one application, at most one per URL.
#[derive(Debug, Clone, Default)]
pub struct Routes {
    routes: Vec<Route>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `route`, replacing any route already declared for the same URL.
    pub fn add(mut self, route: Route) -> Self {
        match self.routes.iter_mut().find(|r| r.url == route.url) {
            Some(existing) => {
                tracing::warn!(url = %route.url, "Replacing previously declared route");
                *existing = route;
            }
            None => self.routes.push(route),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Register every route, stopping at the first failure.
    pub fn register(&self, router: Router, state: &AppState) -> Result<Router, RegistrationError> {
        self.routes
            .iter()
            .try_fold(router, |router, route| route.register(router, state))
    }
}
