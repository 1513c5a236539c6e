//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Register every declared route on an Axum router
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Answer unmatched URLs with the JSON error shape
//! - Serve on a listener until shutdown is signalled

use std::sync::Arc;
use std::time::Duration;

use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::routing::route::{RegistrationError, Routes};
use crate::security::AuthorizationVerifier;
use crate::store::ResourceProvider;

/// Process-wide services and settings available to route registration.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub verifier: Option<Arc<dyn AuthorizationVerifier>>,
    pub resources: Option<Arc<dyn ResourceProvider>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            verifier: None,
            resources: None,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn AuthorizationVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn debug_mode(&self) -> bool {
        self.config.server.debug_mode
    }
}

/// The dispatcher's HTTP application.
pub struct Application {
    router: Router,
    state: AppState,
}

impl Application {
    /// Register `routes` and build the middleware stack.
    pub fn new(routes: &Routes, state: AppState) -> Result<Self, RegistrationError> {
        if state.config.store.required && state.resources.is_none() {
            return Err(RegistrationError::StoreRequired);
        }

        let router = routes.register(Router::new(), &state)?;
        let router = Self::build_router(router, &state.config);
        Ok(Self { router, state })
    }

    /// Wrap the route table with the fallback and shared layers.
    #[allow(deprecated)]
    fn build_router(router: Router, config: &AppConfig) -> Router {
        router.fallback(not_found).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(config.server.max_body_size))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.server.request_timeout_secs,
                ))),
        )
    }

    /// A handle to the finished router, e.g. for in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until a value arrives on `shutdown`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            debug_mode = self.state.debug_mode(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": format!("No route for URL [{}]", uri.path()) })),
    )
        .into_response()
}
