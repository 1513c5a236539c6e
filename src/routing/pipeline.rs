//! Per-method request pipeline.
//!
//! # Responsibilities
//! - Run every request for one (url, method) through the fixed step order:
//!   parse, authorize, request schema, open resource, action, coerce,
//!   response schema, deliver
//! - Hold the scoped resource handle for exactly the duration of the action
//! - Funnel every failure, panics included, through one translator
//!
//! # Design Decisions
//! - Built once per bound method at registration and shared across requests;
//!   the request context is built fresh per call
//! - The translator enriches errors with headers, payload and trace only in
//!   debug mode, then hands the error to `IntoResponse`

use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, Request};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::RequestPartsExt;
use futures_util::FutureExt;
use serde_json::{json, Value};
use tracing::{info_span, Instrument};

use crate::error::RouteError;
use crate::http::request::{Payload, RequestContext, RequestDataParser};
use crate::http::response::{self, into_delivery};
use crate::http::server::AppState;
use crate::observability::logging::{LogLevel, RouteLogger};
use crate::routing::handler::HandlerMethod;
use crate::routing::method::HttpMethod;
use crate::routing::permissions::RoutePermissions;
use crate::routing::route::{RegistrationError, RouteOptions};
use crate::schema::{SchemaOrigin, SchemaValidator};
use crate::security::AuthorizationVerifier;
use crate::store::{ResourceHandle, ResourceProvider};

/// Route-wide settings shared by the pipelines of every bound method.
pub struct CompiledRoute {
    collection: Option<String>,
    permissions: RoutePermissions,
    request_schema: SchemaValidator,
    response_schema: SchemaValidator,
    parser: RequestDataParser,
    debug_mode: bool,
    max_body_size: usize,
    verifier: Option<Arc<dyn AuthorizationVerifier>>,
    resources: Option<Arc<dyn ResourceProvider>>,
}

impl CompiledRoute {
    /// Compile schemas and resolve the services `options` depend on.
    pub fn new(url: &str, options: &RouteOptions, state: &AppState) -> Result<Self, RegistrationError> {
        if !options.permissions.is_empty() && state.verifier.is_none() {
            return Err(RegistrationError::MissingVerifier {
                url: url.to_string(),
            });
        }
        if let (Some(collection), None) = (&options.collection, &state.resources) {
            return Err(RegistrationError::MissingResourceProvider {
                url: url.to_string(),
                collection: collection.clone(),
            });
        }

        let max_body_size = state.config.server.max_body_size;
        Ok(Self {
            collection: options.collection.clone(),
            permissions: options.permissions.clone(),
            request_schema: SchemaValidator::new(SchemaOrigin::Request, &options.request_schema)?,
            response_schema: SchemaValidator::new(SchemaOrigin::Response, &options.response_schema)?,
            parser: RequestDataParser::new(max_body_size),
            debug_mode: state.debug_mode(),
            max_body_size,
            verifier: state.verifier.clone(),
            resources: state.resources.clone(),
        })
    }
}

/// The callable bound on the router for one (url, method).
pub struct RequestPipeline {
    url: String,
    method: HttpMethod,
    action: HandlerMethod,
    route: Arc<CompiledRoute>,
    logger: Arc<RouteLogger>,
}

impl RequestPipeline {
    pub fn new(
        url: &str,
        method: HttpMethod,
        action: HandlerMethod,
        route: Arc<CompiledRoute>,
        logger: Arc<RouteLogger>,
    ) -> Self {
        Self {
            url: url.to_string(),
            method,
            action,
            route,
            logger,
        }
    }

    /// Run one request to a response or a translated error.
    pub async fn handle(&self, request: Request) -> Result<Response, RouteError> {
        self.logger
            .info(format!("* Received HTTP {} request *", self.method));

        let (mut parts, body) = request.into_parts();
        let path_params = match parts.extract::<Path<HashMap<String, String>>>().await {
            Ok(Path(params)) => params,
            Err(PathRejection::MissingPathParams(_)) => HashMap::new(),
            Err(rejection) => {
                let error = RouteError::bad_request(rejection.body_text())
                    .with_data("url", self.url.as_str());
                return Err(self.fail(error, &parts.headers, None));
            }
        };

        let mut payload = None;
        let outcome = AssertUnwindSafe(self.run(&parts, body, path_params, &mut payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(RouteError::unknown(panic_message(panic.as_ref()))));

        outcome.map_err(|error| self.fail(error, &parts.headers, payload.as_ref()))
    }

    async fn run(
        &self,
        parts: &Parts,
        body: Body,
        path_params: HashMap<String, String>,
        captured: &mut Option<Payload>,
    ) -> Result<Response, RouteError> {
        let route = &self.route;

        let payload = route
            .parser
            .parse(parts, body)
            .instrument(info_span!("parse_request_data"))
            .await?;
        *captured = Some(payload.clone());

        let identity = match route.permissions.required_roles(self.method) {
            [] => None,
            roles => {
                let verifier = route
                    .verifier
                    .as_ref()
                    .ok_or_else(|| RouteError::unknown("No authorization verifier configured"))?;
                let identity = info_span!("validate_jwt")
                    .in_scope(|| verifier.verify(&parts.headers, roles))?;
                self.logger
                    .info("* Validated request JWT IDENTITY successfully *");
                Some(identity)
            }
        };

        if route.request_schema.has_schema(self.method) {
            let document = Value::Object(payload.clone());
            info_span!("validate_request_schema")
                .in_scope(|| route.request_schema.validate(self.method, &document))
                .map_err(|m| RouteError::schema_mismatch(&self.url, &m, route.debug_mode))?;
            self.logger.info("* Validated request SCHEMA successfully *");
        }

        let ctx = RequestContext {
            url: self.url.clone(),
            method: self.method,
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            path_params,
            identity,
        };

        let reply = match &route.collection {
            Some(collection) => {
                let handle = self
                    .open_resource(collection)
                    .instrument(info_span!("open_resource", collection = %collection))
                    .await?;
                let reply = (self.action)(ctx, payload, Some(handle.collection()))
                    .instrument(info_span!("handle_request"))
                    .await;
                drop(handle);
                reply?
            }
            None => {
                (self.action)(ctx, payload, None)
                    .instrument(info_span!("handle_request"))
                    .await?
            }
        };

        if !reply.is_response() {
            self.logger.warn(format!(
                "* HTTP {} response was forced to a Response! Type: {}",
                self.method,
                reply.type_name()
            ));
        }
        let delivery = into_delivery(reply, route.max_body_size)
            .instrument(info_span!("create_response"))
            .await?;

        if let Some(body @ Value::Object(_)) = &delivery.body {
            if route.response_schema.has_schema(self.method) {
                info_span!("validate_response_schema")
                    .in_scope(|| route.response_schema.validate(self.method, body))
                    .map_err(|m| RouteError::schema_mismatch(&self.url, &m, route.debug_mode))?;
                self.logger.info("* Validated response SCHEMA successfully *");
            }
        }

        info_span!("deliver_response").in_scope(|| {
            if let Some(body) = delivery.body.as_ref().filter(|b| response::is_truthy(b)) {
                self.logger.debug(format!("* Attached RESPONSE BODY [{body}]"));
            }
            self.logger.info(format!(
                "* Sending HTTP {} response: ({}) *",
                self.method,
                delivery.status().as_u16()
            ));
        });
        Ok(delivery.response)
    }

    async fn open_resource(&self, collection: &str) -> Result<ResourceHandle, RouteError> {
        let provider = self.route.resources.as_ref().ok_or_else(|| {
            RouteError::resource_unavailable("No resource provider configured")
                .with_data("collection", collection)
        })?;

        let handle = provider.acquire(collection).await.map_err(|e| {
            RouteError::resource_unavailable(format!(
                "Unable to open collection [{collection}]: {e}"
            ))
            .with_data("collection", collection)
        })?;
        self.logger.debug(format!(
            "* Opened connection to collection [{collection}] for request"
        ));
        Ok(handle)
    }

    /// Enrich, log and return `error`. Every failed request passes through here once.
    fn fail(&self, mut error: RouteError, headers: &HeaderMap, payload: Option<&Payload>) -> RouteError {
        let debug_mode = self.route.debug_mode;
        let trace = (debug_mode || self.logger.enabled(LogLevel::Debug))
            .then(|| Backtrace::force_capture().to_string());

        if debug_mode {
            let headers: Vec<Value> = headers
                .iter()
                .map(|(name, value)| json!([name.as_str(), String::from_utf8_lossy(value.as_bytes())]))
                .collect();
            error.insert_data("request_headers", headers);
            error.insert_data(
                "request_data",
                payload.cloned().map(Value::Object).unwrap_or(Value::Null),
            );
            if let Some(trace) = &trace {
                error.set_stack_trace(trace.clone());
            }
        }

        self.logger.error(format!("* Error: {error}"));
        if let Some(trace) = trace {
            self.logger.debug(trace);
        }
        self.logger.info(format!(
            "* Sending HTTP {} ERROR response: ({}) *",
            self.method,
            error.status().as_u16()
        ));
        error
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("Action panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("Action panicked: {message}")
    } else {
        "Action panicked".to_string()
    }
}
