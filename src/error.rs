//! Error taxonomy shared by every pipeline step.
//!
//! # Responsibilities
//! - Define the closed set of failure kinds a request can end in
//! - Carry status code, message, structured data and an optional stack trace
//! - Serialize to the single JSON error shape clients see
//!
//! # Design Decisions
//! - One struct with a kind tag rather than one type per failure, so a single
//!   translator can enrich any failure uniformly
//! - `data` and `stack_trace` only reach the wire when populated, and the
//!   pipeline populates headers/payload/trace in debug mode only

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value};

use crate::schema::{SchemaMismatch, SchemaOrigin};

/// The closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request body.
    Parsing,
    /// Missing or insufficient credentials.
    Authorization,
    /// Payload failed the request schema.
    RequestSchema,
    /// Action output failed the response schema.
    ResponseSchema,
    /// A declared backing resource is missing or unreachable.
    ResourceUnavailable,
    /// Raised deliberately by an action.
    Action,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parsing => "parsing_failure",
            Self::Authorization => "authorization_failure",
            Self::RequestSchema => "request_schema_mismatch",
            Self::ResponseSchema => "response_schema_mismatch",
            Self::ResourceUnavailable => "resource_unavailable",
            Self::Action => "action_error",
            Self::Unknown => "unknown_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure raised anywhere in a request pipeline.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct RouteError {
    kind: ErrorKind,
    status: StatusCode,
    message: String,
    data: Map<String, Value>,
    stack_trace: Option<String>,
}

impl RouteError {
    pub fn new(kind: ErrorKind, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            data: Map::new(),
            stack_trace: None,
        }
    }

    /// The request body could not be parsed.
    pub fn parsing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parsing, StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// The verifier rejected the caller. `status` is normally 401 or 403.
    pub fn authorization(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, status, message)
    }

    pub fn resource_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::ResourceUnavailable,
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
        )
    }

    /// An error an action raises on purpose, with a status of its choosing.
    pub fn action(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Action, status, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::action(StatusCode::BAD_REQUEST, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Build the 400 reported for a schema mismatch on `url`.
    ///
    /// The schema document itself is only attached when `debug` is set.
    pub fn schema_mismatch(url: &str, mismatch: &SchemaMismatch, debug: bool) -> Self {
        let (kind, label) = match mismatch.origin() {
            SchemaOrigin::Request => (ErrorKind::RequestSchema, "Request"),
            SchemaOrigin::Response => (ErrorKind::ResponseSchema, "Response"),
        };
        let message = format!("{label} schema validation error on URL [{url}]: {mismatch}");
        let mut error = Self::new(kind, StatusCode::BAD_REQUEST, message);
        error.data = mismatch.data(debug);
        error
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_data(key, value);
        self
    }

    pub fn insert_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn set_stack_trace(&mut self, trace: impl Into<String>) {
        self.stack_trace = Some(trace.into());
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn is_response_schema(&self) -> bool {
        self.kind == ErrorKind::ResponseSchema
    }

    /// The JSON body sent to the client.
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("message".into(), Value::String(self.message.clone()));
        if !self.data.is_empty() {
            body.insert("data".into(), Value::Object(self.data.clone()));
        }
        if let Some(trace) = &self.stack_trace {
            body.insert("stack_trace".into(), Value::String(trace.clone()));
        }
        Value::Object(body)
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        (self.status, Json(self.to_body())).into_response()
    }
}
