//! Action replies and their conversion to responses.
//!
//! # Responsibilities
//! - Accept either a ready response or a plain JSON value from an action
//! - Coerce plain values into `200 application/json` responses
//! - Expose the JSON body of the outgoing response for validation and logging
//!
//! # Design Decisions
//! - JSON responses are buffered once and rebuilt from the same bytes;
//!   other responses stream through untouched

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::error::RouteError;
use crate::http::request::json_type_name;

/// What an action produced.
#[derive(Debug)]
pub enum Reply {
    /// A finished response.
    Response(Response),
    /// A bare value that still has to become a response.
    Value(Value),
}

impl Reply {
    /// Serialize any value into a bare reply.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, RouteError> {
        serde_json::to_value(value)
            .map(Reply::Value)
            .map_err(|e| RouteError::unknown(format!("Failed to serialize reply: {e}")))
    }

    /// A finished JSON response with `status`.
    pub fn with_status(status: StatusCode, body: Value) -> Self {
        Reply::Response((status, Json(body)).into_response())
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Reply::Response(_))
    }

    /// Short description of what the reply holds.
    pub fn type_name(&self) -> &'static str {
        match self {
            Reply::Response(_) => "response",
            Reply::Value(value) => json_type_name(value),
        }
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Value(value)
    }
}

/// A response ready to send, plus its decoded JSON body when it has one.
#[derive(Debug)]
pub struct Delivery {
    pub response: Response,
    pub body: Option<Value>,
}

impl Delivery {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }
}

/// Turn a reply into a deliverable response.
///
/// Bare values become `200` JSON responses. JSON responses are read (up to
/// `limit` bytes) so their body can be inspected.
pub async fn into_delivery(reply: Reply, limit: usize) -> Result<Delivery, RouteError> {
    match reply {
        Reply::Value(value) => Ok(Delivery {
            response: (StatusCode::OK, Json(&value)).into_response(),
            body: Some(value),
        }),
        Reply::Response(response) if has_json_body(&response) => {
            let (parts, body) = response.into_parts();
            let bytes = axum::body::to_bytes(body, limit)
                .await
                .map_err(|e| RouteError::unknown(format!("Failed to read response body: {e}")))?;
            let decoded = serde_json::from_slice(&bytes).ok();
            Ok(Delivery {
                response: Response::from_parts(parts, Body::from(bytes)),
                body: decoded,
            })
        }
        Reply::Response(response) => Ok(Delivery {
            response,
            body: None,
        }),
    }
}

fn has_json_body(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let ct = ct.split(';').next().unwrap_or_default().trim();
            ct.eq_ignore_ascii_case("application/json") || ct.ends_with("+json")
        })
        .unwrap_or(false)
}

/// Whether a body is worth logging (not null, empty or false).
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
