//! Request data extraction.
//!
//! # Responsibilities
//! - Merge query parameters and body into one payload mapping
//! - Decode JSON and form-encoded bodies
//! - Carry per-request metadata to the action
//!
//! # Design Decisions
//! - Body wins over query string on key collision
//! - Empty body and empty query give an empty payload, never an error
//! - Only a body that claims (or looks like) structured data and fails to
//!   decode is an error
//! - Bodies of other content types are not part of the payload

use std::collections::HashMap;

use axum::body::{Body, Bytes};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Uri};
use serde_json::{Map, Value};

use crate::error::RouteError;
use crate::routing::method::HttpMethod;
use crate::security::Identity;

/// The unified request payload handed to actions.
pub type Payload = Map<String, Value>;

/// Per-request metadata handed to actions. Built fresh for every request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The route pattern this request matched.
    pub url: String,
    pub method: HttpMethod,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Captures from `{name}` segments of the route pattern.
    pub path_params: HashMap<String, String>,
    /// Set when the method required roles and the caller was verified.
    pub identity: Option<Identity>,
}

impl RequestContext {
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Extracts the payload mapping from an inbound request.
#[derive(Debug, Clone, Copy)]
pub struct RequestDataParser {
    max_body_size: usize,
}

impl RequestDataParser {
    pub fn new(max_body_size: usize) -> Self {
        Self { max_body_size }
    }

    /// Read the body and merge it over the query parameters.
    pub async fn parse(&self, parts: &Parts, body: Body) -> Result<Payload, RouteError> {
        let bytes = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| RouteError::parsing(format!("Failed to read request body: {e}")))?;

        let mut payload = query_params(&parts.uri);
        payload.extend(parse_body(&parts.headers, &bytes)?);
        Ok(payload)
    }
}

/// Query string parameters as string values. Repeated keys keep the last value.
pub fn query_params(uri: &Uri) -> Payload {
    uri.query()
        .map(|q| form_pairs(q.as_bytes()))
        .unwrap_or_default()
}

/// Decode `bytes` according to the request's content type.
pub fn parse_body(headers: &HeaderMap, bytes: &Bytes) -> Result<Payload, RouteError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Payload::new());
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase());

    match content_type.as_deref() {
        Some("application/x-www-form-urlencoded") => Ok(form_pairs(bytes)),
        Some(ct) if is_json(ct) => parse_json_object(bytes),
        None => parse_json_object(bytes),
        Some(_) => Ok(Payload::new()),
    }
}

fn is_json(content_type: &str) -> bool {
    content_type == "application/json" || content_type.ends_with("+json")
}

fn parse_json_object(bytes: &[u8]) -> Result<Payload, RouteError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Payload::new()),
        Ok(other) => Err(RouteError::parsing(format!(
            "Request body must be a JSON object, got {}",
            json_type_name(&other)
        ))),
        Err(e) => Err(RouteError::parsing(format!("Malformed JSON request body: {e}"))),
    }
}

fn form_pairs(input: &[u8]) -> Payload {
    url::form_urlencoded::parse(input)
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

/// Short name of a JSON value's type, for log and error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
