//! Checks that actions run before doing real work.

use axum::http::StatusCode;
use serde_json::Value;

use crate::error::RouteError;
use crate::http::request::Payload;
use crate::routing::method::HttpMethod;
use crate::store::Resource;

pub use crate::store::normalize_id;

/// The resource lent to the action, or a 500 if the route was not given one.
///
/// A missing resource is a deployment bug, never the caller's fault.
pub fn ensure_resource<'a>(url: &str, resource: Option<&'a Resource>) -> Result<&'a Resource, RouteError> {
    resource.ok_or_else(|| {
        RouteError::resource_unavailable(format!("No resource configured for URL [{url}]"))
            .with_data("url", url)
    })
}

/// The value of `field`, or a 400 naming the missing field.
pub fn ensure_field<'a>(
    url: &str,
    method: HttpMethod,
    field: &str,
    payload: &'a Payload,
) -> Result<&'a Value, RouteError> {
    payload.get(field).ok_or_else(|| {
        RouteError::action(
            StatusCode::BAD_REQUEST,
            format!("Required field [{field}] not passed in request"),
        )
        .with_data("url", url)
        .with_data("method", method.as_str())
    })
}
