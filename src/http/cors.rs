//! CORS for routes that opt in.
//!
//! The layer is built once per route at registration and wraps that route's
//! method router, so preflight requests are answered for every bound method.

use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::routing::method::HttpMethod;

/// Credentialed CORS for `origins`, allowing exactly `methods`.
pub fn cors_layer(origins: &[String], methods: &[HttpMethod]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) if value != "*" => Some(value),
            _ => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let methods: Vec<Method> = methods.iter().map(HttpMethod::as_method).collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(methods)
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_origin_is_skipped() {
        let origins = vec!["*".to_string(), "http://app.example.test".to_string()];
        let _layer = cors_layer(&origins, &[HttpMethod::Get]);
    }
}
