//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check CORS origins are usable header values
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>

use axum::http::HeaderValue;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Check `config` for values that deserialize fine but cannot work.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    if server.host.trim().is_empty() {
        errors.push(ValidationError::new("server.host", "must not be empty"));
    }
    if server.port == 0 {
        errors.push(ValidationError::new("server.port", "must be greater than 0"));
    }
    if server.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "server.request_timeout_secs",
            "must be greater than 0",
        ));
    }
    if server.max_body_size == 0 {
        errors.push(ValidationError::new(
            "server.max_body_size",
            "must be greater than 0",
        ));
    }
    for origin in &server.cors_origins {
        if origin.trim() == "*" {
            errors.push(ValidationError::new(
                "server.cors_origins",
                "wildcard origin cannot be combined with credentialed CORS",
            ));
        } else if HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError::new(
                "server.cors_origins",
                format!("'{origin}' is not a valid origin"),
            ));
        }
    }

    if let Some(secret) = &config.auth.jwt_secret {
        if secret.is_empty() {
            errors.push(ValidationError::new("auth.jwt_secret", "must not be empty when set"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
