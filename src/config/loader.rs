//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a TOML file, apply `APP_*` environment overrides, then validate.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    finish(config)
}

/// Defaults plus `APP_*` environment overrides, validated.
pub fn load_from_env() -> Result<AppConfig, ConfigError> {
    finish(AppConfig::default())
}

fn finish(mut config: AppConfig) -> Result<AppConfig, ConfigError> {
    apply_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply overrides read through `lookup` (normally the process environment).
pub fn apply_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let server = &mut config.server;

    if let Some(host) = lookup("APP_HOST") {
        server.host = host;
    }
    if let Some(port) = lookup("APP_PORT") {
        server.port = port.trim().parse().map_err(|_| ConfigError::Env {
            var: "APP_PORT",
            reason: format!("'{port}' is not a port number"),
        })?;
    }
    if let Some(env) = lookup("APP_ENV") {
        server.env = env;
    }
    if let Some(debug) = lookup("APP_DEBUG_MODE") {
        server.debug_mode = parse_bool(&debug).ok_or_else(|| ConfigError::Env {
            var: "APP_DEBUG_MODE",
            reason: format!("'{debug}' is not a boolean"),
        })?;
    }
    if let Some(level) = lookup("APP_LOG_LEVEL") {
        server.log_level = level.parse().map_err(|reason| ConfigError::Env {
            var: "APP_LOG_LEVEL",
            reason,
        })?;
    }
    if let Some(origins) = lookup("APP_CORS_ORIGINS") {
        server.cors_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(secret) = lookup("APP_JWT_SECRET") {
        config.auth.jwt_secret = Some(secret);
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::LogLevel;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = AppConfig::default();
        apply_overrides(
            &mut config,
            lookup_from(&[
                ("APP_PORT", "8181"),
                ("APP_DEBUG_MODE", "True"),
                ("APP_LOG_LEVEL", "info"),
                ("APP_CORS_ORIGINS", "http://a.example, http://b.example,"),
                ("APP_JWT_SECRET", "s3cret"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.port, 8181);
        assert!(config.server.debug_mode);
        assert_eq!(config.server.log_level, LogLevel::Info);
        assert_eq!(
            config.server.cors_origins,
            vec!["http://a.example", "http://b.example"]
        );
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_bad_override_is_reported() {
        let mut config = AppConfig::default();
        let err = apply_overrides(&mut config, lookup_from(&[("APP_DEBUG_MODE", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "APP_DEBUG_MODE", .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
