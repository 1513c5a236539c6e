//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section has defaults so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::observability::logging::LogLevel;

/// Root configuration for the dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server and request handling settings.
    pub server: ServerConfig,

    /// Backing document store settings.
    pub store: StoreConfig,

    /// Token verification settings.
    pub auth: AuthConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    /// Deployment environment name (e.g., "development", "production").
    pub env: String,

    /// Attach headers, payload and stack trace to error responses.
    pub debug_mode: bool,

    /// Default tracing directive for the binary.
    pub log_level: LogLevel,

    /// Origins allowed on CORS-enabled routes. Empty means `http(s)://host:port`.
    pub cors_origins: Vec<String>,

    /// Total time allowed for one request, in seconds.
    pub request_timeout_secs: u64,

    /// Largest request or buffered response body, in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            env: "development".to_string(),
            debug_mode: false,
            log_level: LogLevel::Warn,
            cors_origins: Vec::new(),
            request_timeout_secs: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl ServerConfig {
    /// Socket address string for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configured origins, or the server's own http/https origins when none are set.
    pub fn effective_cors_origins(&self) -> Vec<String> {
        if self.cors_origins.is_empty() {
            vec![
                format!("http://{}:{}", self.host, self.port),
                format!("https://{}:{}", self.host, self.port),
            ]
        } else {
            self.cors_origins.clone()
        }
    }
}

/// Document store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Collections that exist at startup.
    pub collections: Vec<String>,

    /// Create collections on first acquire instead of failing.
    pub auto_create: bool,

    /// Refuse to start without a resource provider.
    pub required: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            auto_create: true,
            required: false,
        }
    }
}

/// Token verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for HS256 bearer tokens. No secret disables verification.
    pub jwt_secret: Option<String>,

    /// Clock skew tolerated on `exp`, in seconds.
    pub leeway_secs: u64,
}
