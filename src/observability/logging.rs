//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for the binary
//! - Keep one logger per (url, method), created on first use
//! - Filter each route's events by the level that route was registered with
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging; loggers only add the
//!   `url`/`method` fields and a per-route level gate
//! - Registry is process-wide and never shrinks
//! - Route events share one target so the global filter can pass them
//!   through and leave the decision to the route's own level

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::routing::method::HttpMethod;

/// Target shared by every route logger event.
pub const ROUTE_TARGET: &str = "route_dispatcher::route";

/// Method slot used for route-wide (not per-method) loggers.
const ANY_METHOD: &str = "*";

/// Log level for a route or for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    #[default]
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Debug,
            1 => Self::Info,
            3 => Self::Error,
            _ => Self::Warn,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("'{other}' is not a log level")),
        }
    }
}

static REGISTRY: LazyLock<DashMap<(String, String), Arc<RouteLogger>>> =
    LazyLock::new(DashMap::new);

/// Leveled logger bound to one URL and, optionally, one method.
#[derive(Debug)]
pub struct RouteLogger {
    url: String,
    method: String,
    level: AtomicU8,
}

impl RouteLogger {
    /// The logger for `(url, method)`, created at the default level if missing.
    pub fn get(url: &str, method: Option<HttpMethod>) -> Arc<RouteLogger> {
        let method = method.map(|m| m.as_str()).unwrap_or(ANY_METHOD);
        REGISTRY
            .entry((url.to_string(), method.to_string()))
            .or_insert_with(|| {
                Arc::new(RouteLogger {
                    url: url.to_string(),
                    method: method.to_string(),
                    level: AtomicU8::new(LogLevel::default() as u8),
                })
            })
            .clone()
    }

    /// Fetch or create the logger and set its level.
    pub fn configure(url: &str, method: Option<HttpMethod>, level: LogLevel) -> Arc<RouteLogger> {
        let logger = Self::get(url, method);
        logger.set_level(level);
        logger
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level()
    }

    pub fn debug(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!(target: ROUTE_TARGET, url = %self.url, method = %self.method, "{}", message);
        }
    }

    pub fn info(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Info) {
            tracing::info!(target: ROUTE_TARGET, url = %self.url, method = %self.method, "{}", message);
        }
    }

    pub fn warn(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Warn) {
            tracing::warn!(target: ROUTE_TARGET, url = %self.url, method = %self.method, "{}", message);
        }
    }

    pub fn error(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Error) {
            tracing::error!(target: ROUTE_TARGET, url = %self.url, method = %self.method, "{}", message);
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: LogLevel) {
    let directive = format!(
        "route_dispatcher={default_level},tower_http={default_level},{ROUTE_TARGET}=debug"
    );
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| directive.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
