//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Route registration:
//!     → logging.rs (RouteLogger::configure(url, method, level))
//!
//! Each pipeline step:
//!     → RouteLogger::{debug, info, warn, error}
//!     → tracing event (target `route_dispatcher::route`, url + method fields)
//!     → subscriber installed by init_tracing
//! ```

pub mod logging;

pub use logging::{init_tracing, LogLevel, RouteLogger};
