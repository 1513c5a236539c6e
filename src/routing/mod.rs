//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route registration (at startup):
//!     Route { url, RouteHandler, RouteOptions }
//!     → handler.rs (one pipeline per bound method, CORS wrap if enabled)
//!     → pipeline.rs (schemas compiled, services resolved)
//!     → axum MethodRouter bound under the URL
//!
//! Per request:
//!     pipeline.rs: parse → authorize → request schema → open resource
//!         → action → coerce → response schema → deliver
//!     any failure → one translator → RouteError → JSON error response
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Method names validated against a fixed set when the route is built
//! - Registration fails loudly; nothing is deferred to the first request

pub mod handler;
pub mod helpers;
pub mod method;
pub mod permissions;
pub mod pipeline;
pub mod route;

pub use handler::{action, ActionFuture, HandlerMethod, RouteHandler};
pub use helpers::{ensure_field, ensure_resource, normalize_id};
pub use method::{HttpMethod, InvalidMethod};
pub use permissions::RoutePermissions;
pub use route::{RegistrationError, Route, RouteOptions, Routes};
