//! Request dispatch over axum.
//!
//! Binds HTTP methods on a URL to actions and runs every request through a
//! fixed pipeline: parse, authorize, validate, open a scoped resource, act,
//! coerce, validate the response, log, deliver. Every failure ends in one
//! JSON error response.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod routing;
pub mod schema;

// Collaborators
pub mod security;
pub mod store;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::AppConfig;
pub use error::{ErrorKind, RouteError};
pub use http::{AppState, Application, Payload, Reply, RequestContext};
pub use lifecycle::Shutdown;
pub use routing::{action, HttpMethod, Route, RouteHandler, RoutePermissions, Routes};
pub use store::Resource;
