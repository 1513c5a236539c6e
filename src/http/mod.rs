//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, shared layers, fallback)
//!     → per-route MethodRouter (cors.rs layer if the route enabled it)
//!     → routing pipeline
//!         → request.rs (query + body → payload, request context)
//!         → action
//!         → response.rs (reply → response, JSON body for validation)
//!     → Send to client
//! ```

pub mod cors;
pub mod request;
pub mod response;
pub mod server;

pub use request::{Payload, RequestContext, RequestDataParser};
pub use response::{Delivery, Reply};
pub use server::{AppState, Application};
