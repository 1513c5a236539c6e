//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (route with required roles for its method):
//!     → verifier.rs (bearer token → claims → role check)
//!     → Identity attached to the request context
//!     → or RouteError (401 bad/missing token, 403 missing role)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a method with required roles never runs unverified
//! - Methods without required roles skip verification entirely

pub mod verifier;

pub use verifier::{bearer_token, AuthorizationVerifier, Claims, Identity, JwtVerifier};
