//! Payload schema subsystem.
//!
//! # Data Flow
//! ```text
//! Route registration:
//!     RouteSchema (method → JSON-Schema document)
//!     → validator.rs (compile once per method)
//!
//! Per request:
//!     payload / response body
//!     → SchemaValidator::validate(method, value)
//!     → Ok(()) or SchemaMismatch (first failing path segment + document)
//! ```

pub mod validator;

pub use validator::{
    RouteSchema, SchemaCompileError, SchemaMismatch, SchemaOrigin, SchemaValidator,
};
