//! JSON-Schema validation of request and response payloads.
//!
//! # Responsibilities
//! - Compile one validator per method when the route is registered
//! - Validate a payload against the schema for its method
//! - Report the first failing path segment plus the schema document
//!
//! # Design Decisions
//! - Schemas compile at registration, so a broken document fails startup
//!   instead of the first request
//! - No schema for a method and a conforming payload are the same outcome

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use jsonschema::Validator;
use serde_json::{Map, Value};

use crate::routing::method::HttpMethod;

/// Per-method schema documents for one direction of one route.
pub type RouteSchema = HashMap<HttpMethod, Value>;

/// Which side of the exchange a schema guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOrigin {
    Request,
    Response,
}

impl fmt::Display for SchemaOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Response => f.write_str("response"),
        }
    }
}

/// A schema document that could not be compiled.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid {origin} schema for {method}: {reason}")]
pub struct SchemaCompileError {
    pub method: HttpMethod,
    pub origin: SchemaOrigin,
    pub reason: String,
}

/// A payload that does not conform to its schema.
#[derive(Debug, Clone)]
pub struct SchemaMismatch {
    method: HttpMethod,
    origin: SchemaOrigin,
    field: Option<String>,
    detail: String,
    schema: Arc<Value>,
}

impl SchemaMismatch {
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn origin(&self) -> SchemaOrigin {
        self.origin
    }

    /// First segment of the failing instance path, `None` at the root.
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Diagnostic data for the error body. The schema is only included in debug mode.
    pub fn data(&self, debug: bool) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert(
            "field".into(),
            self.field.clone().map(Value::String).unwrap_or(Value::Null),
        );
        if debug {
            data.insert("schema".into(), self.schema.as_ref().clone());
        }
        data
    }
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "field [{}]: {}", field, self.detail),
            None => f.write_str(&self.detail),
        }
    }
}

impl std::error::Error for SchemaMismatch {}

struct CompiledSchema {
    document: Arc<Value>,
    validator: Validator,
}

/// Validates payloads for the methods of a single route.
pub struct SchemaValidator {
    origin: SchemaOrigin,
    schemas: HashMap<HttpMethod, CompiledSchema>,
}

impl SchemaValidator {
    /// Compile every document in `schema`.
    pub fn new(origin: SchemaOrigin, schema: &RouteSchema) -> Result<Self, SchemaCompileError> {
        let mut schemas = HashMap::with_capacity(schema.len());
        for (method, document) in schema {
            let validator = jsonschema::validator_for(document).map_err(|e| SchemaCompileError {
                method: *method,
                origin,
                reason: e.to_string(),
            })?;
            schemas.insert(
                *method,
                CompiledSchema {
                    document: Arc::new(document.clone()),
                    validator,
                },
            );
        }
        Ok(Self { origin, schemas })
    }

    /// A validator with no schemas; everything passes.
    pub fn empty(origin: SchemaOrigin) -> Self {
        Self {
            origin,
            schemas: HashMap::new(),
        }
    }

    pub fn origin(&self) -> SchemaOrigin {
        self.origin
    }

    pub fn has_schema(&self, method: HttpMethod) -> bool {
        self.schemas.contains_key(&method)
    }

    /// Validate `payload` against the schema registered for `method`.
    pub fn validate(&self, method: HttpMethod, payload: &Value) -> Result<(), SchemaMismatch> {
        let Some(compiled) = self.schemas.get(&method) else {
            return Ok(());
        };

        match compiled.validator.iter_errors(payload).next() {
            None => Ok(()),
            Some(error) => Err(SchemaMismatch {
                method,
                origin: self.origin,
                field: first_segment(&error.instance_path.to_string()),
                detail: error.to_string(),
                schema: compiled.document.clone(),
            }),
        }
    }
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.schemas.keys().collect();
        methods.sort();
        f.debug_struct("SchemaValidator")
            .field("origin", &self.origin)
            .field("methods", &methods)
            .finish()
    }
}

/// First reference token of a JSON pointer, unescaped.
fn first_segment(pointer: &str) -> Option<String> {
    pointer
        .strip_prefix('/')
        .and_then(|rest| rest.split('/').next())
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
}
