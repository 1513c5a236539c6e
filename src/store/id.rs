//! Native document identifiers.
//!
//! The store's native id is a BSON object id, written as 24 hex digits
//! and encoded in JSON as `{"$oid": "<hex>"}`.

use bson::oid::ObjectId;
use serde_json::{json, Map, Value};

/// Field holding a document's identifier.
pub const ID_FIELD: &str = "_id";

/// True for a string that parses as an object id.
pub fn is_object_id(value: &str) -> bool {
    ObjectId::parse_str(value).is_ok()
}

/// Native JSON encoding of an object id.
pub fn object_id(id: &ObjectId) -> Value {
    json!({ "$oid": id.to_hex() })
}

/// A fresh native id, already encoded.
pub fn new_object_id() -> Value {
    object_id(&ObjectId::new())
}

/// Convert a string `_id` that is a valid object id into its native encoding.
///
/// Returns whether the payload was changed. Anything else is left untouched.
pub fn normalize_id(payload: &mut Map<String, Value>) -> bool {
    let Some(Value::String(raw)) = payload.get(ID_FIELD) else {
        return false;
    };
    let Ok(id) = ObjectId::parse_str(raw) else {
        return false;
    };
    payload.insert(ID_FIELD.to_string(), object_id(&id));
    true
}
