use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{LedgerError, Result, SchemaError};

/// Parses raw model text as a single JSON object. Prose around the JSON is
/// not tolerated.
pub(crate) fn parse_object(target: &'static str, raw: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw).map_err(LedgerError::MalformedResponse)?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(SchemaError::new(
            target,
            format!("expected a json object, got {}", kind_of(&other)),
        )
        .into()),
    }
}

pub(crate) fn require_keys(
    target: &'static str,
    object: &Map<String, Value>,
    keys: &[&str],
) -> Result<()> {
    match keys.iter().find(|key| !object.contains_key(**key)) {
        Some(key) => Err(SchemaError::missing_key(target, key).into()),
        None => Ok(()),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(
    target: &'static str,
    object: Map<String, Value>,
) -> Result<T> {
    serde_json::from_value(Value::Object(object))
        .map_err(|err| SchemaError::new(target, err.to_string()).into())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
