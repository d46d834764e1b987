//! Shared helpers for command handlers.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::CliError;

/// Parse a JSON argument, naming the flag in the error.
pub fn parse_json_arg(field: &str, raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(|e| CliError::Validation {
        field: field.into(),
        reason: format!("invalid JSON: {e}"),
    })
}

/// Parse a JSON argument that must be an object.
pub fn parse_json_object(field: &str, raw: &str) -> Result<Map<String, Value>, CliError> {
    match parse_json_arg(field, raw)? {
        Value::Object(map) => Ok(map),
        other => Err(CliError::Validation {
            field: field.into(),
            reason: format!("expected a JSON object, got {other}"),
        }),
    }
}

/// Read and parse a JSON file for `--data-file` flags.
pub fn read_json_file(path: &Path) -> Result<Value, CliError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| CliError::Validation {
        field: "data-file".into(),
        reason: format!("invalid JSON in {}: {e}", path.display()),
    })
}

/// Turn `KEY=VALUE` pairs into a JSON object.
///
/// Values that parse as JSON scalars (`true`, `42`, `null`) keep their type;
/// everything else is a string. Use `--input-json` for nested values.
pub fn parse_key_values(pairs: &[String]) -> Result<Map<String, Value>, CliError> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| CliError::Validation {
            field: "input".into(),
            reason: format!("expected KEY=VALUE, got '{pair}'"),
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::Validation {
                field: "input".into(),
                reason: format!("empty key in '{pair}'"),
            });
        }
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(v @ (Value::Bool(_) | Value::Number(_) | Value::Null)) => v,
            _ => Value::String(raw.to_owned()),
        };
        map.insert(key.to_owned(), value);
    }
    Ok(map)
}

/// Field names from a form step's `data_schema`.
pub fn schema_field_names(schema: &[Value]) -> Vec<String> {
    schema
        .iter()
        .filter_map(|field| field.get("name").and_then(Value::as_str))
        .map(str::to_owned)
        .collect()
}
