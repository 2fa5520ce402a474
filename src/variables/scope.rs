//! Scope document loading.
//!
//! A scope document supplies the active profile's variable values. Several
//! shapes are accepted:
//!
//! ```json
//! {"values": [{"key": "base_url", "value": "https://api.test", "enabled": true}]}
//! {"environment": {"values": [...]}}
//! {"variables": [{"key": "id", "value": "42", "encoding": "url"}]}
//! {"base_url": "https://api.test", "id": 42}
//! ```
//!
//! Entries may request an [`Encoding`](super::encoding::Encoding), applied once
//! at load time. The anchor variable is never encoded.

use super::encoding::Encoding;
use super::resolver::mask_sensitive;
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Keys treated as document metadata in flat-map documents.
const RESERVED_KEYS: &[&str] = &["id", "collection_id", "created_at", "name", "description"];

/// Errors that can occur while loading a scope document.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeError {
    /// IO error occurred while reading the file
    IoError(String),

    /// Failed to parse JSON content
    ParseError(String),

    /// The document does not have a recognized shape
    InvalidFormat(String),
}

impl std::fmt::Display for ScopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeError::IoError(msg) => write!(f, "Failed to read scope document: {}", msg),
            ScopeError::ParseError(msg) => write!(f, "Failed to parse scope document: {}", msg),
            ScopeError::InvalidFormat(msg) => write!(f, "Invalid scope document: {}", msg),
        }
    }
}

impl std::error::Error for ScopeError {}

impl From<io::Error> for ScopeError {
    fn from(err: io::Error) -> Self {
        ScopeError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ScopeError {
    fn from(err: serde_json::Error) -> Self {
        ScopeError::ParseError(err.to_string())
    }
}

/// Renders a JSON value as a variable string.
///
/// Strings are taken verbatim, `null` becomes empty, everything else uses its
/// JSON text.
pub fn json_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Loads a scope document from disk.
///
/// # Arguments
///
/// * `path` - Path of the JSON document
/// * `anchor` - Name of the anchor variable, exempt from encodings
pub fn load_scope(path: &Path, anchor: &str) -> Result<HashMap<String, String>, ScopeError> {
    let content = fs::read_to_string(path)?;
    let raw: Value = serde_json::from_str(&content)?;
    parse_scope(&raw, anchor)
}

/// Parses a scope document into its enabled values.
///
/// # Returns
///
/// * `Ok(values)` - Enabled variables, encodings applied
/// * `Err(ScopeError::InvalidFormat)` - If the root is not an object or an
///   entry list is not an array
pub fn parse_scope(raw: &Value, anchor: &str) -> Result<HashMap<String, String>, ScopeError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ScopeError::InvalidFormat("Root must be a JSON object".to_string()))?;

    let values = if let Some(entries) = obj.get("values") {
        parse_entries(entries, anchor)?
    } else if let Some(environment) = obj.get("environment").and_then(Value::as_object) {
        match environment.get("values") {
            Some(entries) => parse_entries(entries, anchor)?,
            None => parse_flat(environment),
        }
    } else if let Some(entries) = obj.get("variables") {
        parse_entries(entries, anchor)?
    } else {
        parse_flat(obj)
    };

    if !values.contains_key(anchor) {
        warn!("Scope document does not define the anchor variable '{}'", anchor);
    }
    for (key, value) in &values {
        debug!("Scope variable {} = {}", key, mask_sensitive(key, value));
    }

    Ok(values)
}

fn parse_entries(entries: &Value, anchor: &str) -> Result<HashMap<String, String>, ScopeError> {
    let list = entries
        .as_array()
        .ok_or_else(|| ScopeError::InvalidFormat("Variable list must be an array".to_string()))?;

    let mut values = HashMap::new();
    for entry in list {
        let Some(key) = entry.get("key").and_then(Value::as_str) else {
            warn!("Skipping scope entry without a key");
            continue;
        };
        if !is_enabled(entry) {
            continue;
        }

        let raw_value = entry.get("value").map(json_to_string).unwrap_or_default();
        let value = if key == anchor {
            raw_value
        } else {
            apply_encoding(key, raw_value, entry)
        };
        values.insert(key.to_string(), value);
    }

    Ok(values)
}

fn parse_flat(obj: &Map<String, Value>) -> HashMap<String, String> {
    obj.iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()) && !key.starts_with("_postman"))
        .map(|(key, value)| (key.clone(), json_to_string(value)))
        .collect()
}

fn is_enabled(entry: &Value) -> bool {
    let enabled = entry.get("enabled").and_then(Value::as_bool).unwrap_or(true);
    let disabled = entry.get("disabled").and_then(Value::as_bool).unwrap_or(false);
    enabled && !disabled
}

fn apply_encoding(key: &str, value: String, entry: &Value) -> String {
    let Some(name) = entry.get("encoding").and_then(Value::as_str) else {
        return value;
    };
    let Some(encoding) = Encoding::from_name(name) else {
        warn!("Unknown encoding '{}' on variable '{}', keeping raw value", name, key);
        return value;
    };

    let iterations = match entry.get("encoding_iterations") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(1),
        Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or(1),
        _ => 1,
    };
    let iterations = u32::try_from(iterations).unwrap_or(1).max(1);

    encoding.encode(&value, iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_values_shape() {
        let values = parse_scope(
            &json!({"values": [
                {"key": "base_url", "value": "https://api.test", "enabled": true},
                {"key": "id", "value": "42"},
                {"key": "off", "value": "x", "enabled": false}
            ]}),
            "base_url",
        )
        .unwrap();

        assert_eq!(values.get("base_url").unwrap(), "https://api.test");
        assert_eq!(values.get("id").unwrap(), "42");
        assert!(!values.contains_key("off"));
    }

    #[test]
    fn test_environment_and_variables_shapes() {
        let env = parse_scope(
            &json!({"environment": {"values": [{"key": "a", "value": "1"}]}}),
            "base_url",
        )
        .unwrap();
        assert_eq!(env.get("a").unwrap(), "1");

        let vars = parse_scope(
            &json!({"variables": [{"key": "b", "value": 2, "disabled": false}]}),
            "base_url",
        )
        .unwrap();
        assert_eq!(vars.get("b").unwrap(), "2");
    }

    #[test]
    fn test_flat_map_skips_reserved_keys() {
        let values = parse_scope(
            &json!({
                "id": "scope-1",
                "name": "staging",
                "description": "meta",
                "_postman_exported_at": "2024",
                "base": "https://api.test",
                "retries": 3,
                "flag": true
            }),
            "base_url",
        )
        .unwrap();

        assert_eq!(values.len(), 3);
        assert_eq!(values.get("retries").unwrap(), "3");
        assert_eq!(values.get("flag").unwrap(), "true");
        assert!(!values.contains_key("name"));
    }

    #[test]
    fn test_encoding_applied() {
        let values = parse_scope(
            &json!({"variables": [
                {"key": "q", "value": "a b", "encoding": "url"},
                {"key": "twice", "value": "a b", "encoding": "url", "encoding_iterations": "2"},
                {"key": "zero", "value": "x", "encoding": "base64", "encoding_iterations": 0},
                {"key": "odd", "value": "x", "encoding": "rot13"}
            ]}),
            "base_url",
        )
        .unwrap();

        assert_eq!(values.get("q").unwrap(), "a%20b");
        assert_eq!(values.get("twice").unwrap(), "a%2520b");
        assert_eq!(values.get("zero").unwrap(), "eA==");
        assert_eq!(values.get("odd").unwrap(), "x");
    }

    #[test]
    fn test_anchor_never_encoded() {
        let values = parse_scope(
            &json!({"variables": [
                {"key": "base_url", "value": "https://api.test/v1", "encoding": "url"}
            ]}),
            "base_url",
        )
        .unwrap();
        assert_eq!(values.get("base_url").unwrap(), "https://api.test/v1");
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(matches!(
            parse_scope(&json!([1, 2]), "base_url"),
            Err(ScopeError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_scope(&json!({"values": "nope"}), "base_url"),
            Err(ScopeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_load_scope_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"base": "https://api.test", "id": "42"}}"#).unwrap();

        let values = load_scope(file.path(), "base_url").unwrap();
        assert_eq!(values.get("id").unwrap(), "42");
    }

    #[test]
    fn test_load_scope_malformed() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(
            load_scope(file.path(), "base_url"),
            Err(ScopeError::ParseError(_))
        ));
    }

    #[test]
    fn test_json_to_string() {
        assert_eq!(json_to_string(&json!("a")), "a");
        assert_eq!(json_to_string(&json!(null)), "");
        assert_eq!(json_to_string(&json!(1.5)), "1.5");
    }
}
