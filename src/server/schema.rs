//! Argument validation against a tool's declared input schema
//!
//! Supports the schema subset the tool descriptors use: `type`,
//! `properties`, `required`, `items`, `enum`, `default`, `description`.
//! Unknown properties are tolerated but dropped; defaults are injected for
//! absent optional fields; the first offending field is named in the error.

use crate::error::{McpError, Result};
use serde_json::{Map, Value};

/// Validate `args` against `schema` and produce the argument map handed to
/// the handler.
pub fn validate(args: &Value, schema: &Value) -> Result<Map<String, Value>> {
    let input = match args {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(McpError::Validation(format!(
                "arguments must be an object, got {}",
                type_name(other)
            )))
        }
    };

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    // Missing required fields are the most common failure; report the name.
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required {
            let name = field.as_str().unwrap_or_default();
            if !input.contains_key(name) {
                return Err(McpError::Validation(format!(
                    "missing required parameter: {}",
                    name
                )));
            }
        }
    }

    let mut output = Map::new();
    for (name, prop_schema) in &properties {
        match input.get(name) {
            Some(value) => {
                check_value(name, value, prop_schema)?;
                output.insert(name.clone(), value.clone());
            }
            None => {
                if let Some(default) = prop_schema.get("default") {
                    output.insert(name.clone(), default.clone());
                }
            }
        }
    }

    Ok(output)
}

fn check_value(name: &str, value: &Value, schema: &Value) -> Result<()> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(value, expected) {
            return Err(McpError::Validation(format!(
                "parameter '{}' must be {}, got {}",
                name,
                expected,
                type_name(value)
            )));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(render).collect();
            return Err(McpError::Validation(format!(
                "parameter '{}' must be one of [{}]",
                name,
                options.join(", ")
            )));
        }
    }

    if let (Some(items), Value::Array(elements)) = (schema.get("items"), value) {
        for (index, element) in elements.iter().enumerate() {
            check_value(&format!("{}[{}]", name, index), element, items)?;
        }
    }

    if let (Some(Value::Object(props)), Value::Object(fields)) =
        (schema.get("properties"), value)
    {
        for (key, sub_schema) in props {
            if let Some(sub_value) = fields.get(key) {
                check_value(&format!("{}.{}", name, key), sub_value, sub_schema)?;
            }
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => {
            // Accept exact floats like 2.0 that JSON clients commonly send.
            value.is_i64()
                || value.is_u64()
                || value
                    .as_f64()
                    .map(|f| f.fract() == 0.0 && f.is_finite())
                    .unwrap_or(false)
        }
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fetch a required string out of a validated argument map.
pub fn required_str<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::Validation(format!("missing required parameter: {}", name)))
}

/// Fetch an optional string.
pub fn optional_str<'a>(args: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

/// Fetch an optional integer, accepting exact floats.
pub fn optional_u64(args: &Map<String, Value>, name: &str) -> Option<u64> {
    let value = args.get(name)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f as u64))
}

/// Fetch an optional boolean with a fallback.
pub fn bool_or(args: &Map<String, Value>, name: &str, default: bool) -> bool {
    args.get(name).and_then(Value::as_bool).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "limit": {"type": "integer", "default": 100},
                "kind": {"type": "string", "enum": ["text", "filename", "any"], "default": "any"},
                "globs": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["path"]
        })
    }

    #[test]
    fn test_missing_required_names_field() {
        let err = validate(&json!({}), &schema()).unwrap_err();
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn test_defaults_injected() {
        let args = validate(&json!({"path": "/tmp/a"}), &schema()).unwrap();
        assert_eq!(args["limit"], json!(100));
        assert_eq!(args["kind"], json!("any"));
    }

    #[test]
    fn test_unknown_properties_dropped() {
        let args = validate(&json!({"path": "/tmp/a", "bogus": 1}), &schema()).unwrap();
        assert!(!args.contains_key("bogus"));
    }

    #[test]
    fn test_wrong_type_names_field() {
        let err = validate(&json!({"path": 42}), &schema()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("path"));
        assert!(msg.contains("string"));
    }

    #[test]
    fn test_enum_rejects_unlisted_value() {
        let err = validate(&json!({"path": "/tmp/a", "kind": "fuzzy"}), &schema()).unwrap_err();
        assert!(err.to_string().contains("kind"));
    }

    #[test]
    fn test_integer_accepts_exact_float() {
        let args = validate(&json!({"path": "/tmp/a", "limit": 5.0}), &schema()).unwrap();
        assert_eq!(optional_u64(&args, "limit"), Some(5));
    }

    #[test]
    fn test_integer_rejects_fractional() {
        let err = validate(&json!({"path": "/tmp/a", "limit": 5.5}), &schema()).unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn test_array_items_checked() {
        let err =
            validate(&json!({"path": "/tmp/a", "globs": ["*.rs", 3]}), &schema()).unwrap_err();
        assert!(err.to_string().contains("globs[1]"));
    }

    #[test]
    fn test_null_args_ok_when_nothing_required() {
        let schema = json!({"type": "object", "properties": {}});
        assert!(validate(&Value::Null, &schema).is_ok());
    }

    #[test]
    fn test_non_object_args_rejected() {
        let err = validate(&json!([1, 2]), &schema()).unwrap_err();
        assert!(err.to_string().contains("object"));
    }
}
