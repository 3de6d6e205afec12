//! Structural argument checks against a tool's declared input schema.
//!
//! Only the subset the registry relies on is enforced: the top-level
//! `type`, `required` keys, and the `type` of each declared property.
//! Anything richer is left to the handler's own deserialization.

use serde_json::Value;

/// Check `args` against `schema`. The error names the first violation.
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    if let Some(expected) = schema.get("type") {
        if !type_matches(expected, args) {
            return Err(format!(
                "expected {}, got {}",
                describe_type(expected),
                json_type_name(args)
            ));
        }
    }

    let Some(obj) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(key) {
                return Err(format!("missing required field '{key}'"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (key, prop_schema) in props {
            let (Some(value), Some(expected)) = (obj.get(key), prop_schema.get("type")) else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(format!(
                    "field '{key}' expected {}, got {}",
                    describe_type(expected),
                    json_type_name(value)
                ));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => is_type(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| is_type(name, value)),
        // Unrecognized `type` keyword shapes are not enforced.
        _ => true,
    }
}

fn is_type(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        other => other.to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
