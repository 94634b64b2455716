use serde_json::Value;
use thiserror::Error;

/// Violation raised when an argument map does not match a tool's declared
/// input schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("tool {tool} is not in the catalog")]
    UnknownTool { tool: String },
    #[error("arguments must be a JSON object")]
    NotAnObject,
    #[error("missing required argument {field}")]
    MissingField { field: String },
    #[error("argument {field} has the wrong type, expected {expected}")]
    WrongType { field: String, expected: String },
    #[error("argument {field} is not one of the allowed values")]
    OutsideEnum { field: String },
    #[error("argument {field} is not declared by the tool")]
    UnknownField { field: String },
}

/// Validate `arguments` against the subset of JSON Schema the catalog uses:
/// object type, `required`, per-property `type` and `enum`, and
/// `additionalProperties: false`. Anything the schema does not constrain
/// passes through untouched.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), SchemaViolation> {
    let Some(map) = arguments.as_object() else {
        return Err(SchemaViolation::NotAnObject);
    };
    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(field) {
                return Err(SchemaViolation::MissingField {
                    field: field.to_string(),
                });
            }
        }
    }

    let closed = schema
        .get("additionalProperties")
        .and_then(Value::as_bool)
        .map(|allowed| !allowed)
        .unwrap_or(false);

    for (field, value) in map {
        let Some(spec) = properties.and_then(|props| props.get(field)) else {
            if closed {
                return Err(SchemaViolation::UnknownField {
                    field: field.clone(),
                });
            }
            continue;
        };

        if let Some(expected) = spec.get("type").and_then(Value::as_str) {
            if !type_matches(expected, value) {
                return Err(SchemaViolation::WrongType {
                    field: field.clone(),
                    expected: expected.to_string(),
                });
            }
        }

        if let Some(allowed) = spec.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(SchemaViolation::OutsideEnum {
                    field: field.clone(),
                });
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}
