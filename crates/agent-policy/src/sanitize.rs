use serde_json::Value;
use thiserror::Error;

/// Failed sanitation check. Any of these forces a Deny verdict before tier
/// logic runs, so no autonomy level or scope can reach around it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitationError {
    #[error("argument {argument} contains a path traversal pattern")]
    PathTraversal { argument: String },
    #[error("argument {argument} contains control characters")]
    ControlCharacters { argument: String },
}

/// Walk every string in the argument map and reject traversal patterns and
/// control characters. Arguments are data, never instructions; nothing here
/// interprets them beyond these checks.
pub fn sanitize_arguments(arguments: &Value) -> Result<(), SanitationError> {
    check_value("arguments", arguments)
}

fn check_value(label: &str, value: &Value) -> Result<(), SanitationError> {
    match value {
        Value::String(text) => check_string(label, text),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                check_value(&format!("{label}[{index}]"), item)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (key, item) in map {
                check_string(key, key)?;
                check_value(key, item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_string(label: &str, text: &str) -> Result<(), SanitationError> {
    if has_traversal(text) {
        return Err(SanitationError::PathTraversal {
            argument: label.to_string(),
        });
    }
    if text
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\t')
    {
        return Err(SanitationError::ControlCharacters {
            argument: label.to_string(),
        });
    }
    Ok(())
}

/// A `..` path component anywhere in the string, under either separator.
fn has_traversal(text: &str) -> bool {
    text.split(['/', '\\']).any(|component| component == "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_plain_arguments() {
        let args = json!({ "path": "~/Documents/report.pdf", "note": "two\nlines" });
        assert!(sanitize_arguments(&args).is_ok());
    }

    #[test]
    fn rejects_traversal_in_any_position() {
        for candidate in [
            json!({ "path": "../../etc/passwd" }),
            json!({ "path": "/safe/prefix/../../etc/passwd" }),
            json!({ "paths": ["ok.txt", "..\\windows\\system32"] }),
            json!({ "nested": { "inner": ".." } }),
        ] {
            let err = sanitize_arguments(&candidate).unwrap_err();
            assert!(matches!(err, SanitationError::PathTraversal { .. }));
        }
    }

    #[test]
    fn rejects_control_characters() {
        let err = sanitize_arguments(&json!({ "text": "rm\u{1b}[2Jall" })).unwrap_err();
        assert!(matches!(err, SanitationError::ControlCharacters { .. }));
    }

    #[test]
    fn dotted_names_are_not_traversal() {
        assert!(sanitize_arguments(&json!({ "path": "notes..today.txt" })).is_ok());
        assert!(sanitize_arguments(&json!({ "path": "a.b/c.d" })).is_ok());
    }
}
