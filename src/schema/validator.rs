//! Schema validation built on the `jsonschema` crate.
//!
//! The supported subset covers `type` (including nullable unions),
//! `required`, `properties`, `items`, `enum`, `minimum`/`maximum`,
//! `minItems`, and `format: "date"`. The date format is a syntactic
//! `YYYY-MM-DD` shape check only, not calendar correctness, registered as a
//! custom format so behavior matches the coercer's canonical output.

use serde::Serialize;
use serde_json::Value;

use crate::coerce::is_date_shaped;

/// One structured validation failure.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    /// Dotted path to the offending location (`root` for the whole value).
    pub path: String,
    /// Human-readable failure description.
    pub message: String,
    /// The schema keyword that failed (`type`, `required`, `minimum`, ...).
    pub validator_kind: String,
    /// The value that failed validation.
    pub offending_value: Value,
}

fn build_validator(schema: &Value) -> Result<jsonschema::Validator, String> {
    jsonschema::options()
        .should_validate_formats(true)
        .with_format("date", is_date_shaped)
        .build(schema)
        .map_err(|e| e.to_string())
}

/// Checks that a schema is itself structurally valid (compiles).
///
/// # Errors
///
/// Returns the compilation error message when the schema is malformed.
pub fn check_schema(schema: &Value) -> Result<(), String> {
    build_validator(schema).map(|_| ())
}

fn dotted_path(pointer: &str) -> String {
    if pointer.is_empty() {
        return "root".to_string();
    }
    pointer
        .split('/')
        .skip(1)
        .collect::<Vec<_>>()
        .join(".")
}

fn keyword(pointer: &str) -> String {
    pointer
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("schema")
        .to_string()
}

/// Validates a value against a schema, returning `(ok, first_error)`.
///
/// A malformed schema reports as invalid rather than panicking.
pub fn validate(value: &Value, schema: &Value) -> (bool, Option<String>) {
    let validator = match build_validator(schema) {
        Ok(v) => v,
        Err(message) => return (false, Some(format!("invalid schema: {message}"))),
    };
    let result = match validator.iter_errors(value).next() {
        None => (true, None),
        Some(error) => {
            let path = dotted_path(&error.instance_path.to_string());
            (false, Some(format!("validation error at '{path}': {error}")))
        }
    };
    result
}

/// Validates a value and collects **all** failures as structured errors.
///
/// An empty result means the value is valid; this is what drives the
/// extraction retry loop.
#[must_use]
pub fn validate_with_details(value: &Value, schema: &Value) -> Vec<ValidationError> {
    let validator = match build_validator(schema) {
        Ok(v) => v,
        Err(message) => {
            return vec![ValidationError {
                path: "root".to_string(),
                message: format!("schema compilation error: {message}"),
                validator_kind: "schema".to_string(),
                offending_value: value.clone(),
            }]
        }
    };

    validator
        .iter_errors(value)
        .map(|error| ValidationError {
            path: dotted_path(&error.instance_path.to_string()),
            message: error.to_string(),
            validator_kind: keyword(&error.schema_path.to_string()),
            offending_value: error.instance.clone().into_owned(),
        })
        .collect()
}

/// Reports whether a top-level field of an object schema admits null.
///
/// Top-level-only introspection; nested paths are not resolved.
#[must_use]
pub fn supports_nullable(schema: &Value, field: &str) -> bool {
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return false;
    }
    let Some(field_type) = schema
        .get("properties")
        .and_then(|p| p.get(field))
        .and_then(|f| f.get("type"))
    else {
        return false;
    };
    match field_type {
        Value::Array(members) => members.iter().any(|m| m.as_str() == Some("null")),
        _ => false,
    }
}

/// Returns the `required` field names of an object schema.
#[must_use]
pub fn required_fields(schema: &Value) -> Vec<String> {
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Vec::new();
    }
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "integer", "minimum": 0}
            },
            "required": ["name", "age"]
        })
    }

    #[test]
    fn test_validate_ok() {
        let (ok, error) = validate(&json!({"name": "John", "age": 30}), &person_schema());
        assert!(ok);
        assert!(error.is_none());
    }

    #[test]
    fn test_validate_reports_path() {
        let (ok, error) = validate(&json!({"name": 123, "age": 30}), &person_schema());
        assert!(!ok);
        let message = error.unwrap();
        assert!(message.contains("'name'"), "{message}");
    }

    #[test]
    fn test_validate_agrees_with_details() {
        let valid = json!({"name": "John", "age": 30});
        let invalid = json!({"age": -5});
        assert!(validate(&valid, &person_schema()).0);
        assert!(validate_with_details(&valid, &person_schema()).is_empty());
        assert!(!validate(&invalid, &person_schema()).0);
        assert!(!validate_with_details(&invalid, &person_schema()).is_empty());
    }

    #[test]
    fn test_details_collect_all_errors() {
        let errors = validate_with_details(&json!({"name": 1, "age": -5}), &person_schema());
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.path == "name" && e.validator_kind == "type"));
        assert!(errors.iter().any(|e| e.path == "age" && e.validator_kind == "minimum"));
        assert!(errors
            .iter()
            .any(|e| e.path == "age" && e.offending_value == json!(-5)));
    }

    #[test]
    fn test_required_reported_at_root() {
        let errors = validate_with_details(&json!({"age": 1}), &person_schema());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "root");
        assert_eq!(errors[0].validator_kind, "required");
    }

    #[test]
    fn test_nullable_union_and_min_items() {
        let schema = json!({
            "type": "object",
            "properties": {
                "note": {"type": ["string", "null"]},
                "authors": {"type": "array", "items": {"type": "string"}, "minItems": 1}
            }
        });
        assert!(validate(&json!({"note": null, "authors": ["a"]}), &schema).0);
        assert!(!validate(&json!({"authors": []}), &schema).0);
        assert!(!validate(&json!({"authors": [1]}), &schema).0);
    }

    #[test]
    fn test_date_format_is_shape_only() {
        let schema = json!({"type": "string", "format": "date"});
        assert!(validate(&json!("2025-10-17"), &schema).0);
        // Shape check only: an impossible calendar date still passes.
        assert!(validate(&json!("2025-13-99"), &schema).0);
        assert!(!validate(&json!("Oct 17, 2025"), &schema).0);
    }

    #[test]
    fn test_enum_validation() {
        let schema = json!({"enum": ["tech", "sports"]});
        assert!(validate(&json!("tech"), &schema).0);
        assert!(!validate(&json!("Tech"), &schema).0);
    }

    #[test]
    fn test_malformed_schema_is_an_error_not_a_panic() {
        let schema = json!({"type": 42});
        let (ok, error) = validate(&json!("x"), &schema);
        assert!(!ok);
        assert!(error.unwrap().contains("invalid schema"));
        assert!(check_schema(&schema).is_err());
        assert!(check_schema(&person_schema()).is_ok());
    }

    #[test]
    fn test_supports_nullable_top_level_only() {
        let schema = json!({
            "type": "object",
            "properties": {
                "name": {"type": ["string", "null"]},
                "age": {"type": "number"}
            }
        });
        assert!(supports_nullable(&schema, "name"));
        assert!(!supports_nullable(&schema, "age"));
        assert!(!supports_nullable(&schema, "missing"));
        assert!(!supports_nullable(&json!({"type": "array"}), "name"));
    }

    #[test]
    fn test_required_fields() {
        assert_eq!(required_fields(&person_schema()), vec!["name", "age"]);
        assert!(required_fields(&json!({"type": "string"})).is_empty());
    }
}
