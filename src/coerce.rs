//! Type coercion toward JSON-Schema primitive types.
//!
//! The backend returns loosely-typed strings; these pure functions nudge
//! values toward what a schema declares before validation runs. Coercion is
//! advisory: a failed coercion returns the original value unchanged and the
//! subsequent validation step is the authority on whether the value is
//! acceptable.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value};

/// Currency symbols and thousands separators stripped before number parsing.
const NUMBER_NOISE: [char; 5] = ['$', ',', '€', '£', '¥'];

/// Calendar patterns tried in order by [`to_date`], date-only forms.
const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",  // 2025-10-17
    "%m/%d/%Y",  // 10/17/2025
    "%d/%m/%Y",  // 17/10/2025
    "%Y/%m/%d",  // 2025/10/17
    "%b %d, %Y", // Oct 17, 2025
    "%B %d, %Y", // October 17, 2025
    "%d %b %Y",  // 17 Oct 2025
    "%d %B %Y",  // 17 October 2025
];

/// Datetime patterns tried after [`DATE_FORMATS`]; the time part is dropped.
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Coerces a value to a JSON number.
///
/// Strips currency symbols and thousands separators; a trailing `%` divides
/// the parsed value by 100. Integer vs float is chosen by the presence of a
/// decimal point. Returns `None` when unparseable.
#[must_use]
pub fn to_number(value: &Value) -> Option<Value> {
    let text = match value {
        Value::Number(_) => return Some(value.clone()),
        Value::String(s) => s.trim(),
        _ => return None,
    };
    let cleaned: String = text.chars().filter(|c| !NUMBER_NOISE.contains(c)).collect();

    if cleaned.contains('%') {
        let stripped = cleaned.replace('%', "");
        let parsed: f64 = stripped.trim().parse().ok()?;
        return Number::from_f64(parsed / 100.0).map(Value::Number);
    }

    if cleaned.contains('.') {
        let parsed: f64 = cleaned.parse().ok()?;
        Number::from_f64(parsed).map(Value::Number)
    } else {
        let parsed: i64 = cleaned.parse().ok()?;
        Some(Value::from(parsed))
    }
}

/// Coerces a value to a canonical `YYYY-MM-DD` date string.
///
/// Values already in `YYYY-MM-DD` shape pass through unchanged (shape check
/// only; calendar correctness is the validator's concern), which makes this
/// idempotent on its own output. Returns `None` when no pattern matches.
#[must_use]
pub fn to_date(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };

    if is_date_shaped(&text) {
        return Some(text);
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&text, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(&text, format) {
            return Some(datetime.date().format("%Y-%m-%d").to_string());
        }
    }

    None
}

/// Syntactic `YYYY-MM-DD` shape check, shared with the schema validator's
/// `format: "date"` assertion.
#[must_use]
pub fn is_date_shaped(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| matches!(i, 4 | 7) || b.is_ascii_digit())
}

/// Coerces a value to a boolean.
///
/// Accepts native booleans, numbers (non-zero is true), and fixed
/// case-insensitive token sets (yes/no, true/false, y/n, t/f, on/off, 1/0,
/// enabled/disabled). Returns `None` otherwise.
#[must_use]
pub fn to_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => {
            let token = s.trim().to_lowercase();
            match token.as_str() {
                "true" | "yes" | "y" | "1" | "t" | "on" | "enabled" => Some(true),
                "false" | "no" | "n" | "0" | "f" | "off" | "disabled" => Some(false),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Dispatches to the scalar coercers by JSON-Schema primitive name.
///
/// `"string"` always succeeds via stringification; unknown type names pass
/// the value through unchanged. A failed coercion returns the original
/// value.
#[must_use]
pub fn to_type(value: &Value, type_name: &str) -> Value {
    match type_name {
        "string" => Value::String(crate::resolve::display_value(value)),
        "number" | "integer" => to_number(value).unwrap_or_else(|| value.clone()),
        "boolean" => to_boolean(value).map_or_else(|| value.clone(), Value::Bool),
        "null" => Value::Null,
        _ => value.clone(),
    }
}

/// Matches a value against an allowed set: exact match first, then
/// case-insensitive string match. Returns the canonical member on success.
#[must_use]
pub fn coerce_enum(value: &Value, allowed: &[Value]) -> Option<Value> {
    if allowed.contains(value) {
        return Some(value.clone());
    }
    if let Value::String(s) = value {
        let lowered = s.to_lowercase();
        for candidate in allowed {
            if let Value::String(c) = candidate {
                if c.to_lowercase() == lowered {
                    return Some(candidate.clone());
                }
            }
        }
    }
    None
}

/// Coerces each property of an object toward its declared schema type.
///
/// Drives the extraction retry loop: the backend's best-effort object is run
/// through this before validation. Per property:
/// - a nullable union type (`[T, "null"]`) short-circuits to null when the
///   value is null, otherwise coerces toward the first non-null member;
/// - `enum` and `format: "date"` declarations take precedence over the plain
///   primitive coercion;
/// - properties absent from the schema pass through untouched.
///
/// Non-objects and non-object schemas pass through unchanged.
#[must_use]
pub fn coerce_object_to_schema(data: &Value, schema: &Value) -> Value {
    let (Value::Object(map), Some(properties)) = (
        data,
        (schema.get("type").and_then(Value::as_str) == Some("object"))
            .then(|| schema.get("properties").and_then(Value::as_object))
            .flatten(),
    ) else {
        return data.clone();
    };

    let mut coerced = Map::with_capacity(map.len());
    for (key, value) in map {
        let Some(prop_schema) = properties.get(key) else {
            coerced.insert(key.clone(), value.clone());
            continue;
        };
        coerced.insert(key.clone(), coerce_property(value, prop_schema));
    }
    Value::Object(coerced)
}

fn coerce_property(value: &Value, prop_schema: &Value) -> Value {
    // Nullable unions: null short-circuits before any scalar coercion.
    let declared = prop_schema.get("type");
    let type_name = match declared {
        Some(Value::Array(members)) => {
            let nullable = members.iter().any(|m| m.as_str() == Some("null"));
            if value.is_null() && nullable {
                return Value::Null;
            }
            members
                .iter()
                .filter_map(Value::as_str)
                .find(|name| *name != "null")
        }
        Some(Value::String(name)) => Some(name.as_str()),
        _ => None,
    };

    if let Some(allowed) = prop_schema.get("enum").and_then(Value::as_array) {
        return coerce_enum(value, allowed).unwrap_or_else(|| value.clone());
    }
    if prop_schema.get("format").and_then(Value::as_str) == Some("date") {
        return to_date(value).map_or_else(|| value.clone(), Value::String);
    }
    type_name.map_or_else(|| value.clone(), |name| to_type(value, name))
}
