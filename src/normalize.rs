//! Input normalization.
//!
//! Converts heterogeneous caller input into an ordered `{id, data}` sequence
//! for batch processing. Callers may mix plain scalars with pre-addressed
//! records:
//!
//! ```
//! use promptbatch::normalize::normalize;
//! use serde_json::json;
//!
//! let records = normalize(&json!(["text", {"id": "custom", "data": "other"}])).unwrap();
//! assert_eq!(records[0].id, json!(0));
//! assert_eq!(records[1].id, json!("custom"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// One addressed unit of work.
///
/// `id` is unique only among auto-assigned entries; explicit caller ids are
/// preserved verbatim and never deduplicated. Order matches the caller's
/// input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Caller-supplied or auto-assigned identifier (integer or string).
    pub id: Value,
    /// The payload to process.
    pub data: Value,
}

/// Converts caller input into an ordered sequence of [`InputRecord`]s.
///
/// Rules, applied per element in order:
/// 1. an object with both `id` and `data` keys is preserved verbatim;
/// 2. an object with `id` but no `data` has the whole object wrapped as
///    `data`, keeping its id;
/// 3. an object without `id` is wrapped as `data` under a fresh auto-id;
/// 4. any scalar gets a fresh auto-id.
///
/// The auto-id counter starts at 0 and advances only when consumed by cases
/// (3) and (4); explicit ids never advance it.
///
/// # Errors
///
/// Returns [`EngineError::InvalidInput`] when `input` is not an array. This
/// is checked before any processing begins.
pub fn normalize(input: &Value) -> Result<Vec<InputRecord>, EngineError> {
    let Value::Array(items) = input else {
        return Err(EngineError::InvalidInput(format!(
            "input must be an array, got {}",
            type_name(input)
        )));
    };

    let mut records = Vec::with_capacity(items.len());
    let mut auto_id: u64 = 0;

    for item in items {
        match item {
            Value::Object(map) if map.contains_key("id") && map.contains_key("data") => {
                records.push(InputRecord {
                    id: map["id"].clone(),
                    data: map["data"].clone(),
                });
            }
            Value::Object(map) if map.contains_key("id") => {
                records.push(InputRecord {
                    id: map["id"].clone(),
                    data: item.clone(),
                });
            }
            _ => {
                records.push(InputRecord {
                    id: Value::from(auto_id),
                    data: item.clone(),
                });
                auto_id += 1;
            }
        }
    }

    Ok(records)
}

/// Lossy inverse of [`normalize`]: returns the `data` values in order,
/// discarding ids.
#[must_use]
pub fn denormalize(records: &[InputRecord]) -> Vec<Value> {
    records.iter().map(|r| r.data.clone()).collect()
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_scalars() {
        let records = normalize(&json!(["a", "b"])).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], InputRecord { id: json!(0), data: json!("a") });
        assert_eq!(records[1], InputRecord { id: json!(1), data: json!("b") });
    }

    #[test]
    fn test_normalize_preserves_explicit_records() {
        let records = normalize(&json!([{"id": "custom", "data": "text"}])).unwrap();
        assert_eq!(records[0].id, json!("custom"));
        assert_eq!(records[0].data, json!("text"));
    }

    #[test]
    fn test_normalize_id_without_data_wraps_whole_object() {
        let records = normalize(&json!([{"id": 7, "title": "report"}])).unwrap();
        assert_eq!(records[0].id, json!(7));
        assert_eq!(records[0].data, json!({"id": 7, "title": "report"}));
    }

    #[test]
    fn test_normalize_object_without_id_gets_auto_id() {
        let records = normalize(&json!([{"title": "report"}, "plain"])).unwrap();
        assert_eq!(records[0].id, json!(0));
        assert_eq!(records[0].data, json!({"title": "report"}));
        assert_eq!(records[1].id, json!(1));
    }

    #[test]
    fn test_auto_counter_skips_explicit_ids() {
        let records = normalize(&json!([
            "first",
            {"id": 99, "data": "explicit"},
            "second",
        ]))
        .unwrap();
        assert_eq!(records[0].id, json!(0));
        assert_eq!(records[1].id, json!(99));
        // Explicit ids never advance the counter.
        assert_eq!(records[2].id, json!(1));
    }

    #[test]
    fn test_normalize_mixed_scalars() {
        let records = normalize(&json!([1, true, null, "x"])).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![json!(0), json!(1), json!(2), json!(3)]);
        assert_eq!(records[2].data, Value::Null);
    }

    #[test]
    fn test_duplicate_explicit_ids_are_kept() {
        let records = normalize(&json!([
            {"id": "a", "data": 1},
            {"id": "a", "data": 2},
        ]))
        .unwrap();
        assert_eq!(records[0].id, records[1].id);
        assert_eq!(records[1].data, json!(2));
    }

    #[test]
    fn test_non_array_input_rejected() {
        let err = normalize(&json!("not a list")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn test_denormalize_round_trip() {
        let input = json!(["a", "b", "c"]);
        let records = normalize(&input).unwrap();
        assert_eq!(denormalize(&records), vec![json!("a"), json!("b"), json!("c")]);
    }
}
