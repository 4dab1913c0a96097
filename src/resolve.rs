//! Field reference resolution for prompt templates.
//!
//! Prompt templates reference named inputs with `{$name}` placeholders:
//!
//! ```
//! use promptbatch::resolve::resolve;
//! use serde_json::{json, Map};
//!
//! let mut values = Map::new();
//! values.insert("name".into(), json!("John"));
//! let prompt = resolve("Name: {$name}, City: {$city}", &values, "N/A");
//! assert_eq!(prompt, "Name: John, City: N/A");
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a literal
        Regex::new(r"\{\$(\w+)\}").unwrap()
    })
}

/// Renders a JSON value the way it should appear inside a prompt.
///
/// Strings render without surrounding quotes; null renders empty; everything
/// else uses its compact JSON form.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extracts every `{$name}` reference from `template`, deduplicated, in
/// first-occurrence order.
#[must_use]
pub fn extract_references(template: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for capture in reference_pattern().captures_iter(template) {
        let name = &capture[1];
        if !seen.iter().any(|s| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}

/// Replaces each `{$name}` reference with the display form of its value, or
/// `default` when the value is missing or null.
///
/// Never fails, and does not re-scan substituted text for further
/// references.
#[must_use]
pub fn resolve(template: &str, values: &Map<String, Value>, default: &str) -> String {
    reference_pattern()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match values.get(&caps[1]) {
                None | Some(Value::Null) => default.to_string(),
                Some(value) => display_value(value),
            }
        })
        .into_owned()
}

/// Checks that every reference in `template` has a value.
///
/// Returns `(all_present, missing_names)`.
#[must_use]
pub fn validate_fields(template: &str, values: &Map<String, Value>) -> (bool, Vec<String>) {
    let missing: Vec<String> = extract_references(template)
        .into_iter()
        .filter(|name| !values.contains_key(name))
        .collect();
    (missing.is_empty(), missing)
}

/// Returns true when `template` contains at least one `{$name}` reference.
#[must_use]
pub fn has_references(template: &str) -> bool {
    reference_pattern().is_match(template)
}

/// Renders an input map as a `key: value` context block, one field per line.
#[must_use]
pub fn field_context(values: &Map<String, Value>) -> String {
    values
        .iter()
        .map(|(key, value)| format!("{key}: {}", display_value(value)))
        .collect::<Vec<_>>()
        .join("\n")
}
