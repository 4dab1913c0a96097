//! Extraction operation: the validate/coerce/retry state machine.
//!
//! Schema-based ("structured") extraction asks the backend's
//! structured-output capability for a best-effort object, coerces it toward
//! the schema, validates it, and on failure feeds the validation errors back
//! into the conversation for another attempt. Feedback is appended to the
//! growing user prompt; prior feedback is never removed, so the backend sees
//! the full correction history. Once the attempt budget is exhausted the
//! best-effort (still invalid) result is returned with a non-fatal warning
//! rather than discarding the item.
//!
//! Simple ("fields") extraction makes exactly one attempt and falls back to
//! a line-by-line `field: value` scan when the reply is not a JSON object.

use serde_json::{Map, Value};

use crate::batch::ItemOutcome;
use crate::client::{ChatMessage, ChatOptions, LlmClient};
use crate::coerce;
use crate::error::EngineError;
use crate::resolve;
use crate::schema;
use crate::template::Template;

use super::{chat_options, item_values, system_prompt};

/// Default retry budget: up to two retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: usize = 2;

/// Resolved extraction operation.
#[derive(Debug, Clone)]
pub struct ExtractionOp {
    system: String,
    structured_system: String,
    user_template: String,
    fields: Option<Vec<String>>,
    schema: Option<Value>,
    max_retries: usize,
    enable_coercion: bool,
    options: ChatOptions,
}

impl ExtractionOp {
    /// Resolves the operation from a template and call arguments.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when neither a non-empty
    /// `fields` list nor a `response_format` schema is supplied.
    pub fn build(template: &Template, args: &Value) -> Result<Self, EngineError> {
        let fields: Option<Vec<String>> = args
            .get("fields")
            .and_then(Value::as_array)
            .map(|names| names.iter().map(resolve::display_value).collect());
        let schema = args.get("response_format").cloned().filter(Value::is_object);

        if schema.is_none() && fields.as_ref().is_none_or(Vec::is_empty) {
            return Err(EngineError::InvalidInput(
                "either 'fields' or 'response_format' parameter is required".to_string(),
            ));
        }
        if let Some(schema) = &schema {
            schema::check_schema(schema).map_err(|message| {
                EngineError::InvalidInput(format!("'response_format' is not a valid schema: {message}"))
            })?;
        }

        let system = system_prompt(&template.prompt_templates.system, args);
        let structured_base = template
            .prompt_templates
            .structured_system
            .as_deref()
            .unwrap_or(&template.prompt_templates.system);

        Ok(Self {
            system,
            structured_system: system_prompt(structured_base, args),
            user_template: template.prompt_templates.user.clone(),
            fields,
            schema,
            max_retries: super::option_usize(args, "max_retries").unwrap_or(DEFAULT_MAX_RETRIES),
            enable_coercion: super::overrides(args)
                .and_then(|o| o.get("enable_coercion"))
                .and_then(Value::as_bool)
                .unwrap_or(true),
            options: chat_options(template, args),
        })
    }

    /// Extracts from one item.
    pub async fn run(
        &self,
        client: &dyn LlmClient,
        data: &Value,
    ) -> Result<ItemOutcome, EngineError> {
        match (&self.schema, &self.fields) {
            (Some(schema), _) => self.extract_structured(client, schema, data).await,
            (None, Some(fields)) => self.extract_fields(client, fields, data).await,
            (None, None) => Err(EngineError::InvalidInput(
                "either 'fields' or 'response_format' parameter is required".to_string(),
            )),
        }
    }

    /// The retry loop. Transport failures and validation failures share one
    /// attempt budget; only a transport failure on the final attempt
    /// propagates as an error for this item.
    async fn extract_structured(
        &self,
        client: &dyn LlmClient,
        target: &Value,
        data: &Value,
    ) -> Result<ItemOutcome, EngineError> {
        let schema_text = serde_json::to_string_pretty(target)
            .unwrap_or_else(|_| target.to_string());
        let mut user = format!(
            "Schema:\n{schema_text}\n\nText:\n{}\n\nExtracted data (as JSON):",
            resolve::display_value(data)
        );

        let mut attempt = 0;
        loop {
            let messages = [
                ChatMessage::system(self.structured_system.clone()),
                ChatMessage::user(user.clone()),
            ];

            let raw = match client.structured_output(&messages, target, &self.options).await {
                Ok(value) => value,
                Err(error) => {
                    if attempt >= self.max_retries {
                        return Err(error.into());
                    }
                    tracing::debug!(attempt, error = %error, "backend call failed, retrying");
                    attempt += 1;
                    continue;
                }
            };

            let candidate = if self.enable_coercion {
                coerce::coerce_object_to_schema(&raw, target)
            } else {
                raw
            };

            let errors = schema::validate_with_details(&candidate, target);
            if errors.is_empty() {
                return Ok(ItemOutcome::ok(candidate));
            }

            if attempt >= self.max_retries {
                // Budget exhausted: flagged, partial data beats a discarded item.
                let warning = format!(
                    "schema validation failed after {} attempts: {}",
                    attempt + 1,
                    errors
                        .iter()
                        .map(|e| format!("{}: {}", e.path, e.message))
                        .collect::<Vec<_>>()
                        .join("; ")
                );
                tracing::warn!(attempts = attempt + 1, "returning best-effort invalid result");
                return Ok(ItemOutcome {
                    value: candidate,
                    warning: Some(warning),
                });
            }

            tracing::debug!(attempt, errors = errors.len(), "validation failed, retrying");
            // Feedback accumulates; prior attempts stay in the prompt.
            user.push_str("\n\n");
            user.push_str(&schema::error_feedback(&errors));
            attempt += 1;
        }
    }

    /// One-shot flat extraction keyed by field names.
    async fn extract_fields(
        &self,
        client: &dyn LlmClient,
        fields: &[String],
        data: &Value,
    ) -> Result<ItemOutcome, EngineError> {
        let values = item_values(data, &[("fields", fields.join(", "))]);
        let user = resolve::resolve(&self.user_template, &values, "");
        let messages = [
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(user),
        ];

        let reply = client.chat(&messages, &self.options).await?;
        let result = match serde_json::from_str::<Value>(reply.trim()) {
            Ok(value @ Value::Object(_)) => value,
            _ => scan_field_lines(&reply, fields),
        };
        Ok(ItemOutcome::ok(result))
    }
}

/// Best-effort fallback: scan the reply line-by-line for `field: value`
/// patterns (case-insensitive on the field name).
fn scan_field_lines(reply: &str, fields: &[String]) -> Value {
    let mut result = Map::new();
    for line in reply.lines() {
        let trimmed = line.trim();
        for field in fields {
            let prefix = format!("{field}:");
            if trimmed.len() >= prefix.len()
                && trimmed.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
            {
                let value = trimmed[prefix.len()..].trim();
                result.insert(field.clone(), Value::String(value.to_string()));
                break;
            }
        }
    }
    Value::Object(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::builtin_templates;
    use serde_json::json;

    fn extract_template() -> Template {
        builtin_templates().remove(2)
    }

    #[test]
    fn test_build_requires_fields_or_schema() {
        let err = ExtractionOp::build(&extract_template(), &json!({})).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let err = ExtractionOp::build(&extract_template(), &json!({"fields": []})).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_build_defaults() {
        let op = ExtractionOp::build(
            &extract_template(),
            &json!({"fields": ["name", "date"]}),
        )
        .unwrap();
        assert_eq!(op.max_retries, DEFAULT_MAX_RETRIES);
        assert!(op.enable_coercion);
        assert_eq!(op.fields.as_deref().unwrap(), ["name", "date"]);
    }

    #[test]
    fn test_build_rejects_malformed_schema() {
        let err = ExtractionOp::build(
            &extract_template(),
            &json!({"response_format": {"type": 42}}),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_structured_system_prompt_used_when_declared() {
        let op = ExtractionOp::build(
            &extract_template(),
            &json!({"response_format": {"type": "object"}, "prompt": "Be terse."}),
        )
        .unwrap();
        assert!(op.structured_system.contains("matching the provided schema"));
        assert!(op.structured_system.ends_with("Be terse."));
    }

    #[test]
    fn test_scan_field_lines() {
        let reply = "Name: John Doe\nirrelevant\nAGE: 30\n  date:  2025-01-01";
        let fields = vec!["name".to_string(), "age".to_string(), "date".to_string()];
        let result = scan_field_lines(reply, &fields);
        assert_eq!(result["name"], "John Doe");
        assert_eq!(result["age"], "30");
        assert_eq!(result["date"], "2025-01-01");
    }

    #[test]
    fn test_scan_field_lines_missing_fields_absent() {
        let result = scan_field_lines("nothing useful", &["name".to_string()]);
        assert_eq!(result, json!({}));
    }
}
