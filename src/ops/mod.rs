//! Operation strategies.
//!
//! The three execution algorithms are modeled as a tagged union over exactly
//! the operation variants a [`Template`] can declare; new variants are added
//! as new cases, not by editing a central dispatcher. An [`Operation`] is
//! built once per batch call from the template plus the caller's arguments
//! (loud shape errors happen here, before any backend call), then run
//! independently against each normalized item.

pub mod extraction;
pub mod multi_label;
pub mod single_choice;

pub use extraction::ExtractionOp;
pub use multi_label::MultiLabelOp;
pub use single_choice::SingleChoiceOp;

use serde_json::{Map, Value};

use crate::batch::ItemOutcome;
use crate::client::{ChatOptions, LlmClient};
use crate::error::EngineError;
use crate::resolve::display_value;
use crate::template::{OperationType, Template};

/// One of the three interchangeable execution algorithms, fully resolved
/// from a template and one call's arguments.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Pick exactly one option.
    SingleChoice(SingleChoiceOp),
    /// Pick zero or more options.
    MultiLabel(MultiLabelOp),
    /// Extract fields or a schema-shaped object.
    Extraction(ExtractionOp),
}

impl Operation {
    /// Resolves the operation for `template` from the caller's arguments.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when a required parameter is
    /// missing or malformed (fewer than two categories, empty tag set,
    /// neither fields nor schema supplied).
    pub fn build(template: &Template, args: &Value) -> Result<Self, EngineError> {
        match template.operation_type {
            OperationType::SingleChoice => {
                SingleChoiceOp::build(template, args).map(Self::SingleChoice)
            }
            OperationType::MultiLabel => MultiLabelOp::build(template, args).map(Self::MultiLabel),
            OperationType::Extraction => ExtractionOp::build(template, args).map(Self::Extraction),
        }
    }

    /// Runs the operation against one item's payload.
    ///
    /// # Errors
    ///
    /// Propagates backend failures; for extraction, only once the retry
    /// budget is exhausted.
    pub async fn run(
        &self,
        client: &dyn LlmClient,
        data: &Value,
    ) -> Result<ItemOutcome, EngineError> {
        match self {
            Self::SingleChoice(op) => op.run(client, data).await,
            Self::MultiLabel(op) => op.run(client, data).await,
            Self::Extraction(op) => op.run(client, data).await,
        }
    }
}

/// The `args` sub-object holding model overrides and operation options.
fn overrides(args: &Value) -> Option<&Map<String, Value>> {
    args.get("args").and_then(Value::as_object)
}

/// Resolves per-call model settings from the template with caller overrides.
pub(crate) fn chat_options(template: &Template, args: &Value) -> ChatOptions {
    let overrides = overrides(args);
    ChatOptions {
        model: overrides
            .and_then(|o| o.get("model"))
            .and_then(Value::as_str)
            .map_or_else(|| template.model_config.model.clone(), str::to_string),
        temperature: overrides
            .and_then(|o| o.get("temperature"))
            .and_then(Value::as_f64)
            .unwrap_or(template.model_config.temperature),
        max_tokens: overrides
            .and_then(|o| o.get("max_tokens"))
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(template.model_config.max_tokens),
    }
}

/// Builds the system prompt, appending the caller's extra instructions.
pub(crate) fn system_prompt(base: &str, args: &Value) -> String {
    match args.get("prompt").and_then(Value::as_str) {
        Some(extra) if !extra.is_empty() => format!("{base}\n\n{extra}"),
        _ => base.to_string(),
    }
}

/// Parses the choices list bound by the template's `choices_param`.
///
/// Accepts an array (members stringified) or a comma-separated string.
pub(crate) fn parse_choices(args: &Value, param: &str) -> Vec<String> {
    match args.get(param) {
        Some(Value::Array(items)) => items
            .iter()
            .map(display_value)
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn option_flag(args: &Value, key: &str) -> bool {
    overrides(args)
        .and_then(|o| o.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub(crate) fn option_usize(args: &Value, key: &str) -> Option<usize> {
    overrides(args)
        .and_then(|o| o.get(key))
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
}

/// Resolver values for an item: the payload under `text` plus the joined
/// choices under the template's binding name.
pub(crate) fn item_values(data: &Value, extra: &[(&str, String)]) -> Map<String, Value> {
    let mut values = Map::new();
    values.insert("text".to_string(), Value::String(display_value(data)));
    for (key, value) in extra {
        values.insert((*key).to_string(), Value::String(value.clone()));
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_options_overrides() {
        let template = crate::template::builtin_templates().remove(0);
        let args = json!({"args": {"model": "gpt-4o", "temperature": 0.7}});
        let options = chat_options(&template, &args);
        assert_eq!(options.model, "gpt-4o");
        assert!((options.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(options.max_tokens, template.model_config.max_tokens);
    }

    #[test]
    fn test_system_prompt_appends_custom() {
        let args = json!({"prompt": "Focus on tone."});
        assert_eq!(system_prompt("Base.", &args), "Base.\n\nFocus on tone.");
        assert_eq!(system_prompt("Base.", &json!({})), "Base.");
    }

    #[test]
    fn test_parse_choices_array_and_string() {
        let args = json!({"categories": ["tech", "sports"]});
        assert_eq!(parse_choices(&args, "categories"), vec!["tech", "sports"]);

        let args = json!({"categories": "tech, sports , news"});
        assert_eq!(
            parse_choices(&args, "categories"),
            vec!["tech", "sports", "news"]
        );

        assert!(parse_choices(&json!({}), "categories").is_empty());
    }
}
