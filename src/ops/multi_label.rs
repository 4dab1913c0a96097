//! Multi-label operation: pick zero or more options from a list.

use serde_json::{json, Value};

use crate::batch::ItemOutcome;
use crate::client::{ChatMessage, ChatOptions, LlmClient};
use crate::error::EngineError;
use crate::resolve;
use crate::template::Template;

use super::{chat_options, item_values, option_flag, option_usize, parse_choices, system_prompt};

/// Resolved multi-label operation.
///
/// The backend returns a delimited subset; the result is filtered to members
/// of the allowed set (case-insensitive) and optionally truncated to
/// `max_labels`. When scores are requested the labels are re-expressed as
/// `{label, score}` pairs with synthetic rank-based scores: these are
/// positional approximations, not calibrated model confidence.
#[derive(Debug, Clone)]
pub struct MultiLabelOp {
    system: String,
    user_template: String,
    choices_param: String,
    choices: Vec<String>,
    max_labels: Option<usize>,
    with_scores: bool,
    options: ChatOptions,
}

impl MultiLabelOp {
    /// Resolves the operation from a template and call arguments.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when the choice set is empty.
    pub fn build(template: &Template, args: &Value) -> Result<Self, EngineError> {
        let Some(param) = template.choices_param.clone() else {
            return Err(EngineError::InvalidTemplate {
                tool: template.name.clone(),
                message: "multi-label template has no choices_param".to_string(),
            });
        };
        let choices = parse_choices(args, &param);
        if choices.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "'{param}' must have at least 1 item"
            )));
        }

        let max_labels = option_usize(args, "max_labels");
        let mut system = system_prompt(&template.prompt_templates.system, args);
        if let Some(max) = max_labels {
            system.push_str(&format!("\n\nReturn at most {max} labels."));
        }

        Ok(Self {
            system,
            user_template: template.prompt_templates.user.clone(),
            choices_param: param,
            choices,
            max_labels,
            with_scores: option_flag(args, "with_scores"),
            options: chat_options(template, args),
        })
    }

    /// Tags one item.
    pub async fn run(
        &self,
        client: &dyn LlmClient,
        data: &Value,
    ) -> Result<ItemOutcome, EngineError> {
        let values = item_values(data, &[(&self.choices_param, self.choices.join(", "))]);
        let user = resolve::resolve(&self.user_template, &values, "");
        let messages = [
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(user),
        ];

        let reply = client.chat(&messages, &self.options).await?;
        let labels = self.parse_labels(&reply);
        tracing::debug!(count = labels.len(), "multi-label resolved");

        let result = if self.with_scores {
            Value::Array(scored(&labels))
        } else {
            Value::Array(labels.into_iter().map(Value::String).collect())
        };
        Ok(ItemOutcome::ok(result))
    }

    /// Splits a comma-delimited reply, keeps members of the allowed set in
    /// their canonical casing, and truncates to `max_labels`.
    fn parse_labels(&self, reply: &str) -> Vec<String> {
        let mut matched: Vec<String> = reply
            .split(',')
            .map(str::trim)
            .filter_map(|label| {
                let lowered = label.to_lowercase();
                self.choices
                    .iter()
                    .find(|c| c.to_lowercase() == lowered)
                    .cloned()
            })
            .collect();

        if let Some(max) = self.max_labels {
            matched.truncate(max);
        }
        matched
    }
}

/// Rank-based relevance scores: position `i` of `n` scores `(n - i) / n`.
#[allow(clippy::cast_precision_loss)]
fn scored(labels: &[String]) -> Vec<Value> {
    let n = labels.len() as f64;
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| json!({"label": label, "score": (n - i as f64) / n}))
        .collect()
}
