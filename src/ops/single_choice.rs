//! Single-choice operation: pick exactly one option from a list.

use serde_json::{json, Value};

use crate::batch::ItemOutcome;
use crate::client::{ChatMessage, ChatOptions, LlmClient};
use crate::error::EngineError;
use crate::resolve;
use crate::template::Template;

use super::{chat_options, item_values, option_flag, parse_choices, system_prompt};

/// Resolved single-choice operation.
///
/// The backend is asked to return exactly one token, matched against the
/// allowed set case-insensitively. An unmatched reply is surfaced as-is
/// rather than silently defaulted; callers needing a guaranteed set member
/// must check the result themselves.
#[derive(Debug, Clone)]
pub struct SingleChoiceOp {
    system: String,
    user_template: String,
    choices_param: String,
    choices: Vec<String>,
    with_scores: bool,
    options: ChatOptions,
}

impl SingleChoiceOp {
    /// Resolves the operation from a template and call arguments.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when fewer than two choices are
    /// supplied.
    pub fn build(template: &Template, args: &Value) -> Result<Self, EngineError> {
        let Some(param) = template.choices_param.clone() else {
            return Err(EngineError::InvalidTemplate {
                tool: template.name.clone(),
                message: "single-choice template has no choices_param".to_string(),
            });
        };
        let choices = parse_choices(args, &param);
        if choices.len() < 2 {
            return Err(EngineError::InvalidInput(format!(
                "'{param}' must have at least 2 items"
            )));
        }

        Ok(Self {
            system: system_prompt(&template.prompt_templates.system, args),
            user_template: template.prompt_templates.user.clone(),
            choices_param: param,
            choices,
            with_scores: option_flag(args, "with_scores"),
            options: chat_options(template, args),
        })
    }

    /// Classifies one item.
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
        let label = self.match_choice(reply.trim());
        tracing::debug!(label = %label, "single-choice resolved");

        let result = if self.with_scores {
            json!({"label": label, "score": 1.0})
        } else {
            Value::String(label)
        };
        Ok(ItemOutcome::ok(result))
    }

    /// Exact match first, then case-insensitive; otherwise the raw reply.
    fn match_choice(&self, reply: &str) -> String {
        if self.choices.iter().any(|c| c == reply) {
            return reply.to_string();
        }
        let lowered = reply.to_lowercase();
        self.choices
            .iter()
            .find(|c| c.to_lowercase() == lowered)
            .cloned()
            .unwrap_or_else(|| reply.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::builtin_templates;
    use serde_json::json;

    fn classify_template() -> Template {
        builtin_templates().remove(0)
    }

    #[test]
    fn test_build_requires_two_choices() {
        let template = classify_template();
        let err =
            SingleChoiceOp::build(&template, &json!({"categories": ["only-one"]})).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(err.to_string().contains("categories"));
    }

    #[test]
    fn test_build_accepts_comma_separated_choices() {
        let template = classify_template();
        let op = SingleChoiceOp::build(&template, &json!({"categories": "tech, sports"})).unwrap();
        assert_eq!(op.choices, vec!["tech", "sports"]);
    }

    #[test]
    fn test_match_choice_case_insensitive() {
        let template = classify_template();
        let op =
            SingleChoiceOp::build(&template, &json!({"categories": ["tech", "sports"]})).unwrap();
        assert_eq!(op.match_choice("Tech"), "tech");
        assert_eq!(op.match_choice("sports"), "sports");
        // No-match policy: the raw reply is surfaced as-is.
        assert_eq!(op.match_choice("politics"), "politics");
    }
}
