//! Declarative tool templates.
//!
//! A [`Template`] describes everything needed to run one tool: its prompts,
//! model settings, parameter shape, and output schema. Templates are parsed
//! from JSON descriptors (or built in code), validated once at load time,
//! and immutable thereafter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::EngineError;
use crate::schema;

/// The algorithm family applied to a tool's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Pick exactly one option from a list (classify, categorize).
    SingleChoice,
    /// Pick zero or more options from a list (tag, label).
    MultiLabel,
    /// Extract fields or a structured object from text.
    Extraction,
}

/// Prompt templates with `{$name}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplates {
    /// System prompt with instructions.
    pub system: String,
    /// User prompt template; `{$text}` carries the item payload.
    pub user: String,
    /// Alternative system prompt used for schema-based structured output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_system: Option<String>,
}

/// Model settings declared by the template; callers may override per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier understood by the backend.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f64,
    /// Maximum tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

const fn default_max_tokens() -> u32 {
    1000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }
}

/// Declared shape of one tool input parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    /// JSON-Schema type name (`array`, `object`, `string`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Parameter description surfaced to callers.
    #[serde(default)]
    pub description: String,
    /// Whether the parameter must be supplied.
    #[serde(default)]
    pub required: bool,
    /// Item schema for array parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
    /// Property schemas for object parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Minimum array length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
}

/// Declarative descriptor of one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Unique tool identifier.
    pub name: String,
    /// Which execution strategy runs this tool.
    pub operation_type: OperationType,
    /// Tool description for callers.
    pub description: String,
    /// Prompt templates.
    pub prompt_templates: PromptTemplates,
    /// Model settings.
    #[serde(default)]
    pub model_config: ModelConfig,
    /// Input parameter definitions, keyed by parameter name.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamDef>,
    /// Explicit name of the parameter holding the category/tag list.
    ///
    /// Required for single-choice and multi-label tools; declared by the
    /// template author rather than guessed from the parameter shapes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices_param: Option<String>,
    /// Expected output JSON schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl Template {
    /// Validates the descriptor at load time.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSchema`] when the declared output
    /// schema does not compile, and [`EngineError::InvalidTemplate`] when an
    /// operation-mandated parameter binding is missing.
    pub fn validate(&self) -> Result<(), EngineError> {
        if let Some(schema) = &self.output_schema {
            schema::check_schema(schema).map_err(|message| EngineError::InvalidSchema {
                tool: self.name.clone(),
                message,
            })?;
        }

        match self.operation_type {
            OperationType::SingleChoice | OperationType::MultiLabel => {
                let Some(param) = &self.choices_param else {
                    return Err(EngineError::InvalidTemplate {
                        tool: self.name.clone(),
                        message: "choices_param is required for choice operations".to_string(),
                    });
                };
                if !self.parameters.contains_key(param) {
                    return Err(EngineError::InvalidTemplate {
                        tool: self.name.clone(),
                        message: format!("choices_param '{param}' is not a declared parameter"),
                    });
                }
            }
            OperationType::Extraction => {}
        }

        Ok(())
    }

    /// Derives the caller-facing input schema from the declared parameters.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, def) in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".to_string(), Value::String(def.kind.clone()));
            prop.insert(
                "description".to_string(),
                Value::String(def.description.clone()),
            );
            if let Some(items) = &def.items {
                prop.insert("items".to_string(), items.clone());
            }
            if let Some(props) = &def.properties {
                prop.insert("properties".to_string(), props.clone());
            }
            if let Some(min_items) = def.min_items {
                prop.insert("minItems".to_string(), Value::from(min_items));
            }
            if let Some(default) = &def.default {
                prop.insert("default".to_string(), default.clone());
            }
            properties.insert(name.clone(), Value::Object(prop));

            if def.required {
                required.push(Value::String(name.clone()));
            }
        }

        let mut schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = Value::Array(required);
        }
        schema
    }
}

fn array_param(description: &str, required: bool, min_items: Option<u64>) -> ParamDef {
    ParamDef {
        kind: "array".to_string(),
        description: description.to_string(),
        required,
        items: None,
        properties: None,
        default: None,
        min_items,
    }
}

fn scalar_param(kind: &str, description: &str) -> ParamDef {
    ParamDef {
        kind: kind.to_string(),
        description: description.to_string(),
        required: false,
        items: None,
        properties: None,
        default: None,
        min_items: None,
    }
}

/// The built-in tool descriptors backing [`classify`](crate::registry::ToolRegistry::classify),
/// [`tag`](crate::registry::ToolRegistry::tag), and
/// [`extract`](crate::registry::ToolRegistry::extract).
#[must_use]
pub fn builtin_templates() -> Vec<Template> {
    vec![classify_template(), tag_template(), extract_template()]
}

/// Name of the built-in classification tool.
pub const CLASSIFY_TOOL: &str = "classify_text";
/// Name of the built-in tagging tool.
pub const TAG_TOOL: &str = "tag_text";
/// Name of the built-in extraction tool.
pub const EXTRACT_TOOL: &str = "extract_fields";

fn classify_template() -> Template {
    let mut parameters = BTreeMap::new();
    parameters.insert(
        "input".to_string(),
        array_param("Items to classify", true, None),
    );
    parameters.insert(
        "categories".to_string(),
        array_param("Allowed categories (at least 2)", true, Some(2)),
    );
    parameters.insert(
        "prompt".to_string(),
        scalar_param("string", "Extra instructions appended to the system prompt"),
    );
    parameters.insert(
        "args".to_string(),
        scalar_param("object", "Model overrides and operation options"),
    );

    Template {
        name: CLASSIFY_TOOL.to_string(),
        operation_type: OperationType::SingleChoice,
        description: "Classify each input into exactly one best-matching category".to_string(),
        prompt_templates: PromptTemplates {
            system: "You are a precise classifier. Reply with exactly one of the allowed \
                     categories and nothing else."
                .to_string(),
            user: "Categories: {$categories}\n\nText:\n{$text}\n\nCategory:".to_string(),
            structured_system: None,
        },
        model_config: ModelConfig::default(),
        parameters,
        choices_param: Some("categories".to_string()),
        output_schema: Some(json!({"type": "array"})),
    }
}

fn tag_template() -> Template {
    let mut parameters = BTreeMap::new();
    parameters.insert("input".to_string(), array_param("Items to tag", true, None));
    parameters.insert(
        "tags".to_string(),
        array_param("Allowed tags (at least 1)", true, Some(1)),
    );
    parameters.insert(
        "prompt".to_string(),
        scalar_param("string", "Extra instructions appended to the system prompt"),
    );
    parameters.insert(
        "args".to_string(),
        scalar_param("object", "Model overrides and operation options"),
    );

    Template {
        name: TAG_TOOL.to_string(),
        operation_type: OperationType::MultiLabel,
        description: "Select every applicable tag for each input".to_string(),
        prompt_templates: PromptTemplates {
            system: "You are a precise tagger. Reply with a comma-separated subset of the \
                     allowed tags and nothing else."
                .to_string(),
            user: "Tags: {$tags}\n\nText:\n{$text}\n\nApplicable tags:".to_string(),
            structured_system: None,
        },
        model_config: ModelConfig::default(),
        parameters,
        choices_param: Some("tags".to_string()),
        output_schema: Some(json!({"type": "array"})),
    }
}

fn extract_template() -> Template {
    let mut parameters = BTreeMap::new();
    parameters.insert(
        "input".to_string(),
        array_param("Items to extract from", true, None),
    );
    parameters.insert(
        "fields".to_string(),
        array_param("Field names for simple extraction", false, Some(1)),
    );
    parameters.insert(
        "response_format".to_string(),
        scalar_param("object", "JSON Schema for structured extraction"),
    );
    parameters.insert(
        "prompt".to_string(),
        scalar_param("string", "Extra instructions appended to the system prompt"),
    );
    parameters.insert(
        "args".to_string(),
        scalar_param("object", "Model overrides and operation options"),
    );

    Template {
        name: EXTRACT_TOOL.to_string(),
        operation_type: OperationType::Extraction,
        description: "Extract named fields or a schema-shaped object from each input".to_string(),
        prompt_templates: PromptTemplates {
            system: "You are a precise extraction engine. Return a JSON object keyed by the \
                     requested field names. Use null for fields you cannot find."
                .to_string(),
            user: "Fields: {$fields}\n\nText:\n{$text}\n\nExtracted data (as JSON):".to_string(),
            structured_system: Some(
                "You are a precise extraction engine. You must respond with valid JSON \
                 matching the provided schema exactly."
                    .to_string(),
            ),
        },
        model_config: ModelConfig::default(),
        parameters,
        choices_param: None,
        output_schema: None,
    }
}
