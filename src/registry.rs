//! Tool registry: binds loaded templates to their operation strategies.
//!
//! The registry is constructed once at process start with an injected
//! backend client and a set of validated templates; a malformed descriptor
//! is skipped with a logged warning rather than failing the process. The
//! template set can be hot-reloaded as a full atomic replace.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::{json, Value};

use crate::batch::{self, BatchMetadata, OutputRecord, DEFAULT_CONCURRENCY};
use crate::client::LlmClient;
use crate::error::EngineError;
use crate::normalize;
use crate::ops::Operation;
use crate::template::{self, Template};

/// Caller-facing description of one registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub input_schema: Value,
    /// Declared output schema, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

type TemplateSet = Arc<HashMap<String, Arc<Template>>>;

/// Registry of batch tools sharing one backend client.
pub struct ToolRegistry {
    client: Arc<dyn LlmClient>,
    concurrency: usize,
    templates: RwLock<TemplateSet>,
}

impl ToolRegistry {
    /// Creates an empty registry around a backend client.
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            concurrency: DEFAULT_CONCURRENCY,
            templates: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Creates a registry preloaded with the built-in classify/tag/extract
    /// tools.
    #[must_use]
    pub fn with_builtins(client: Arc<dyn LlmClient>) -> Self {
        let registry = Self::new(client);
        registry.reload(template::builtin_templates());
        registry
    }

    /// Sets the admission-gate size for simultaneous in-flight backend
    /// calls.
    #[must_use]
    pub const fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit;
        self
    }

    /// Atomically replaces the registered template set.
    ///
    /// Each template is validated; a failing descriptor is skipped with a
    /// warning and excluded from the new set. Returns the number of tools
    /// registered.
    pub fn reload<I>(&self, templates: I) -> usize
    where
        I: IntoIterator<Item = Template>,
    {
        let mut set = HashMap::new();
        for template in templates {
            match template.validate() {
                Ok(()) => {
                    set.insert(template.name.clone(), Arc::new(template));
                }
                Err(error) => {
                    tracing::warn!(tool = %template.name, %error, "skipping invalid template");
                }
            }
        }
        let count = set.len();
        tracing::info!(tools = count, "template set loaded");
        if let Ok(mut guard) = self.templates.write() {
            *guard = Arc::new(set);
        }
        count
    }

    /// Loads every `*.json` descriptor in a directory and atomically
    /// replaces the registered set with the result.
    ///
    /// Malformed files are skipped with a warning, never a hard failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] only when the directory itself
    /// cannot be read.
    pub fn load_dir(&self, dir: &Path) -> Result<usize, EngineError> {
        let mut templates = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "skipping unreadable descriptor");
                    continue;
                }
            };
            match serde_json::from_str::<Template>(&text) {
                Ok(template) => templates.push(template),
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "skipping malformed descriptor");
                }
            }
        }
        Ok(self.reload(templates))
    }

    fn current(&self) -> TemplateSet {
        self.templates
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_default()
    }

    fn template(&self, name: &str) -> Result<Arc<Template>, EngineError> {
        self.current()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::ToolNotFound(name.to_string()))
    }

    /// Lists every registered tool with its derived schemas.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        let mut tools: Vec<ToolInfo> = self
            .current()
            .values()
            .map(|template| ToolInfo {
                name: template.name.clone(),
                description: template.description.clone(),
                input_schema: template.input_schema(),
                output_schema: template.output_schema.clone(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Runs one batch call against a named tool.
    ///
    /// The reply is `{"results": [...], "metadata": {...}}` with exactly one
    /// result per input item, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ToolNotFound`] for unknown names and
    /// [`EngineError::InvalidInput`] for shape/parameter errors; per-item
    /// failures are recorded on the corresponding result instead.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<Value, EngineError> {
        let template = self.template(name)?;
        let (results, metadata) = self.run_batch(&template, &args).await?;
        Ok(json!({"results": results, "metadata": metadata}))
    }

    /// Classifies each input into exactly one of `categories`.
    ///
    /// # Errors
    ///
    /// See [`call_tool`](Self::call_tool); requires at least 2 categories.
    pub async fn classify(
        &self,
        input: Value,
        categories: &[&str],
        prompt: Option<&str>,
        options: Value,
    ) -> Result<Value, EngineError> {
        self.call_tool(
            template::CLASSIFY_TOOL,
            convenience_args(input, "categories", categories, prompt, options),
        )
        .await
    }

    /// Selects zero or more of `tags` for each input.
    ///
    /// # Errors
    ///
    /// See [`call_tool`](Self::call_tool); requires at least 1 tag.
    pub async fn tag(
        &self,
        input: Value,
        tags: &[&str],
        prompt: Option<&str>,
        options: Value,
    ) -> Result<Value, EngineError> {
        self.call_tool(
            template::TAG_TOOL,
            convenience_args(input, "tags", tags, prompt, options),
        )
        .await
    }

    /// Extracts named fields or a schema-shaped object from each input.
    ///
    /// Exactly one of `fields` / a `response_format` entry in `options` must
    /// be supplied.
    ///
    /// # Errors
    ///
    /// See [`call_tool`](Self::call_tool).
    pub async fn extract(
        &self,
        input: Value,
        fields: Option<&[&str]>,
        response_format: Option<Value>,
        prompt: Option<&str>,
        options: Value,
    ) -> Result<Value, EngineError> {
        let mut args = json!({"input": input, "args": options});
        if let Some(fields) = fields {
            args["fields"] = json!(fields);
        }
        if let Some(schema) = response_format {
            args["response_format"] = schema;
        }
        if let Some(prompt) = prompt {
            args["prompt"] = Value::String(prompt.to_string());
        }
        self.call_tool(template::EXTRACT_TOOL, args).await
    }

    /// Normalizes the input, resolves the operation, and fans out over the
    /// admission gate.
    async fn run_batch(
        &self,
        template: &Arc<Template>,
        args: &Value,
    ) -> Result<(Vec<OutputRecord>, BatchMetadata), EngineError> {
        let input = args.get("input").ok_or_else(|| {
            EngineError::InvalidInput("missing required parameter: 'input'".to_string())
        })?;
        let items = normalize::normalize(input)?;
        let operation = Arc::new(Operation::build(template, args)?);

        tracing::debug!(tool = %template.name, items = items.len(), "batch started");
        let client = Arc::clone(&self.client);
        let outcome = batch::process(
            items,
            move |item| {
                let operation = Arc::clone(&operation);
                let client = Arc::clone(&client);
                async move { operation.run(client.as_ref(), &item.data).await }
            },
            self.concurrency,
        )
        .await;
        tracing::debug!(
            tool = %template.name,
            failed = outcome.1.failed,
            elapsed_ms = outcome.1.processing_time_ms,
            "batch finished"
        );
        Ok(outcome)
    }
}

fn convenience_args(
    input: Value,
    choices_key: &str,
    choices: &[&str],
    prompt: Option<&str>,
    options: Value,
) -> Value {
    let mut args = json!({"input": input, "args": options});
    args[choices_key] = json!(choices);
    if let Some(prompt) = prompt {
        args["prompt"] = Value::String(prompt.to_string());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChatMessage, ChatOptions};
    use crate::error::BackendError;
    use async_trait::async_trait;

    struct NoopClient;

    #[async_trait]
    impl LlmClient for NoopClient {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: &ChatOptions,
        ) -> Result<String, BackendError> {
            Err(BackendError::Other("unused".to_string()))
        }

        async fn structured_output(
            &self,
            _messages: &[ChatMessage],
            _schema: &Value,
            _options: &ChatOptions,
        ) -> Result<Value, BackendError> {
            Err(BackendError::Other("unused".to_string()))
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::with_builtins(Arc::new(NoopClient))
    }

    #[test]
    fn test_builtins_listed_sorted() {
        let tools = registry().list_tools();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["classify_text", "extract_fields", "tag_text"]);
        assert_eq!(tools[0].input_schema["type"], "object");
    }

    #[tokio::test]
    async fn test_unknown_tool_rejected() {
        let err = registry()
            .call_tool("nope", json!({"input": []}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_input_rejected() {
        let err = registry()
            .call_tool("classify_text", json!({"categories": ["a", "b"]}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_reload_skips_invalid_templates() {
        let registry = registry();
        let mut broken = template::builtin_templates().remove(0);
        broken.name = "broken".to_string();
        broken.output_schema = Some(json!({"type": 42}));

        let count = registry.reload(vec![template::builtin_templates().remove(0), broken]);
        assert_eq!(count, 1);
        assert_eq!(registry.list_tools().len(), 1);
    }

    #[test]
    fn test_reload_is_full_replace() {
        let registry = registry();
        assert_eq!(registry.list_tools().len(), 3);
        registry.reload(Vec::new());
        assert!(registry.list_tools().is_empty());
    }

    #[test]
    fn test_load_dir_skips_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = serde_json::to_string(&template::builtin_templates().remove(0)).unwrap();
        std::fs::write(dir.path().join("good.json"), good).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("ignored.txt"), "nope").unwrap();

        let registry = registry();
        let count = registry.load_dir(dir.path()).unwrap();
        assert_eq!(count, 1);
        assert_eq!(registry.list_tools()[0].name, "classify_text");
    }
}
