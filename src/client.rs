//! The generation-backend contract.
//!
//! The engine never talks to a concrete LLM provider directly; everything
//! goes through [`LlmClient`], which callers implement for their backend of
//! choice. Both calls are fallible and must be treated as intermittently
//! failing (network, auth, rate limits).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// Caller-supplied content.
    User,
    /// A prior backend reply.
    Assistant,
}

/// One message in an ordered conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Builds a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Builds a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-request model settings, resolved from the template's model
/// configuration plus any caller overrides.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Model identifier understood by the backend.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

/// A fallible request/response service producing generated text.
///
/// One long-lived handle is shared read-only by all batch tasks; no locking
/// is required of implementors beyond `Send + Sync`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends an ordered conversation and returns the generated text.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, BackendError>;

    /// Requests a best-effort JSON object shaped by `schema`.
    ///
    /// Schema compliance is **not** guaranteed; the extraction loop
    /// validates the result and feeds errors back for self-correction.
    async fn structured_output(
        &self,
        messages: &[ChatMessage],
        schema: &Value,
        options: &ChatOptions,
    ) -> Result<Value, BackendError>;
}
