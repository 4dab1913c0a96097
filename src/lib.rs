//! Batch text-analysis engine backed by a pluggable LLM client.
//!
//! The crate turns free-form text into typed, schema-conformant records:
//! inputs are normalized into uniform id/data items, fanned out over a
//! bounded-concurrency batch, and each item is run through one of three
//! operation strategies (single-choice classification, multi-label tagging,
//! or field/schema extraction with a validate-coerce-retry loop). One item
//! failing never fails the batch; errors are recorded per result.
//!
//! [`registry::ToolRegistry`] is the main entry point: it holds validated
//! [`template::Template`]s and dispatches `call_tool` invocations against a
//! shared [`client::LlmClient`].

pub mod batch;
pub mod client;
pub mod coerce;
pub mod error;
pub mod normalize;
pub mod ops;
pub mod registry;
pub mod resolve;
pub mod schema;
pub mod template;

/// Common types for ergonomic usage of the batch engine.
pub mod prelude {
    pub use crate::batch::{BatchMetadata, ItemOutcome, OutputRecord};
    pub use crate::client::{ChatMessage, ChatOptions, LlmClient, Role};
    pub use crate::error::{BackendError, EngineError};
    pub use crate::normalize::InputRecord;
    pub use crate::registry::{ToolInfo, ToolRegistry};
    pub use crate::template::{OperationType, Template};
}
