//! Error types for the batch engine.

use thiserror::Error;

/// Errors returned by the generation backend.
///
/// All variants are treated as intermittently failing: the extraction retry
/// loop retries them under the same attempt budget as validation failures.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network-level failure (connection refused, timeout, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// Authentication or authorization failure.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The backend rejected the request due to throughput limits.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Any other backend-reported failure.
    #[error("backend error: {0}")]
    Other(String),
}

/// Errors raised by the batch engine itself.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input not a sequence, or a required parameter missing or malformed.
    ///
    /// Raised synchronously before any backend call; aborts the whole batch
    /// invocation rather than a single item.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Failure from the generation backend.
    ///
    /// Caught per item during batch processing; recorded on that item's
    /// output record without affecting siblings.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A template's declared output schema is itself malformed.
    ///
    /// Fails at load time and excludes that one tool from the registry.
    #[error("invalid output schema for tool '{tool}': {message}")]
    InvalidSchema {
        /// Name of the offending tool.
        tool: String,
        /// Schema compilation error.
        message: String,
    },

    /// A template descriptor failed structural validation at load time.
    #[error("invalid template '{tool}': {message}")]
    InvalidTemplate {
        /// Name of the offending tool.
        tool: String,
        /// What was wrong with the descriptor.
        message: String,
    },

    /// No tool with the requested name is registered.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// I/O failure while reading tool descriptors from disk.
    #[error("config error: {0}")]
    Config(#[from] std::io::Error),
}
