//! Error handling for docgraph
//!
//! This module provides the error types used across the ingestion pipeline,
//! the graph access layer and the web API.

use thiserror::Error;

/// Main error type for docgraph operations
#[derive(Error, Debug)]
pub enum DocGraphError {
    /// LLM gateway errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Graph access / backend errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Work queue errors
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Key-value / blob storage errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Document chunking errors
    #[error("Chunking error: {0}")]
    Chunk(#[from] ChunkError),

    /// Pipeline orchestration errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Web/API-related errors
    #[error("Web error: {0}")]
    Web(#[from] WebError),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anyhow errors (for compatibility)
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Custom(String),
}

/// LLM gateway errors
#[derive(Error, Debug)]
pub enum LlmError {
    /// The endpoint throttled the request; retried in-gateway with jitter.
    #[error("request throttled: {0}")]
    Throttled(String),

    /// The endpoint is temporarily unavailable (503 class).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The prompt exceeded the model input limit; the caller must shrink.
    #[error("input too long: {0}")]
    InputTooLong(String),

    /// The completion did not contain the expected tag or valid JSON.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },
}

impl LlmError {
    /// Transient errors are retried inside the gateway without bound.
    pub fn is_throttle(&self) -> bool {
        matches!(
            self,
            LlmError::Throttled(_) | LlmError::ServiceUnavailable(_)
        )
    }
}

/// Graph backend and access-layer errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// Transient connection failure; the access layer reconnects and retries.
    #[error("transient graph failure: {0}")]
    Transient(String),

    #[error("vertex not found: {0}")]
    VertexNotFound(String),

    #[error("edge not found: {0}")]
    EdgeNotFound(String),

    #[error("graph query failed: {0}")]
    QueryFailed(String),

    #[error("invalid name pattern: {0}")]
    InvalidPattern(String),
}

/// Work queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("unknown receipt handle: {0}")]
    UnknownReceipt(String),

    #[error("queue operation failed: {0}")]
    OperationFailed(String),
}

/// Storage errors (KV tables and blob store)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("item not found: {table}/{key}")]
    NotFound { table: String, key: String },

    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("persistence failed: {0}")]
    Persistence(String),
}

/// Document chunking errors
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("document produced no text")]
    EmptyDocument,

    #[error("document summary generation failed: {0}")]
    SummaryFailed(String),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
}

/// Pipeline orchestration errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A step exhausted its retries; routes to the terminal failure branch.
    #[error("step '{step}' failed after {attempts} attempts: {source}")]
    StepFailed {
        step: &'static str,
        attempts: u32,
        #[source]
        source: Box<DocGraphError>,
    },

    #[error("graph writer did not signal completion: {0}")]
    TaskTokenLost(String),

    #[error("invalid queue message: {0}")]
    InvalidMessage(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileReadError(String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Web/API errors
#[derive(Error, Debug)]
pub enum WebError {
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

/// Result type alias for docgraph operations
pub type Result<T> = std::result::Result<T, DocGraphError>;

impl DocGraphError {
    /// Helper to create a custom error
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        DocGraphError::Custom(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_throttle_classification() {
        assert!(LlmError::Throttled("429".into()).is_throttle());
        assert!(LlmError::ServiceUnavailable("503".into()).is_throttle());
        assert!(!LlmError::MalformedOutput("bad json".into()).is_throttle());
        assert!(!LlmError::InputTooLong("too long".into()).is_throttle());
    }

    #[test]
    fn error_conversion_chain() {
        fn fails() -> Result<()> {
            Err(GraphError::VertexNotFound("v1".into()))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, DocGraphError::Graph(_)));
        assert!(err.to_string().contains("v1"));
    }
}
