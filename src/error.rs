//! Error types for indexing and retrieval.

use thiserror::Error;

/// Result type alias for indexing and retrieval operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur while indexing documents or answering questions.
///
/// Extraction and embedding failures are caught at the orchestration
/// boundary (CLI loop, event handler) and reported without aborting the
/// session; storage and inference failures propagate to the caller.
/// A persisted vector that fails to parse is not an error value — the
/// row is skipped with a log during cache load.
#[derive(Error, Debug)]
pub enum IndexError {
    /// File extension or media type is not in the allow-list. Non-fatal.
    #[error("unsupported file type: {0}")]
    Unsupported(String),

    /// Text extraction failed. The document is left unindexed.
    #[error("text extraction failed for {path}: {reason}")]
    Extraction { path: String, reason: String },

    /// Embedding call failed (network or malformed response). The whole
    /// document's index attempt is aborted; nothing is written.
    #[error("embedding request failed: {0}")]
    Embedding(String),

    /// Durable-storage failure. Fatal for the current operation.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Chat/completion call failed. Propagated to the caller of `ask`.
    #[error("inference request failed: {0}")]
    Inference(String),

    /// Cloud service call failed outside the embedding/inference paths.
    #[error("cloud service error: {0}")]
    Cloud(String),

    /// Configuration error (unknown backend, missing endpoint).
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error (scan, metadata reads).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
