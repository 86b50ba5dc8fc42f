//! Pipeline error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Storage error: {0}")]
    Database(#[from] sniprag_db::DbError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference error: {0}")]
    Inference(String),

    /// Fatal batch condition: the embedding service returned a different
    /// number of vectors than snippets sent. Never retried.
    #[error("Embedding count mismatch: sent {sent} snippets, got {received} vectors")]
    EmbeddingCountMismatch { sent: usize, received: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
