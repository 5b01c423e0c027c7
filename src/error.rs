//! Error types for LocalAgents

use thiserror::Error;

/// Result type alias for LocalAgents operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in LocalAgents
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Request abandoned before completion")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
