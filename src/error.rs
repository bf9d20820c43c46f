use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Missing GOOGLE_API_KEY (set it in the environment or in .env)")]
    MissingCredential,

    #[error("Vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Embedding request failed: {0}")]
    Embedding(String),

    #[error("Model request failed: {0}")]
    Model(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("No bot with id \"{0}\"")]
    UnknownBot(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
