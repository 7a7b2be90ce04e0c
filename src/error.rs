use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Corpus build error: {0}")]
    CorpusBuild(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Corpus index has no entries")]
    EmptyCorpus,

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, McpError>;
