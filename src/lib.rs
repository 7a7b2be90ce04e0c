pub mod config;
pub mod corpus;
pub mod embedder;
pub mod error;
pub mod gateway;
pub mod mcp_server;
pub mod ranker;
pub mod validator;

pub use config::{AccessMode, ServerConfig};
pub use corpus::{AccessLevel, CommandSpec, CorpusIndex, SharedIndex};
pub use embedder::Embedder;
pub use error::McpError;
pub use gateway::{CliCommand, ExecutionResult};
pub use mcp_server::AwsMcpServer;
pub use ranker::{rank, Candidate};
pub use validator::{ValidationVerdict, Validator};

/// Maximum size for tool response output
pub const MAX_TOOL_RESPONSE_SIZE: usize = 100_000;

/// Output kind for tool responses
#[derive(Debug, Clone)]
pub enum OutputKind {
    Text(String),
    Json(serde_json::Value),
}

impl Default for OutputKind {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// Tool invocation output
#[derive(Debug, Default)]
pub struct InvokeOutput {
    pub output: OutputKind,
}
