//! Server configuration, read once from the environment at startup.

use serde::{Deserialize, Serialize};

/// Environment variable enabling read-only mode.
pub const READ_ONLY_KEY: &str = "AWS_API_MCP_READ_OPERATIONS_ONLY";
const REGION_KEY: &str = "AWS_REGION";
const WORKING_DIR_KEY: &str = "AWS_API_MCP_WORKING_DIR";
const PROFILE_KEY: &str = "AWS_API_MCP_PROFILE_NAME";

/// Whether the server may execute mutating operations.
///
/// Fixed for the process lifetime; every validation call reads the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    Normal,
    ReadOnly,
}

impl AccessMode {
    pub fn is_read_only(self) -> bool {
        matches!(self, AccessMode::ReadOnly)
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_access_mode")]
    pub access_mode: AccessMode,
    /// Region applied when a command carries no --region of its own.
    #[serde(default = "default_region")]
    pub default_region: String,
    /// Absolute directory the server chdirs into before serving.
    #[serde(default)]
    pub working_directory: Option<String>,
    /// Credentials profile forwarded to the CLI as --profile.
    #[serde(default)]
    pub profile_name: Option<String>,
}

fn default_access_mode() -> AccessMode {
    AccessMode::Normal
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl ServerConfig {
    /// Load config from environment variables.
    pub fn from_env() -> Self {
        let access_mode = if std::env::var(READ_ONLY_KEY)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
        {
            AccessMode::ReadOnly
        } else {
            AccessMode::Normal
        };
        let default_region = std::env::var(REGION_KEY)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_region);
        let working_directory = std::env::var(WORKING_DIR_KEY).ok().filter(|v| !v.is_empty());
        let profile_name = std::env::var(PROFILE_KEY).ok().filter(|v| !v.is_empty());
        Self {
            access_mode,
            default_region,
            working_directory,
            profile_name,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            access_mode: default_access_mode(),
            default_region: default_region(),
            working_directory: None,
            profile_name: None,
        }
    }
}
