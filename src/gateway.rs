//! Execution gateway: hands a validated command to the real AWS CLI and
//! reports stdout, stderr, and exit status back uniformly.
//!
//! The gateway performs no validation of its own. Safety decisions live in
//! the validator, and a [`CliCommand`] is only ever built from an `Allowed`
//! verdict.

use std::io::Write;
use std::process::Stdio;

use bstr::ByteSlice;
use crossterm::{queue, style};
use eyre::{Result, WrapErr};
use serde::Serialize;

use crate::config::ServerConfig;
use crate::validator::ParsedCommand;
use crate::{InvokeOutput, OutputKind, MAX_TOOL_RESPONSE_SIZE};

/// The environment variable name where we set additional metadata for the AWS CLI user agent.
const USER_AGENT_ENV_VAR: &str = "AWS_EXECUTION_ENV";
const USER_AGENT_APP_NAME: &str = "AwsApiMcp-Server";
const USER_AGENT_VERSION_KEY: &str = "Version";
const USER_AGENT_VERSION_VALUE: &str = env!("CARGO_PKG_VERSION");

/// A validated command bound to its effective region and profile.
#[derive(Debug, Clone)]
pub struct CliCommand {
    pub service_name: String,
    pub operation_name: String,
    /// CLI flags in command-line order; switches carry no value.
    pub parameters: Vec<(String, Option<String>)>,
    /// Pass-through global flags (e.g. `--output json`).
    pub global_args: Vec<(String, String)>,
    pub region: String,
    pub profile_name: Option<String>,
}

/// Uniform result of one CLI execution.
#[derive(Debug, Serialize)]
pub struct ExecutionResult {
    pub exit_status: String,
    pub stdout: String,
    pub stderr: String,
}

impl CliCommand {
    /// Binds a parsed command to the process configuration. Per-command
    /// `--region`/`--profile` win over the configured defaults.
    pub fn from_parsed(parsed: ParsedCommand, config: &ServerConfig) -> Self {
        Self {
            service_name: parsed.service,
            operation_name: parsed.operation,
            parameters: parsed.parameters,
            global_args: parsed.global_args,
            region: parsed
                .region
                .unwrap_or_else(|| config.default_region.clone()),
            profile_name: parsed.profile.or_else(|| config.profile_name.clone()),
        }
    }

    pub async fn invoke(&self) -> Result<InvokeOutput> {
        let mut command = tokio::process::Command::new("aws");

        // Set up environment variables
        let mut env_vars: std::collections::HashMap<String, String> = std::env::vars().collect();

        // Set up additional metadata for the AWS CLI user agent
        let user_agent_metadata_value = format!(
            "{} {}/{}",
            USER_AGENT_APP_NAME, USER_AGENT_VERSION_KEY, USER_AGENT_VERSION_VALUE
        );

        // If the user agent metadata env var already exists, append to it, otherwise set it
        if let Some(existing_value) = env_vars.get(USER_AGENT_ENV_VAR) {
            if !existing_value.is_empty() {
                env_vars.insert(
                    USER_AGENT_ENV_VAR.to_string(),
                    format!("{} {}", existing_value, user_agent_metadata_value),
                );
            } else {
                env_vars.insert(USER_AGENT_ENV_VAR.to_string(), user_agent_metadata_value);
            }
        } else {
            env_vars.insert(USER_AGENT_ENV_VAR.to_string(), user_agent_metadata_value);
        }

        command.envs(env_vars).arg("--region").arg(&self.region);
        if let Some(profile_name) = self.profile_name.as_deref() {
            command.arg("--profile").arg(profile_name);
        }
        for (flag, value) in &self.global_args {
            command.arg(flag).arg(value);
        }
        command.arg(&self.service_name).arg(&self.operation_name);
        for (flag, value) in &self.parameters {
            command.arg(flag);
            if let Some(value) = value {
                if !value.is_empty() {
                    command.arg(value);
                }
            }
        }

        let output = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .wrap_err_with(|| format!("Unable to spawn command '{:?}'", self))?
            .wait_with_output()
            .await
            .wrap_err_with(|| format!("Unable to spawn command '{:?}'", self))?;
        let status = output.status.code().unwrap_or(0).to_string();
        let stdout = output.stdout.to_str_lossy();
        let stderr = output.stderr.to_str_lossy();

        let stdout = format!(
            "{}{}",
            &stdout[0..stdout.len().min(MAX_TOOL_RESPONSE_SIZE / 3)],
            if stdout.len() > MAX_TOOL_RESPONSE_SIZE / 3 {
                " ... truncated"
            } else {
                ""
            }
        );

        let stderr = format!(
            "{}{}",
            &stderr[0..stderr.len().min(MAX_TOOL_RESPONSE_SIZE / 3)],
            if stderr.len() > MAX_TOOL_RESPONSE_SIZE / 3 {
                " ... truncated"
            } else {
                ""
            }
        );

        if status.eq("0") {
            Ok(InvokeOutput {
                output: OutputKind::Json(serde_json::json!({
                    "exit_status": status,
                    "stdout": stdout,
                    "stderr": stderr
                })),
            })
        } else {
            Err(eyre::eyre!(stderr))
        }
    }

    pub fn queue_description(&self, updates: &mut impl Write) -> Result<()> {
        queue!(
            updates,
            style::Print("Running aws cli command:\n\n"),
            style::Print(format!("Service name: {}\n", self.service_name)),
            style::Print(format!("Operation name: {}\n", self.operation_name)),
        )?;
        if !self.parameters.is_empty() {
            queue!(updates, style::Print("Parameters: \n".to_string()))?;
            for (flag, value) in &self.parameters {
                match value {
                    Some(value) if !value.is_empty() => {
                        queue!(updates, style::Print(format!("- {}: {}\n", flag, value)))?;
                    }
                    _ => {
                        queue!(updates, style::Print(format!("- {}\n", flag)))?;
                    }
                }
            }
        }

        if let Some(ref profile_name) = self.profile_name {
            queue!(updates, style::Print(format!("Profile name: {}\n", profile_name)))?;
        } else {
            queue!(updates, style::Print("Profile name: default\n".to_string()))?;
        }

        queue!(updates, style::Print(format!("Region: {}", self.region)))?;
        Ok(())
    }
}

impl From<InvokeOutput> for ExecutionResult {
    fn from(output: InvokeOutput) -> Self {
        match output.output {
            OutputKind::Json(json) => {
                let exit_status = json
                    .get("exit_status")
                    .and_then(|v| v.as_str())
                    .unwrap_or("0")
                    .to_string();
                let stdout = json
                    .get("stdout")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let stderr = json
                    .get("stderr")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                Self {
                    exit_status,
                    stdout,
                    stderr,
                }
            }
            OutputKind::Text(text) => Self {
                exit_status: "0".to_string(),
                stdout: text,
                stderr: String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessMode;

    fn parsed(region: Option<&str>, profile: Option<&str>) -> ParsedCommand {
        ParsedCommand {
            service: "ec2".to_string(),
            operation: "describe-instances".to_string(),
            parameters: vec![("--max-results".to_string(), Some("10".to_string()))],
            region: region.map(str::to_string),
            profile: profile.map(str::to_string),
            global_args: vec![],
        }
    }

    fn config() -> ServerConfig {
        ServerConfig {
            access_mode: AccessMode::Normal,
            default_region: "us-west-2".to_string(),
            working_directory: None,
            profile_name: Some("default-profile".to_string()),
        }
    }

    #[test]
    fn command_region_wins_over_config_default() {
        let cmd = CliCommand::from_parsed(parsed(Some("eu-central-1"), None), &config());
        assert_eq!(cmd.region, "eu-central-1");
        assert_eq!(cmd.profile_name.as_deref(), Some("default-profile"));
    }

    #[test]
    fn config_defaults_fill_missing_region_and_profile() {
        let cmd = CliCommand::from_parsed(parsed(None, Some("dev")), &config());
        assert_eq!(cmd.region, "us-west-2");
        assert_eq!(cmd.profile_name.as_deref(), Some("dev"));
    }

    #[test]
    fn queue_description_lists_command_details() {
        let cmd = CliCommand::from_parsed(parsed(None, Some("development")), &config());

        let mut output = Vec::new();
        cmd.queue_description(&mut output).unwrap();
        let output_str = String::from_utf8(output).unwrap();

        assert!(output_str.contains("Running aws cli command:"));
        assert!(output_str.contains("Service name: ec2"));
        assert!(output_str.contains("Operation name: describe-instances"));
        assert!(output_str.contains("- --max-results: 10"));
        assert!(output_str.contains("Profile name: development"));
        assert!(output_str.contains("Region: us-west-2"));
    }

    #[test]
    fn queue_description_without_parameters() {
        let cmd = CliCommand {
            service_name: "sts".to_string(),
            operation_name: "get-caller-identity".to_string(),
            parameters: vec![],
            global_args: vec![],
            region: "us-east-1".to_string(),
            profile_name: None,
        };

        let mut output = Vec::new();
        cmd.queue_description(&mut output).unwrap();
        let output_str = String::from_utf8(output).unwrap();

        assert!(output_str.contains("Profile name: default"));
        assert!(output_str.contains("Region: us-east-1"));
        assert!(!output_str.contains("Parameters:"));
    }

    #[test]
    fn execution_result_from_json_output() {
        let result: ExecutionResult = InvokeOutput {
            output: OutputKind::Json(serde_json::json!({
                "exit_status": "0",
                "stdout": "{\"Reservations\": []}",
                "stderr": ""
            })),
        }
        .into();
        assert_eq!(result.exit_status, "0");
        assert_eq!(result.stdout, "{\"Reservations\": []}");
        assert!(result.stderr.is_empty());
    }
}
