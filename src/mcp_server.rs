use std::io::{BufRead, BufReader, Write};

use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::corpus::{CorpusIndex, SharedIndex};
use crate::embedder::Embedder;
use crate::error::{McpError, Result};
use crate::gateway::{CliCommand, ExecutionResult};
use crate::ranker;
use crate::validator::{ValidationVerdict, Validator};

/// Suggestions returned when the caller does not ask for a count.
const DEFAULT_MAX_SUGGESTIONS: usize = 10;

/// JSON-RPC message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Arguments of the `suggest_aws_commands` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestRequest {
    pub query: String,
    pub max_results: Option<usize>,
}

/// One entry of a suggestion response, ordered by descending similarity.
#[derive(Debug, Serialize)]
pub struct Suggestion {
    pub command: String,
    pub similarity: f32,
    pub required_parameters: Vec<String>,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<Suggestion>,
}

/// Arguments of the `call_aws` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct CallAwsRequest {
    pub cli_command: String,
}

/// MCP Server implementation
pub struct AwsMcpServer {
    config: ServerConfig,
    corpus: SharedIndex,
    embedder: Embedder,
}

impl AwsMcpServer {
    pub fn new(config: ServerConfig, corpus: CorpusIndex) -> Self {
        Self {
            config,
            corpus: SharedIndex::new(corpus),
            embedder: Embedder::default(),
        }
    }

    /// Swaps in a freshly built corpus; in-flight requests keep the snapshot
    /// they loaded.
    pub fn reload_corpus(&self, corpus: CorpusIndex) {
        self.corpus.replace(corpus);
    }

    pub async fn run(&self) -> Result<()> {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        let reader = BufReader::new(stdin.lock());

        for line in reader.lines() {
            let line = line.map_err(McpError::Io)?;
            if line.trim().is_empty() {
                continue;
            }

            let message: JsonRpcMessage =
                serde_json::from_str(&line).map_err(McpError::Serialization)?;

            let response = self.handle_message(message).await?;

            if let Some(response) = response {
                let response_str =
                    serde_json::to_string(&response).map_err(McpError::Serialization)?;
                writeln!(stdout, "{}", response_str).map_err(McpError::Io)?;
                stdout.flush().map_err(McpError::Io)?;
            }
        }

        Ok(())
    }

    pub async fn handle_message(&self, message: JsonRpcMessage) -> Result<Option<JsonRpcResponse>> {
        match message {
            JsonRpcMessage::Request(request) => {
                let response = self.handle_request(request).await?;
                Ok(Some(response))
            }
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await?;
                Ok(None)
            }
            JsonRpcMessage::Response(_) => {
                // We don't send requests, so we shouldn't receive responses
                Ok(None)
            }
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request).await,
            "tools/call" => self.handle_tool_call(request).await,
            "tools/list" => self.handle_tools_list(request).await,
            _ => Ok(error_response(
                request.id,
                -32601,
                format!("Method '{}' not found", request.method),
            )),
        }
    }

    async fn handle_initialize(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let capabilities = serde_json::json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {
                    "listChanged": true
                }
            },
            "serverInfo": {
                "name": "aws-api-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        Ok(result_response(request.id, capabilities))
    }

    async fn handle_tools_list(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        Ok(result_response(request.id, tool_definitions()))
    }

    async fn handle_tool_call(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let params = request
            .params
            .ok_or_else(|| McpError::InvalidRequest("Missing params for tools/call".to_string()))?;

        let tool_call: ToolCall = match serde_json::from_value(params) {
            Ok(call) => call,
            Err(e) => {
                return Ok(error_response(
                    request.id,
                    -32602,
                    format!("Invalid tool call params: {e}"),
                ))
            }
        };

        match tool_call.name.as_str() {
            "suggest_aws_commands" => self.suggest_aws_commands(request.id, tool_call.arguments),
            "call_aws" => self.call_aws(request.id, tool_call.arguments).await,
            _ => Ok(error_response(
                request.id,
                -32601,
                format!("Tool '{}' not found", tool_call.name),
            )),
        }
    }

    /// Ranks corpus commands against a natural-language query.
    fn suggest_aws_commands(
        &self,
        id: serde_json::Value,
        arguments: serde_json::Value,
    ) -> Result<JsonRpcResponse> {
        let request: SuggestRequest = match serde_json::from_value(arguments) {
            Ok(request) => request,
            Err(e) => {
                return Ok(error_response(
                    id,
                    -32602,
                    format!("Invalid suggest_aws_commands arguments: {e}"),
                ))
            }
        };

        let query_vector = match self.embedder.embed(&request.query) {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!("Failed to embed query: {}", e);
                return Ok(error_response(id, -32000, format!("{e}")));
            }
        };

        let corpus = self.corpus.load();
        let k = request.max_results.unwrap_or(DEFAULT_MAX_SUGGESTIONS).max(1);
        let candidates = match ranker::rank(&corpus, &query_vector, k) {
            Ok(candidates) => candidates,
            Err(e) => return Ok(error_response(id, -32000, format!("{e}"))),
        };

        let response = SuggestionsResponse {
            suggestions: candidates
                .iter()
                .map(|c| Suggestion {
                    command: c.spec.cli_template(),
                    similarity: c.score,
                    required_parameters: c.spec.required_parameters(),
                    description: c.spec.description.clone(),
                })
                .collect(),
        };

        Ok(result_response(id, text_content(serde_json::to_string(&response)?)))
    }

    /// Validates a candidate command and executes it when allowed.
    async fn call_aws(
        &self,
        id: serde_json::Value,
        arguments: serde_json::Value,
    ) -> Result<JsonRpcResponse> {
        let request: CallAwsRequest = match serde_json::from_value(arguments) {
            Ok(request) => request,
            Err(e) => {
                return Ok(error_response(
                    id,
                    -32602,
                    format!("Invalid call_aws arguments: {e}"),
                ))
            }
        };

        let corpus = self.corpus.load();
        let validator = Validator::new(&corpus, self.config.access_mode);
        let verdict = validator.validate(&request.cli_command);

        let command = match verdict {
            ValidationVerdict::Allowed { command } => command,
            denied => {
                tracing::info!(
                    command = %request.cli_command,
                    reason = denied.reason().unwrap_or(""),
                    "rejected candidate command"
                );
                // Rejections are expected outcomes, reported as tool output.
                return Ok(result_response(
                    id,
                    text_content(serde_json::to_string(&denied)?),
                ));
            }
        };

        let cli = CliCommand::from_parsed(command, &self.config);

        // Generate a human-readable description of the command
        let mut description_output = Vec::new();
        if let Err(e) = cli.queue_description(&mut description_output) {
            tracing::warn!("Failed to generate command description: {}", e);
        }
        let description = String::from_utf8(description_output).unwrap_or_default();

        match cli.invoke().await {
            Ok(invoke_output) => {
                let result: ExecutionResult = invoke_output.into();
                Ok(result_response(
                    id,
                    text_content(format!(
                        "{}\n\nResult:\n{}",
                        description,
                        serde_json::to_string(&result)?
                    )),
                ))
            }
            Err(e) => {
                // Non-zero exits and spawn failures surface verbatim.
                let error = McpError::Execution(e.to_string());
                tracing::error!("{}", error);
                Ok(error_response(id, -32000, error.to_string()))
            }
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) -> Result<()> {
        match notification.method.as_str() {
            "notifications/initialized" => {
                // Server is initialized, we can start handling requests
                Ok(())
            }
            _ => {
                // Ignore unknown notifications
                Ok(())
            }
        }
    }
}

fn result_response(id: serde_json::Value, result: serde_json::Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: Some(result),
        error: None,
    }
}

fn error_response(id: serde_json::Value, code: i32, message: String) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            message,
            data: None,
        }),
    }
}

fn text_content(text: String) -> serde_json::Value {
    serde_json::json!({
        "content": [
            {
                "type": "text",
                "text": text
            }
        ]
    })
}

/// Tool schemas served from `tools/list`. Kept in code so they cannot drift
/// from the request structs.
fn tool_definitions() -> serde_json::Value {
    serde_json::json!({
        "tools": [
            {
                "name": "suggest_aws_commands",
                "description": "Suggest AWS CLI commands for a natural language query. \
                    Use when unsure which service or operation fits the task; each query \
                    should describe one task accomplishable by a single CLI command.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Natural language description of what to do in AWS"
                        },
                        "max_results": {
                            "type": "integer",
                            "description": "Maximum number of suggestions to return"
                        }
                    },
                    "required": ["query"]
                }
            },
            {
                "name": "call_aws",
                "description": "Validate and execute an AWS CLI command. The command must \
                    start with 'aws' and may not use shell pipes, redirection, or \
                    substitution. Commands are checked against the command catalog, the \
                    operation denylist, and the configured access mode before execution.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "cli_command": {
                            "type": "string",
                            "description": "The complete AWS CLI command to execute"
                        }
                    },
                    "required": ["cli_command"]
                }
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessMode;

    fn server(access_mode: AccessMode) -> AwsMcpServer {
        let config = ServerConfig {
            access_mode,
            ..ServerConfig::default()
        };
        let corpus = CorpusIndex::build_builtin(&Embedder::default()).unwrap();
        AwsMcpServer::new(config, corpus)
    }

    fn request(method: &str, params: serde_json::Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: serde_json::json!(1),
            method: method.to_string(),
            params: Some(params),
        }
    }

    fn result_text(response: &JsonRpcResponse) -> String {
        response.result.as_ref().unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let server = server(AccessMode::Normal);
        let response = server
            .handle_request(request("initialize", serde_json::json!({})))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "aws-api-mcp");
        assert_eq!(result["protocolVersion"], "2024-11-05");
    }

    #[tokio::test]
    async fn tools_list_exposes_both_tools() {
        let server = server(AccessMode::Normal);
        let response = server
            .handle_request(request("tools/list", serde_json::json!({})))
            .await
            .unwrap();
        let tools = response.result.unwrap()["tools"].clone();
        let names: Vec<&str> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["suggest_aws_commands", "call_aws"]);
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let server = server(AccessMode::Normal);
        let response = server
            .handle_request(request("resources/list", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let server = server(AccessMode::Normal);
        let response = server
            .handle_request(request(
                "tools/call",
                serde_json::json!({"name": "use_gcp", "arguments": {}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn suggest_returns_ranked_commands() {
        let server = server(AccessMode::Normal);
        let response = server
            .handle_request(request(
                "tools/call",
                serde_json::json!({
                    "name": "suggest_aws_commands",
                    "arguments": {"query": "list all my EC2 instances", "max_results": 5}
                }),
            ))
            .await
            .unwrap();
        let text = result_text(&response);
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        let suggestions = parsed["suggestions"].as_array().unwrap();
        assert_eq!(suggestions.len(), 5);
        assert!(suggestions
            .iter()
            .any(|s| s["command"] == "aws ec2 describe-instances"));
        // Descending similarity.
        let scores: Vec<f64> = suggestions
            .iter()
            .map(|s| s["similarity"].as_f64().unwrap())
            .collect();
        for pair in scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[tokio::test]
    async fn suggest_rejects_empty_query() {
        let server = server(AccessMode::Normal);
        let response = server
            .handle_request(request(
                "tools/call",
                serde_json::json!({
                    "name": "suggest_aws_commands",
                    "arguments": {"query": "   "}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32000);
    }

    #[tokio::test]
    async fn call_aws_reports_denylist_rejection_without_executing() {
        let server = server(AccessMode::Normal);
        let response = server
            .handle_request(request(
                "tools/call",
                serde_json::json!({
                    "name": "call_aws",
                    "arguments": {"cli_command":
                        "aws emr sock --cluster-id j-1 --key-pair-file key.pem"}
                }),
            ))
            .await
            .unwrap();
        let text = result_text(&response);
        let verdict: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(verdict["verdict"], "denied_denylisted");
    }

    #[tokio::test]
    async fn call_aws_reports_read_only_rejection() {
        let server = server(AccessMode::ReadOnly);
        let response = server
            .handle_request(request(
                "tools/call",
                serde_json::json!({
                    "name": "call_aws",
                    "arguments": {"cli_command":
                        "aws ec2 terminate-instances --instance-ids i-0abc"}
                }),
            ))
            .await
            .unwrap();
        let text = result_text(&response);
        let verdict: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(verdict["verdict"], "denied_read_only");
    }

    #[tokio::test]
    async fn call_aws_reports_malformed_rejection() {
        let server = server(AccessMode::Normal);
        let response = server
            .handle_request(request(
                "tools/call",
                serde_json::json!({
                    "name": "call_aws",
                    "arguments": {"cli_command": "aws ec2 describe-unicorns"}
                }),
            ))
            .await
            .unwrap();
        let text = result_text(&response);
        let verdict: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(verdict["verdict"], "denied_malformed");
    }

    #[tokio::test]
    async fn corpus_reload_swaps_catalog() {
        let server = server(AccessMode::Normal);
        let table = r#"{
            "version": "v2",
            "commands": [
                {"service": "sts", "operation": "get-caller-identity",
                 "description": "who am i", "access": "read", "parameters": []}
            ]
        }"#;
        server.reload_corpus(CorpusIndex::build(table, &Embedder::default()).unwrap());

        let response = server
            .handle_request(request(
                "tools/call",
                serde_json::json!({
                    "name": "call_aws",
                    "arguments": {"cli_command": "aws ec2 describe-instances"}
                }),
            ))
            .await
            .unwrap();
        let verdict: serde_json::Value =
            serde_json::from_str(&result_text(&response)).unwrap();
        assert_eq!(verdict["verdict"], "denied_malformed");
    }
}
