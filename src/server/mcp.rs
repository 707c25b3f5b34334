//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! One JSON object per line on stdin; one response per line on stdout.
//! Notifications get no response.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// MCP protocol revision implemented by this server.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name reported during the initialize handshake.
pub const SERVER_NAME: &str = "mcp-deep-research";

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,
    /// Absent for notifications.
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Request id, or null when it could not be determined.
    pub id: Value,
    /// Present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard JSON-RPC error codes used by the server.
pub mod error_codes {
    /// Invalid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Bad method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Server-side failure.
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Tool name used in `tools/call`.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema of the arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters of a `tools/call` request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// Tool to invoke.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// One content item of a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// Content type, always "text" here.
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text payload.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// Content items.
    pub content: Vec<ToolResultContent>,
    /// Set when the tool failed.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    /// Single text item result
    pub fn text(text: impl Into<String>, is_error: bool) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text: text.into(),
            }],
            is_error: is_error.then_some(true),
        }
    }
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// MCP server speaking line-delimited JSON-RPC.
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Serve requests on stdin/stdout until EOF.
    pub async fn run(&self) -> std::io::Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.serve(reader, writer).await?;

        info!("Waiting for background research runs to finish");
        self.state.orchestrator.pool().drain().await;
        Ok(())
    }

    /// Serve requests from `reader`, writing responses to `writer`, until EOF.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(server = SERVER_NAME, "MCP server listening");

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    Some(JsonRpcResponse::error(
                        None,
                        error_codes::PARSE_ERROR,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            if let Some(response) = response {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle one request. Returns `None` for notifications.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                error_codes::INVALID_REQUEST,
                "jsonrpc must be \"2.0\"",
            ));
        }

        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(JsonRpcResponse::success(request.id, initialize_result())),
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                debug!(method = %request.method, "Received notification");
                None
            }
            "tools/list" => Some(JsonRpcResponse::success(
                request.id,
                json!({ "tools": tool_definitions() }),
            )),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(request.id, json!({}))),
            method if is_notification => {
                debug!(method = %method, "Unknown notification, ignoring");
                None
            }
            method => {
                error!(method = %method, "Unknown method");
                Some(JsonRpcResponse::error(
                    request.id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                ))
            }
        }
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params.map(serde_json::from_value) {
            Some(Ok(p)) => p,
            Some(Err(e)) => {
                return JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Invalid params: {}", e),
                );
            }
            None => return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, "Missing params"),
        };

        info!(tool = %params.name, "Handling tool call");

        let result = match handle_tool_call(&self.state, &params.name, params.arguments).await {
            Ok(value) => match serde_json::to_string_pretty(&value) {
                Ok(text) => ToolCallResult::text(text, false),
                Err(e) => ToolCallResult::text(format!("Error: {}", e), true),
            },
            Err(e) => ToolCallResult::text(format!("Error: {}", e), true),
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(
                    id,
                    error_codes::INTERNAL_ERROR,
                    format!("Internal error: {}", e),
                )
            }
        }
    }
}

/// Payload of the `initialize` response
pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// Every tool the server exposes
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: "research_start".to_string(),
            description: "Start a new research session. Runs plan, research, report and summary stages against the configured model and stores the report, summary, reasoning trace and token cost.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "minLength": 10,
                        "maxLength": 5000,
                        "description": "The research question"
                    },
                    "wait": {
                        "type": "boolean",
                        "default": true,
                        "description": "Wait for the run to finish. When false, returns the running session immediately."
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        },
        Tool {
            name: "research_continue".to_string(),
            description: "Start a follow-up session that builds on a completed session's summary or report and its uploaded documents.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "parent_id": {
                        "type": "string",
                        "description": "ID of a completed research session"
                    },
                    "query": {
                        "type": "string",
                        "minLength": 10,
                        "maxLength": 5000,
                        "description": "The follow-up question"
                    },
                    "wait": {
                        "type": "boolean",
                        "default": true,
                        "description": "Wait for the run to finish"
                    }
                },
                "required": ["parent_id", "query"],
                "additionalProperties": false
            }),
        },
        Tool {
            name: "research_upload".to_string(),
            description: "Attach a local PDF or TXT file (max 10 MB) to a session. Text is extracted and summarized; extraction failures are recorded on the document.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": {
                        "type": "string",
                        "description": "Session to attach the document to"
                    },
                    "path": {
                        "type": "string",
                        "description": "Path to a .pdf or .txt file"
                    }
                },
                "required": ["session_id", "path"],
                "additionalProperties": false
            }),
        },
        Tool {
            name: "research_get".to_string(),
            description: "Fetch a session with its summary, reasoning trace, cost, documents and follow-up sessions.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": {
                        "type": "string",
                        "description": "Session ID"
                    }
                },
                "required": ["session_id"],
                "additionalProperties": false
            }),
        },
        Tool {
            name: "research_history".to_string(),
            description: "List a user's research sessions, newest first.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {
                        "type": "string",
                        "description": "Owner to list (defaults to the configured user)"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "default": 50,
                        "description": "Maximum sessions returned"
                    }
                },
                "additionalProperties": false
            }),
        },
    ]
}
