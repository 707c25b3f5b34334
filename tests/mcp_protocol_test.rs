//! Integration tests for MCP protocol handling
//!
//! Drives the server over in-memory streams with a canned LLM and an
//! in-memory database.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;

use mcp_deep_research::config::{
    Config, DatabaseConfig, DocumentConfig, LlmConfig, LogFormat, LoggingConfig, RequestConfig,
    ResearchConfig,
};
use mcp_deep_research::error::LlmResult;
use mcp_deep_research::llm::{CompletionRequest, LlmClient};
use mcp_deep_research::server::{
    error_codes, initialize_result, tool_definitions, AppState, McpServer, PROTOCOL_VERSION,
    SERVER_NAME,
};
use mcp_deep_research::storage::SqliteStorage;

/// LLM stub answering every stage with the same summary-shaped text
struct CannedLlm;

#[async_trait]
impl LlmClient for CannedLlm {
    async fn complete(&self, _request: CompletionRequest) -> LlmResult<String> {
        Ok("SUMMARY: Canned.\nKEY_FINDINGS: [\"one\"]\nSOURCES: [\"two\"]".to_string())
    }
}

fn test_config() -> Config {
    Config {
        llm: LlmConfig::new("test-key", "http://localhost:9"),
        database: DatabaseConfig {
            path: PathBuf::from(":memory:"),
            max_connections: 1,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        },
        request: RequestConfig::default(),
        research: ResearchConfig::default(),
        documents: DocumentConfig::default(),
    }
}

async fn create_server() -> McpServer {
    let storage = SqliteStorage::new_in_memory().await.unwrap();
    let state = AppState::new(test_config(), Arc::new(storage), Arc::new(CannedLlm)).unwrap();
    McpServer::new(Arc::new(state))
}

/// Feed newline-delimited requests through the server and collect responses
async fn exchange(server: &McpServer, requests: &[Value]) -> Vec<Value> {
    let input: String = requests
        .iter()
        .map(|r| format!("{}\n", r))
        .collect();
    let mut output = Vec::new();

    server
        .serve(BufReader::new(input.as_bytes()), &mut output)
        .await
        .unwrap();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).expect("Failed to parse JSON-RPC response"))
        .collect()
}

/// Verify JSON-RPC 2.0 response structure
fn assert_valid_jsonrpc_response(response: &Value) {
    assert_eq!(response["jsonrpc"], "2.0", "Invalid JSON-RPC version");
    assert!(
        response.get("result").is_some() || response.get("error").is_some(),
        "Response must have result or error"
    );
}

fn tool_text(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[cfg(test)]
mod initialize_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_initialize_result_structure() {
        let result = initialize_result();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(result["serverInfo"]["version"].is_string());
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let server = create_server().await;
        let responses = exchange(
            &server,
            &[
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "initialize",
                    "params": {
                        "protocolVersion": "2024-11-05",
                        "capabilities": {},
                        "clientInfo": {"name": "test-client", "version": "1.0.0"}
                    }
                }),
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
                json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
            ],
        )
        .await;

        // The notification gets no response
        assert_eq!(responses.len(), 2);
        assert_valid_jsonrpc_response(&responses[0]);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"], json!({}));
    }
}

#[cfg(test)]
mod tools_list_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tool_names() {
        let names: Vec<String> = tool_definitions().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "research_start",
                "research_continue",
                "research_upload",
                "research_get",
                "research_history"
            ]
        );
    }

    #[test]
    fn test_tool_schemas_are_closed_objects() {
        for tool in tool_definitions() {
            let schema = serde_json::to_value(&tool).unwrap();
            assert!(schema.get("inputSchema").is_some(), "{} uses camelCase", tool.name);
            assert_eq!(tool.input_schema["type"], "object");
            assert_eq!(tool.input_schema["additionalProperties"], false);
        }
    }

    #[tokio::test]
    async fn test_tools_list_over_stream() {
        let server = create_server().await;
        let responses = exchange(
            &server,
            &[json!({"jsonrpc": "2.0", "id": "list", "method": "tools/list"})],
        )
        .await;

        assert_eq!(responses[0]["id"], "list");
        assert_eq!(responses[0]["result"]["tools"].as_array().unwrap().len(), 5);
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_parse_error() {
        let server = create_server().await;
        let mut output = Vec::new();
        server
            .serve(BufReader::new(&b"{not json}\n\n"[..]), &mut output)
            .await
            .unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 1);
        let response: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(response["error"]["code"], error_codes::PARSE_ERROR);
        assert!(response["id"].is_null());
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let server = create_server().await;
        let responses = exchange(
            &server,
            &[json!({"jsonrpc": "2.0", "id": 7, "method": "resources/list"})],
        )
        .await;

        assert_eq!(responses[0]["error"]["code"], error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_protocol_version() {
        let server = create_server().await;
        let responses = exchange(
            &server,
            &[json!({"jsonrpc": "1.0", "id": 3, "method": "ping"})],
        )
        .await;

        assert_eq!(responses[0]["error"]["code"], error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_tool_error_is_reported_in_result() {
        let server = create_server().await;
        let responses = exchange(
            &server,
            &[json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": {"name": "research_start", "arguments": {"query": "short"}}
            })],
        )
        .await;

        assert!(responses[0].get("error").is_none());
        assert_eq!(responses[0]["result"]["isError"], true);
        let text = responses[0]["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Error:"));
    }
}

#[cfg(test)]
mod tool_call_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_start_then_get_and_history() {
        let server = create_server().await;
        let responses = exchange(
            &server,
            &[json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": {
                    "name": "research_start",
                    "arguments": {"query": "Why do leaves change colour in autumn?"}
                }
            })],
        )
        .await;

        assert!(responses[0]["result"].get("isError").is_none());
        let session = tool_text(&responses[0]);
        assert_eq!(session["status"], "completed");
        let id = session["id"].as_str().unwrap().to_string();

        let responses = exchange(
            &server,
            &[
                json!({
                    "jsonrpc": "2.0",
                    "id": 2,
                    "method": "tools/call",
                    "params": {"name": "research_get", "arguments": {"session_id": id}}
                }),
                json!({
                    "jsonrpc": "2.0",
                    "id": 3,
                    "method": "tools/call",
                    "params": {"name": "research_history"}
                }),
            ],
        )
        .await;

        let detail = tool_text(&responses[0]);
        assert_eq!(detail["session"]["id"], id.as_str());
        assert_eq!(detail["summary"]["summary_text"], "Canned.");
        assert!(detail["cost"]["total_tokens"].as_u64().unwrap() > 0);

        let history = tool_text(&responses[1]);
        assert_eq!(history["count"], 1);
    }

    #[tokio::test]
    async fn test_upload_through_tool_call() {
        let server = create_server().await;
        let responses = exchange(
            &server,
            &[json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": {
                    "name": "research_start",
                    "arguments": {"query": "What is the history of paper making?"}
                }
            })],
        )
        .await;
        let id = tool_text(&responses[0])["id"].as_str().unwrap().to_string();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "short").unwrap();

        let responses = exchange(
            &server,
            &[json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": {
                    "name": "research_upload",
                    "arguments": {"session_id": id, "path": path}
                }
            })],
        )
        .await;

        let document = tool_text(&responses[0]);
        assert_eq!(document["filename"], "notes.txt");
        assert_eq!(document["document_type"], "text");
        assert_eq!(document["summary"], "Document too short to summarize.");
    }
}
