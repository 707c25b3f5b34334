use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

use super::SharedState;
use crate::error::{McpError, McpResult};
use crate::research::ExecutionMode;

/// Arguments for `research_start`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartParams {
    /// The research query
    pub query: String,
    /// Wait for the run to finish before responding
    #[serde(default = "default_wait")]
    pub wait: bool,
}

/// Arguments for `research_continue`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueParams {
    /// Completed session to build upon
    pub parent_id: String,
    /// The follow-up query
    pub query: String,
    /// Wait for the run to finish before responding
    #[serde(default = "default_wait")]
    pub wait: bool,
}

/// Arguments for `research_upload`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadParams {
    /// Session the document belongs to
    pub session_id: String,
    /// Local path of a `.pdf` or `.txt` file
    pub path: PathBuf,
}

/// Arguments for `research_get`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetParams {
    /// Session to fetch
    pub session_id: String,
}

/// Arguments for `research_history`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryParams {
    /// Owner to list; defaults to the configured user
    #[serde(default)]
    pub user_id: Option<String>,
    /// Maximum sessions returned
    #[serde(default)]
    pub limit: Option<u32>,
}

fn default_wait() -> bool {
    true
}

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        "research_start" => handle_start(state, arguments).await,
        "research_continue" => handle_continue(state, arguments).await,
        "research_upload" => handle_upload(state, arguments).await,
        "research_get" => handle_get(state, arguments).await,
        "research_history" => handle_history(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

async fn handle_start(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("research_start", arguments, |params: StartParams| async move {
        state
            .orchestrator
            .start_new(&params.query, ExecutionMode::from_wait(params.wait))
            .await
    })
    .await
}

async fn handle_continue(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("research_continue", arguments, |params: ContinueParams| async move {
        state
            .orchestrator
            .continue_from(
                &params.parent_id,
                &params.query,
                ExecutionMode::from_wait(params.wait),
            )
            .await
    })
    .await
}

async fn handle_upload(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: UploadParams = parse_arguments("research_upload", arguments)?;

    let document = state
        .ingestor
        .ingest_path(&params.session_id, &params.path)
        .await?;

    serde_json::to_value(document).map_err(McpError::Json)
}

async fn handle_get(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("research_get", arguments, |params: GetParams| async move {
        state.orchestrator.get_session(&params.session_id).await
    })
    .await
}

/// `research_history` accepts missing arguments.
async fn handle_history(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: HistoryParams = match arguments {
        Some(Value::Null) | None => HistoryParams::default(),
        args => parse_arguments("research_history", args)?,
    };

    let sessions = state
        .orchestrator
        .history(params.user_id.as_deref(), params.limit)
        .await?;

    Ok(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    let args = arguments.ok_or_else(|| McpError::InvalidParameters {
        tool_name: tool_name.to_string(),
        message: "Missing arguments".to_string(),
    })?;

    serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
        tool_name: tool_name.to_string(),
        message: e.to_string(),
    })
}

/// Parse typed arguments, run `operation` and serialize its result.
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: std::fmt::Display,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(result).map_err(McpError::Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_support::test_state;
    use serde_json::json;

    const SUMMARY: &str = "SUMMARY: Done.\nKEY_FINDINGS: [\"one\"]\nSOURCES: [\"model\"]";

    #[test]
    fn test_start_params_default_to_waiting() {
        let params: StartParams = serde_json::from_value(json!({"query": "abc"})).unwrap();
        assert!(params.wait);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let state = test_state(SUMMARY).await;
        let err = handle_tool_call(&state, "research_delete", None)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn test_start_requires_arguments() {
        let state = test_state(SUMMARY).await;
        let err = handle_tool_call(&state, "research_start", None)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParameters { .. }));
    }

    #[tokio::test]
    async fn test_start_rejects_short_query() {
        let state = test_state(SUMMARY).await;
        let err = handle_tool_call(&state, "research_start", Some(json!({"query": "hi"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at least 10"));
    }

    #[tokio::test]
    async fn test_start_get_and_history() {
        let state = test_state(SUMMARY).await;

        let started = handle_tool_call(
            &state,
            "research_start",
            Some(json!({"query": "How do vaccines train immunity?"})),
        )
        .await
        .unwrap();
        assert_eq!(started["status"], "completed");
        let id = started["id"].as_str().unwrap().to_string();

        let detail = handle_tool_call(&state, "research_get", Some(json!({"session_id": id})))
            .await
            .unwrap();
        assert_eq!(detail["summary"]["summary_text"], "Done.");
        assert_eq!(detail["reasoning"]["steps"].as_array().unwrap().len(), 4);
        assert!(detail["cost"]["total_tokens"].as_u64().unwrap() > 0);

        let history = handle_tool_call(&state, "research_history", None)
            .await
            .unwrap();
        assert_eq!(history["count"], 1);
        assert_eq!(history["sessions"][0]["id"], detail["session"]["id"]);
    }

    #[tokio::test]
    async fn test_continue_from_missing_parent() {
        let state = test_state(SUMMARY).await;
        let err = handle_tool_call(
            &state,
            "research_continue",
            Some(json!({"parent_id": "nope", "query": "A longer follow-up query"})),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Previous research session not found."));
    }

    #[tokio::test]
    async fn test_get_missing_session() {
        let state = test_state(SUMMARY).await;
        let err = handle_tool_call(&state, "research_get", Some(json!({"session_id": "nope"})))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ExecutionFailed { .. }));
        assert!(err.to_string().contains("Session not found"));
    }
}
