//! Command-line interface.
//!
//! `serve` (the default) runs the MCP server on stdio. The other
//! subcommands drive the same orchestrator directly and print plain-text
//! results to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::research::{ExecutionMode, SessionDetail};
use crate::server::AppState;
use crate::storage::{ResearchSession, SessionStatus};

/// Deep research MCP server and command-line client.
#[derive(Parser, Debug)]
#[command(name = "mcp-deep-research", version, about)]
pub struct Cli {
    /// Subcommand to run; defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the MCP server over stdio
    Serve,

    /// Run a new research session and print the report
    Run {
        /// The research query
        query: String,
    },

    /// Run a follow-up session building on a completed one
    Continue {
        /// ID of the completed parent session
        parent_id: String,
        /// The follow-up query
        query: String,
    },

    /// Attach a PDF or TXT document to a session
    Upload {
        /// Session to attach the document to
        session_id: String,
        /// Path to the document
        path: PathBuf,
    },

    /// Show a session with its summary, reasoning and cost
    Show {
        /// Session ID
        session_id: String,
    },

    /// List past sessions, newest first
    History {
        /// Owner to list (defaults to the configured user)
        #[arg(long)]
        user: Option<String>,

        /// Maximum number of sessions to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a non-serve command against `state`.
pub async fn execute_command(command: Commands, state: &AppState) -> CliResult {
    match command {
        Commands::Serve => CliResult::error("serve is handled by the binary entry point"),
        Commands::Run { query } => {
            let result = state
                .orchestrator
                .start_new(&query, ExecutionMode::Blocking)
                .await;
            match result {
                Ok(session) => session_outcome(&session),
                Err(e) => CliResult::error(format!("Error: {}", e)),
            }
        }
        Commands::Continue { parent_id, query } => {
            let result = state
                .orchestrator
                .continue_from(&parent_id, &query, ExecutionMode::Blocking)
                .await;
            match result {
                Ok(session) => session_outcome(&session),
                Err(e) => CliResult::error(format!("Error: {}", e)),
            }
        }
        Commands::Upload { session_id, path } => {
            match state.ingestor.ingest_path(&session_id, &path).await {
                Ok(doc) => CliResult::success(format!(
                    "Uploaded {} ({}, {} bytes) as {}\nSummary: {}",
                    doc.filename,
                    doc.document_type,
                    doc.file_size,
                    doc.id,
                    doc.summary.as_deref().unwrap_or("-")
                )),
                Err(e) => CliResult::error(format!("Error: {}", e)),
            }
        }
        Commands::Show { session_id } => match state.orchestrator.get_session(&session_id).await {
            Ok(detail) => CliResult::success(format_detail(&detail)),
            Err(e) => CliResult::error(format!("Error: {}", e)),
        },
        Commands::History { user, limit } => {
            match state.orchestrator.history(user.as_deref(), Some(limit)).await {
                Ok(sessions) => CliResult::success(format_history(&sessions)),
                Err(e) => CliResult::error(format!("Error: {}", e)),
            }
        }
    }
}

fn session_outcome(session: &ResearchSession) -> CliResult {
    let report = session.final_report.as_deref().unwrap_or("");
    let text = format!("Session {} [{}]\n\n{}", session.id, session.status, report);
    match session.status {
        SessionStatus::Completed => CliResult::success(text),
        _ => CliResult::error(text),
    }
}

/// Render a session detail for terminal output
pub fn format_detail(detail: &SessionDetail) -> String {
    let session = &detail.session;
    let mut output = String::new();

    output.push_str(&format!("Session:  {}\n", session.id));
    output.push_str(&format!("Query:    {}\n", session.query));
    output.push_str(&format!("Status:   {}\n", session.status));
    output.push_str(&format!("Created:  {}\n", session.created_at.to_rfc3339()));
    if let Some(parent) = &session.parent_session_id {
        output.push_str(&format!("Parent:   {}\n", parent));
    }
    if !detail.children.is_empty() {
        output.push_str(&format!("Children: {}\n", detail.children.join(", ")));
    }

    if let Some(cost) = &detail.cost {
        output.push_str(&format!(
            "Tokens:   {} in / {} out / {} total (${:.6}, {})\n",
            cost.input_tokens, cost.output_tokens, cost.total_tokens, cost.estimated_cost, cost.model
        ));
        for stage in &cost.breakdown {
            output.push_str(&format!(
                "  {:<10} {:>7} in {:>7} out\n",
                stage.stage, stage.input_tokens, stage.output_tokens
            ));
        }
    }

    if let Some(summary) = &detail.summary {
        output.push_str(&format!("\nSummary:\n{}\n", summary.summary_text));
        if !summary.key_findings.is_empty() {
            output.push_str("\nKey findings:\n");
            for finding in &summary.key_findings {
                output.push_str(&format!("  - {}\n", finding));
            }
        }
        if !summary.sources.is_empty() {
            output.push_str(&format!("\nSources: {}\n", summary.sources.join("; ")));
        }
    }

    if !detail.documents.is_empty() {
        output.push_str("\nDocuments:\n");
        for doc in &detail.documents {
            output.push_str(&format!(
                "  {} ({}, {} bytes)\n",
                doc.filename, doc.document_type, doc.file_size
            ));
        }
    }

    if let Some(report) = &session.final_report {
        output.push_str(&format!("\nReport:\n{}\n", report));
    }

    output
}

/// Render a history listing for terminal output
pub fn format_history(sessions: &[ResearchSession]) -> String {
    if sessions.is_empty() {
        return "No research sessions found.".to_string();
    }

    sessions
        .iter()
        .map(|s| {
            format!(
                "{}  {:<9}  {}  {}",
                s.created_at.format("%Y-%m-%d %H:%M"),
                s.status.to_string(),
                s.id,
                s.query
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
