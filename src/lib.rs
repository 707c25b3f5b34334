//! # MCP Deep Research Server
//!
//! A Model Context Protocol (MCP) server that answers research questions by
//! running a staged LLM pipeline and persisting every session.
//!
//! ## Features
//!
//! - **Staged pipeline**: plan, research, report and summarize, each one
//!   model call feeding the next
//! - **Continuation**: follow-up sessions build on a completed session's
//!   summary or report
//! - **Document context**: uploaded PDF/TXT files are extracted, summarized
//!   and injected into prompts
//! - **Cost tracking**: token counts and estimated USD cost per session and
//!   per stage
//! - **Background runs**: a bounded worker pool for non-blocking requests
//!
//! Stage two synthesizes from the model's own knowledge; no web search or
//! retrieval is performed.
//!
//! ## Architecture
//!
//! ```text
//! MCP Client / CLI → SessionOrchestrator → ResearchPipeline → LLM (HTTP)
//!                           ↓
//!                     SQLite (State)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mcp_deep_research::{Config, AppState, McpServer};
//! use mcp_deep_research::llm::OpenAiClient;
//! use mcp_deep_research::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let llm = OpenAiClient::new(&config.llm, config.request.clone())?;
//!     let state = Arc::new(AppState::new(config, Arc::new(storage), Arc::new(llm))?);
//!     McpServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Command-line interface definitions.
pub mod cli;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// LLM client trait and OpenAI-compatible implementation.
pub mod llm;
/// Prompt templates for every pipeline stage.
pub mod prompts;
/// Research pipeline, context composition and session orchestration.
pub mod research;
/// MCP server implementation and request handling.
pub mod server;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
