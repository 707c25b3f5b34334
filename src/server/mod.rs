//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Research tool handlers and routing
//! - Shared application state

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::error::AppResult;
use crate::llm::LlmClient;
use crate::research::{DocumentIngestor, SessionOrchestrator};
use crate::storage::Storage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Persistence backend.
    pub storage: Arc<dyn Storage>,
    /// Session lifecycle owner.
    pub orchestrator: SessionOrchestrator,
    /// Upload handling.
    pub ingestor: DocumentIngestor,
}

impl AppState {
    /// Wire the orchestrator and ingestor around shared storage and LLM handles
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        llm: Arc<dyn LlmClient>,
    ) -> AppResult<Self> {
        let orchestrator = SessionOrchestrator::from_config(storage.clone(), llm.clone(), &config)?;
        let ingestor = DocumentIngestor::from_config(storage.clone(), llm, &config);

        tracing::info!(
            model = %config.llm.model,
            max_concurrent_runs = config.research.max_concurrent_runs,
            "Application state initialized"
        );

        Ok(Self {
            config,
            storage,
            orchestrator,
            ingestor,
        })
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::{
        DatabaseConfig, DocumentConfig, LlmConfig, LogFormat, LoggingConfig, RequestConfig,
        ResearchConfig,
    };
    use crate::llm::MockLlmClient;
    use crate::storage::SqliteStorage;
    use std::path::PathBuf;

    pub fn test_config() -> Config {
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

    /// State whose LLM answers every prompt with `reply`.
    pub async fn test_state(reply: &'static str) -> SharedState {
        let mut llm = MockLlmClient::new();
        llm.expect_complete()
            .returning(move |_| Ok(reply.to_string()));

        let storage = SqliteStorage::new_in_memory().await.unwrap();
        Arc::new(AppState::new(test_config(), Arc::new(storage), Arc::new(llm)).unwrap())
    }
}
