//! Session lifecycle: validation, creation, dispatch and the terminal write.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::context::ContextComposer;
use super::pipeline::{ResearchPipeline, ResearchResult};
use super::tokens::{PricingTable, Tokenizer};
use super::worker::ResearchWorkerPool;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::llm::LlmClient;
use crate::storage::{
    CompletedResearch, CostRecord, ResearchReasoning, ResearchSession, ResearchSummary,
    SessionStatus, Storage, UploadedDocument,
};

/// Minimum query length in characters, after trimming.
pub const MIN_QUERY_CHARS: usize = 10;

/// Maximum query length in characters, after trimming.
pub const MAX_QUERY_CHARS: usize = 5000;

/// Default page size for history listings.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Trim and validate a research query.
pub fn validate_query(query: &str) -> AppResult<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("query", "Query cannot be empty"));
    }

    let chars = trimmed.chars().count();
    if chars < MIN_QUERY_CHARS {
        return Err(AppError::validation(
            "query",
            format!("Query must be at least {} characters", MIN_QUERY_CHARS),
        ));
    }
    if chars > MAX_QUERY_CHARS {
        return Err(AppError::validation(
            "query",
            format!("Query must be at most {} characters", MAX_QUERY_CHARS),
        ));
    }

    Ok(trimmed.to_string())
}

/// How a run is executed once its session is marked running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Await the run; the returned session is terminal.
    #[default]
    Blocking,
    /// Hand the run to the worker pool; the returned session is running.
    Background,
}

impl ExecutionMode {
    /// Blocking when `wait` is true
    pub fn from_wait(wait: bool) -> Self {
        if wait {
            ExecutionMode::Blocking
        } else {
            ExecutionMode::Background
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Blocking => write!(f, "blocking"),
            ExecutionMode::Background => write!(f, "background"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocking" | "wait" => Ok(ExecutionMode::Blocking),
            "background" => Ok(ExecutionMode::Background),
            _ => Err(format!("Unknown execution mode: {}", s)),
        }
    }
}

/// A session with every record it owns or links to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    /// The session row.
    pub session: ResearchSession,
    /// Parsed summary, once completed.
    pub summary: Option<ResearchSummary>,
    /// Reasoning trace, once completed.
    pub reasoning: Option<ResearchReasoning>,
    /// Token usage and cost.
    pub cost: Option<CostRecord>,
    /// Uploaded documents in upload order.
    pub documents: Vec<UploadedDocument>,
    /// Sessions continuing from this one, newest first.
    pub children: Vec<String>,
}

/// Owns the session state machine and dispatches pipeline runs.
#[derive(Clone)]
pub struct SessionOrchestrator {
    storage: Arc<dyn Storage>,
    pipeline: ResearchPipeline,
    composer: ContextComposer,
    pool: Arc<ResearchWorkerPool>,
    default_user: String,
}

impl SessionOrchestrator {
    /// Create an orchestrator around an existing pipeline and pool
    pub fn new(
        storage: Arc<dyn Storage>,
        pipeline: ResearchPipeline,
        pool: Arc<ResearchWorkerPool>,
    ) -> Self {
        Self {
            storage,
            pipeline,
            composer: ContextComposer::new(),
            pool,
            default_user: "default".to_string(),
        }
    }

    /// Build the pipeline, tokenizer and worker pool from configuration
    pub fn from_config(
        storage: Arc<dyn Storage>,
        llm: Arc<dyn LlmClient>,
        config: &Config,
    ) -> AppResult<Self> {
        let tokenizer = Tokenizer::for_model(&config.llm.model)?;
        let pricing = Arc::new(PricingTable::default());
        if !pricing.knows(&config.llm.model) {
            warn!(
                model = %config.llm.model,
                "No pricing row for model, cost estimates use default rates"
            );
        }
        let pipeline = ResearchPipeline::new(llm, tokenizer, pricing, &config.llm.model)
            .with_temperature(config.llm.temperature);
        let pool = Arc::new(ResearchWorkerPool::new(config.research.max_concurrent_runs));

        Ok(Self::new(storage, pipeline, pool).with_default_user(&config.research.default_user))
    }

    /// Owner recorded on new sessions
    pub fn with_default_user(mut self, user_id: impl Into<String>) -> Self {
        self.default_user = user_id.into();
        self
    }

    /// The background worker pool
    pub fn pool(&self) -> &Arc<ResearchWorkerPool> {
        &self.pool
    }

    /// Start a fresh research session.
    pub async fn start_new(&self, query: &str, mode: ExecutionMode) -> AppResult<ResearchSession> {
        let query = validate_query(query)?;
        let session = ResearchSession::new(query).with_user(&self.default_user);

        self.launch(session, None, mode).await
    }

    /// Start a session that builds on a completed parent.
    ///
    /// The parent must exist and be completed; otherwise nothing is written.
    pub async fn continue_from(
        &self,
        parent_id: &str,
        query: &str,
        mode: ExecutionMode,
    ) -> AppResult<ResearchSession> {
        let query = validate_query(query)?;

        let parent = match self.storage.get_session(parent_id).await? {
            Some(parent) if parent.status == SessionStatus::Completed => parent,
            Some(parent) => {
                warn!(
                    parent_id = %parent_id,
                    status = %parent.status,
                    "Rejected continuation from unfinished session"
                );
                return Err(AppError::validation(
                    "parent_id",
                    "Previous research session is not completed.",
                ));
            }
            None => {
                return Err(AppError::validation(
                    "parent_id",
                    "Previous research session not found.",
                ))
            }
        };

        let session = ResearchSession::new(query)
            .with_user(&parent.user_id)
            .with_parent(&parent.id);

        self.launch(session, Some(parent), mode).await
    }

    /// A session with its summary, reasoning, cost, documents and children.
    pub async fn get_session(&self, id: &str) -> AppResult<SessionDetail> {
        let session = self.storage.require_session(id).await?;
        let summary = self.storage.get_summary(id).await?;
        let reasoning = self.storage.get_reasoning(id).await?;
        let cost = self.storage.get_cost(id).await?;
        let documents = self.storage.get_session_documents(id).await?;
        let children = self
            .storage
            .list_child_sessions(id)
            .await?
            .into_iter()
            .map(|child| child.id)
            .collect();

        Ok(SessionDetail {
            session,
            summary,
            reasoning,
            cost,
            documents,
            children,
        })
    }

    /// A user's sessions, newest first. Defaults to the configured user.
    pub async fn history(
        &self,
        user_id: Option<&str>,
        limit: Option<u32>,
    ) -> AppResult<Vec<ResearchSession>> {
        let user_id = user_id.unwrap_or(&self.default_user);
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).max(1);
        Ok(self.storage.list_sessions(user_id, limit).await?)
    }

    async fn launch(
        &self,
        mut session: ResearchSession,
        parent: Option<ResearchSession>,
        mode: ExecutionMode,
    ) -> AppResult<ResearchSession> {
        let cost = CostRecord::new(&session.id, self.pipeline.model());
        self.storage.create_session(&session, &cost).await?;

        let trace_id = Uuid::new_v4().to_string();
        self.storage.mark_running(&session.id, &trace_id).await?;
        session.status = SessionStatus::Running;
        session.trace_id = Some(trace_id.clone());

        info!(
            session_id = %session.id,
            trace_id = %trace_id,
            parent_id = ?session.parent_session_id,
            mode = %mode,
            "Research session started"
        );

        let job = ResearchJob {
            storage: self.storage.clone(),
            pipeline: self.pipeline.clone(),
            composer: self.composer,
            session_id: session.id.clone(),
            trace_id,
            query: session.query.clone(),
            parent,
        };

        match mode {
            ExecutionMode::Blocking => {
                self.pool.run(job.supervise()).await;
                Ok(self.storage.require_session(&session.id).await?)
            }
            ExecutionMode::Background => {
                self.pool.submit(job.supervise());
                Ok(session)
            }
        }
    }
}

/// One dispatched run. Owns everything it needs so it can move into a task.
struct ResearchJob {
    storage: Arc<dyn Storage>,
    pipeline: ResearchPipeline,
    composer: ContextComposer,
    session_id: String,
    trace_id: String,
    query: String,
    parent: Option<ResearchSession>,
}

impl ResearchJob {
    /// Execute on a separate task so a panic still ends in a failed session.
    async fn supervise(self) {
        let storage = self.storage.clone();
        let session_id = self.session_id.clone();
        let trace_id = self.trace_id.clone();

        if let Err(e) = tokio::spawn(self.execute()).await {
            error!(
                session_id = %session_id,
                trace_id = %trace_id,
                error = %e,
                "Research task aborted"
            );
            let narrative = if e.is_panic() {
                "Research failed: research task panicked".to_string()
            } else {
                "Research failed: research task was cancelled".to_string()
            };
            if let Err(write_err) = storage.fail_session(&session_id, &narrative).await {
                error!(
                    session_id = %session_id,
                    error = %write_err,
                    "Failed to record research failure"
                );
            }
        }
    }

    /// Run the pipeline and perform exactly one terminal write.
    async fn execute(self) {
        let start = Instant::now();

        let outcome = match self.run().await {
            Ok(result) => {
                let completed = self.completed_research(result);
                self.storage
                    .complete_session(&self.session_id, &completed)
                    .await
                    .map(|_| completed.cost.estimated_cost)
                    .map_err(AppError::from)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(estimated_cost) => {
                info!(
                    session_id = %self.session_id,
                    trace_id = %self.trace_id,
                    estimated_cost,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Research session completed"
                );
            }
            Err(e) => {
                error!(
                    session_id = %self.session_id,
                    trace_id = %self.trace_id,
                    error = %e,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Research session failed"
                );
                let narrative = format!("Research failed: {}", e);
                if let Err(write_err) = self.storage.fail_session(&self.session_id, &narrative).await
                {
                    error!(
                        session_id = %self.session_id,
                        error = %write_err,
                        "Failed to record research failure"
                    );
                }
            }
        }
    }

    async fn run(&self) -> AppResult<ResearchResult> {
        let parent_context = match &self.parent {
            Some(parent) => {
                let summary = self.storage.get_summary(&parent.id).await?;
                self.composer
                    .build_parent_context(parent, summary.as_ref())
            }
            None => String::new(),
        };

        let mut documents = Vec::new();
        if let Some(parent) = &self.parent {
            documents.extend(self.storage.get_session_documents(&parent.id).await?);
        }
        documents.extend(self.storage.get_session_documents(&self.session_id).await?);
        let document_context = self.composer.build_document_context(&documents);

        Ok(self
            .pipeline
            .run(&self.query, &parent_context, &document_context)
            .await?)
    }

    fn completed_research(&self, result: ResearchResult) -> CompletedResearch {
        let now = chrono::Utc::now();
        let cost = CostRecord::from_stats(&self.session_id, &result.usage, result.breakdown);

        CompletedResearch {
            report: result.report,
            summary: ResearchSummary {
                session_id: self.session_id.clone(),
                summary_text: result.summary,
                key_findings: result.key_findings,
                sources: result.sources,
                parse_fallback: result.parse_fallback,
                created_at: now,
            },
            reasoning: ResearchReasoning {
                session_id: self.session_id.clone(),
                query_plan: result.reasoning.query_plan,
                search_strategy: result.reasoning.search_strategy,
                source_selection: result.reasoning.source_selection,
                synthesis_approach: result.reasoning.synthesis_approach,
                steps: result.reasoning.steps,
                created_at: now,
            },
            cost,
        }
    }
}
