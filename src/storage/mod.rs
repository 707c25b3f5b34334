//! Storage layer for research session persistence.
//!
//! This module provides SQLite-based storage for research sessions and the
//! records they own: cost, summary, reasoning trace and uploaded documents.

mod sqlite;


pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::research::{PricingTable, StageUsage, TokenStats};

/// Lifecycle state of a research session.
///
/// Transitions only move forward: `pending -> running -> completed | failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, pipeline not yet started.
    #[default]
    Pending,
    /// Pipeline executing.
    Running,
    /// Pipeline finished and results are stored.
    Completed,
    /// Pipeline aborted; the report field holds the failure narrative.
    Failed,
}

impl SessionStatus {
    /// Whether no further transitions are allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the state machine.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Pending, SessionStatus::Running)
                | (SessionStatus::Running, SessionStatus::Completed)
                | (SessionStatus::Running, SessionStatus::Failed)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SessionStatus::Pending),
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// One user-initiated (or continuation) research request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    /// Unique session identifier.
    pub id: String,
    /// Owner used for history listing.
    pub user_id: String,
    /// The research query.
    pub query: String,
    /// Current lifecycle state.
    pub status: SessionStatus,
    /// Final report, or the failure narrative for failed sessions.
    pub final_report: Option<String>,
    /// Session this one continues from.
    pub parent_session_id: Option<String>,
    /// Opaque correlation id handed to tracing.
    pub trace_id: Option<String>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the session completed successfully.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ResearchSession {
    /// Create a pending session for `query`
    pub fn new(query: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: "default".to_string(),
            query: query.into(),
            status: SessionStatus::Pending,
            final_report: None,
            parent_session_id: None,
            trace_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Set the owning user
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Link to the session this one continues
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_session_id = Some(parent_id.into());
        self
    }
}

/// Summary extracted from the final stage of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSummary {
    /// Owning session ID.
    pub session_id: String,
    /// Short free-text summary.
    pub summary_text: String,
    /// Ordered key findings.
    pub key_findings: Vec<String>,
    /// Ordered sources or topics covered.
    pub sources: Vec<String>,
    /// Set when the model output did not match the expected layout and the
    /// fixed fallback was stored instead.
    pub parse_fallback: bool,
    /// When the summary was stored.
    pub created_at: DateTime<Utc>,
}

/// High-level narrative of how a report was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReasoning {
    /// Owning session ID.
    pub session_id: String,
    /// Plan text from the first stage, verbatim.
    pub query_plan: String,
    /// Search strategy description.
    pub search_strategy: String,
    /// Source selection rationale.
    pub source_selection: String,
    /// Synthesis approach description.
    pub synthesis_approach: String,
    /// Ordered step labels.
    pub steps: Vec<String>,
    /// When the reasoning was stored.
    pub created_at: DateTime<Utc>,
}

/// Token usage and estimated cost for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    /// Owning session ID.
    pub session_id: String,
    /// Tokens sent to the model.
    pub input_tokens: u64,
    /// Tokens received from the model.
    pub output_tokens: u64,
    /// Always `input_tokens + output_tokens`.
    pub total_tokens: u64,
    /// Estimated cost in USD, derived from counts and pricing.
    pub estimated_cost: f64,
    /// Model used for pricing lookup.
    pub model: String,
    /// Per-stage token attribution.
    pub breakdown: Vec<StageUsage>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl CostRecord {
    /// Zeroed record for a new session
    pub fn new(session_id: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            estimated_cost: 0.0,
            model: model.into(),
            breakdown: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record built from a finished run's accounting snapshot
    pub fn from_stats(
        session_id: impl Into<String>,
        stats: &TokenStats,
        breakdown: Vec<StageUsage>,
    ) -> Self {
        let mut record = Self::new(session_id, &stats.model);
        record.input_tokens = stats.input_tokens;
        record.output_tokens = stats.output_tokens;
        record.total_tokens = stats.total_tokens;
        record.estimated_cost = stats.estimated_cost;
        record.breakdown = breakdown;
        record
    }

    /// Replace the counts and recompute the derived fields
    pub fn set_counts(&mut self, input_tokens: u64, output_tokens: u64, pricing: &PricingTable) {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.recompute(pricing);
    }

    /// Recompute total and cost from the stored counts
    pub fn recompute(&mut self, pricing: &PricingTable) {
        self.total_tokens = self.input_tokens + self.output_tokens;
        self.estimated_cost = pricing.cost(&self.model, self.input_tokens, self.output_tokens);
        self.updated_at = Utc::now();
    }
}

/// Kind of uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// PDF file.
    Pdf,
    /// Plain text file.
    Text,
}

impl DocumentType {
    /// Detect the type from a file name's extension
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".pdf") {
            Some(DocumentType::Pdf)
        } else if lower.ends_with(".txt") {
            Some(DocumentType::Text)
        } else {
            None
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentType::Pdf => write!(f, "pdf"),
            DocumentType::Text => write!(f, "text"),
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pdf" => Ok(DocumentType::Pdf),
            "text" | "txt" => Ok(DocumentType::Text),
            _ => Err(format!("Unknown document type: {}", s)),
        }
    }
}

/// A document uploaded as research context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedDocument {
    /// Unique document identifier.
    pub id: String,
    /// Owning session ID.
    pub session_id: String,
    /// Original file name.
    pub filename: String,
    /// Detected type.
    pub document_type: DocumentType,
    /// Raw size in bytes.
    pub file_size: u64,
    /// Extracted text, or the extraction error description.
    pub extracted_text: Option<String>,
    /// Generated summary.
    pub summary: Option<String>,
    /// When the document was uploaded.
    pub uploaded_at: DateTime<Utc>,
}

impl UploadedDocument {
    /// Create a document record without content
    pub fn new(
        session_id: impl Into<String>,
        filename: impl Into<String>,
        document_type: DocumentType,
        file_size: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            filename: filename.into(),
            document_type,
            file_size,
            extracted_text: None,
            summary: None,
            uploaded_at: Utc::now(),
        }
    }

    /// Set extracted text
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.extracted_text = Some(text.into());
        self
    }

    /// Set summary
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// Everything written by the terminal transition of a successful run.
#[derive(Debug, Clone)]
pub struct CompletedResearch {
    /// Final report text.
    pub report: String,
    /// Summary record.
    pub summary: ResearchSummary,
    /// Reasoning trace record.
    pub reasoning: ResearchReasoning,
    /// Final cost record.
    pub cost: CostRecord,
}

/// Storage trait for database operations.
///
/// Status-changing operations only succeed from the state the lifecycle
/// allows; a mismatch is reported as [`StorageError::Query`].
#[async_trait]
pub trait Storage: Send + Sync {
    // Session operations

    /// Insert a new session together with its zeroed cost record.
    async fn create_session(&self, session: &ResearchSession, cost: &CostRecord)
        -> StorageResult<()>;
    /// Get a session by ID.
    async fn get_session(&self, id: &str) -> StorageResult<Option<ResearchSession>>;
    /// Move a pending session to running and stamp its trace id.
    async fn mark_running(&self, id: &str, trace_id: &str) -> StorageResult<()>;
    /// Store a successful run's results and move the session to completed,
    /// in one transaction.
    async fn complete_session(&self, id: &str, result: &CompletedResearch) -> StorageResult<()>;
    /// Move a running session to failed with `narrative` as its report.
    async fn fail_session(&self, id: &str, narrative: &str) -> StorageResult<()>;
    /// Delete a session and everything it owns. Children keep existing with
    /// their parent link cleared.
    async fn delete_session(&self, id: &str) -> StorageResult<()>;
    /// Sessions continuing from `parent_id`, newest first.
    async fn list_child_sessions(&self, parent_id: &str) -> StorageResult<Vec<ResearchSession>>;
    /// A user's sessions, newest first.
    async fn list_sessions(&self, user_id: &str, limit: u32)
        -> StorageResult<Vec<ResearchSession>>;

    /// Get a session by ID, failing if it does not exist.
    async fn require_session(&self, id: &str) -> StorageResult<ResearchSession> {
        self.get_session(id)
            .await?
            .ok_or_else(|| StorageError::SessionNotFound {
                session_id: id.to_string(),
            })
    }

    // Owned record lookups

    /// Cost record for a session.
    async fn get_cost(&self, session_id: &str) -> StorageResult<Option<CostRecord>>;
    /// Summary for a completed session.
    async fn get_summary(&self, session_id: &str) -> StorageResult<Option<ResearchSummary>>;
    /// Reasoning trace for a completed session.
    async fn get_reasoning(&self, session_id: &str) -> StorageResult<Option<ResearchReasoning>>;

    // Document operations

    /// Insert an uploaded document.
    async fn create_document(&self, document: &UploadedDocument) -> StorageResult<()>;
    /// Documents attached to a session, in upload order.
    async fn get_session_documents(&self, session_id: &str)
        -> StorageResult<Vec<UploadedDocument>>;
}
