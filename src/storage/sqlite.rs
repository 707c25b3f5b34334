use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use super::{
    CompletedResearch, CostRecord, DocumentType, ResearchReasoning, ResearchSession,
    ResearchSummary, SessionStatus, Storage, UploadedDocument,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const SESSION_COLUMNS: &str = "id, user_id, query, status, final_report, parent_session_id, \
     trace_id, created_at, updated_at, completed_at";

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        if config.path == Path::new(":memory:") {
            return Self::new_in_memory().await;
        }

        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create a storage instance backed by a private in-memory database.
    ///
    /// The pool holds exactly one connection that is never recycled, since
    /// every new in-memory connection would see an empty database.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Explain why a guarded status update touched no rows
    async fn transition_error(&self, id: &str, target: SessionStatus) -> StorageError {
        match self.get_session(id).await {
            Ok(Some(session)) => StorageError::Query {
                message: format!(
                    "Session {} cannot move from {} to {}",
                    id, session.status, target
                ),
            },
            Ok(None) => StorageError::SessionNotFound {
                session_id: id.to_string(),
            },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_session(
        &self,
        session: &ResearchSession,
        cost: &CostRecord,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO research_sessions
                (id, user_id, query, status, final_report, parent_session_id, trace_id,
                 created_at, updated_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.query)
        .bind(session.status.to_string())
        .bind(&session.final_report)
        .bind(&session.parent_session_id)
        .bind(&session.trace_id)
        .bind(timestamp(&session.created_at))
        .bind(timestamp(&session.updated_at))
        .bind(session.completed_at.as_ref().map(timestamp))
        .execute(&mut *tx)
        .await?;

        upsert_cost(&mut tx, cost).await?;

        tx.commit().await?;
        debug!(session_id = %session.id, "Session created");
        Ok(())
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<ResearchSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM research_sessions WHERE id = ?",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn mark_running(&self, id: &str, trace_id: &str) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE research_sessions
            SET status = 'running', trace_id = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(trace_id)
        .bind(timestamp(&Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(id, SessionStatus::Running).await);
        }

        Ok(())
    }

    async fn complete_session(&self, id: &str, result: &CompletedResearch) -> StorageResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE research_sessions
            SET status = 'completed', final_report = ?, completed_at = ?, updated_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(&result.report)
        .bind(timestamp(&now))
        .bind(timestamp(&now))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.transition_error(id, SessionStatus::Completed).await);
        }

        let summary = &result.summary;
        sqlx::query(
            r#"
            INSERT INTO research_summaries
                (session_id, summary_text, key_findings, sources, parse_fallback, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&summary.summary_text)
        .bind(to_json(&summary.key_findings)?)
        .bind(to_json(&summary.sources)?)
        .bind(summary.parse_fallback)
        .bind(timestamp(&summary.created_at))
        .execute(&mut *tx)
        .await?;

        let reasoning = &result.reasoning;
        sqlx::query(
            r#"
            INSERT INTO research_reasoning
                (session_id, query_plan, search_strategy, source_selection,
                 synthesis_approach, steps, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&reasoning.query_plan)
        .bind(&reasoning.search_strategy)
        .bind(&reasoning.source_selection)
        .bind(&reasoning.synthesis_approach)
        .bind(to_json(&reasoning.steps)?)
        .bind(timestamp(&reasoning.created_at))
        .execute(&mut *tx)
        .await?;

        let mut cost = result.cost.clone();
        cost.session_id = id.to_string();
        upsert_cost(&mut tx, &cost).await?;

        tx.commit().await?;
        debug!(session_id = %id, "Session completed");
        Ok(())
    }

    async fn fail_session(&self, id: &str, narrative: &str) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE research_sessions
            SET status = 'failed', final_report = ?, updated_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(narrative)
        .bind(timestamp(&Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(id, SessionStatus::Failed).await);
        }

        Ok(())
    }

    async fn delete_session(&self, id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM research_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_child_sessions(&self, parent_id: &str) -> StorageResult<Vec<ResearchSession>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM research_sessions WHERE parent_session_id = ? ORDER BY created_at DESC",
            SESSION_COLUMNS
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn list_sessions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> StorageResult<Vec<ResearchSession>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM research_sessions WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_cost(&self, session_id: &str) -> StorageResult<Option<CostRecord>> {
        let row: Option<CostRow> = sqlx::query_as(
            r#"
            SELECT session_id, input_tokens, output_tokens, total_tokens, estimated_cost,
                   model, breakdown, created_at, updated_at
            FROM research_costs
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_summary(&self, session_id: &str) -> StorageResult<Option<ResearchSummary>> {
        let row: Option<SummaryRow> = sqlx::query_as(
            r#"
            SELECT session_id, summary_text, key_findings, sources, parse_fallback, created_at
            FROM research_summaries
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_reasoning(&self, session_id: &str) -> StorageResult<Option<ResearchReasoning>> {
        let row: Option<ReasoningRow> = sqlx::query_as(
            r#"
            SELECT session_id, query_plan, search_strategy, source_selection,
                   synthesis_approach, steps, created_at
            FROM research_reasoning
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn create_document(&self, document: &UploadedDocument) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO uploaded_documents
                (id, session_id, filename, document_type, file_size, extracted_text, summary,
                 uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&document.id)
        .bind(&document.session_id)
        .bind(&document.filename)
        .bind(document.document_type.to_string())
        .bind(to_i64(document.file_size))
        .bind(&document.extracted_text)
        .bind(&document.summary)
        .bind(timestamp(&document.uploaded_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session_documents(
        &self,
        session_id: &str,
    ) -> StorageResult<Vec<UploadedDocument>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, filename, document_type, file_size, extracted_text, summary,
                   uploaded_at
            FROM uploaded_documents
            WHERE session_id = ?
            ORDER BY uploaded_at ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

async fn upsert_cost(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    cost: &CostRecord,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO research_costs
            (session_id, input_tokens, output_tokens, total_tokens, estimated_cost, model,
             breakdown, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(session_id) DO UPDATE SET
            input_tokens = excluded.input_tokens,
            output_tokens = excluded.output_tokens,
            total_tokens = excluded.total_tokens,
            estimated_cost = excluded.estimated_cost,
            model = excluded.model,
            breakdown = excluded.breakdown,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&cost.session_id)
    .bind(to_i64(cost.input_tokens))
    .bind(to_i64(cost.output_tokens))
    .bind(to_i64(cost.input_tokens + cost.output_tokens))
    .bind(cost.estimated_cost.max(0.0))
    .bind(&cost.model)
    .bind(to_json(&cost.breakdown)?)
    .bind(timestamp(&cost.created_at))
    .bind(timestamp(&cost.updated_at))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Query {
        message: format!("Failed to serialize column: {}", e),
    })
}

fn from_json<T: serde::de::DeserializeOwned + Default>(value: &str) -> T {
    serde_json::from_str(value).unwrap_or_default()
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    query: String,
    status: String,
    final_report: Option<String>,
    parent_session_id: Option<String>,
    trace_id: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl From<SessionRow> for ResearchSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            query: row.query,
            status: row.status.parse().unwrap_or_default(),
            final_report: row.final_report,
            parent_session_id: row.parent_session_id,
            trace_id: row.trace_id,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
            completed_at: row.completed_at.as_deref().map(parse_timestamp),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CostRow {
    session_id: String,
    input_tokens: i64,
    output_tokens: i64,
    total_tokens: i64,
    estimated_cost: f64,
    model: String,
    breakdown: String,
    created_at: String,
    updated_at: String,
}

impl From<CostRow> for CostRecord {
    fn from(row: CostRow) -> Self {
        Self {
            session_id: row.session_id,
            input_tokens: to_u64(row.input_tokens),
            output_tokens: to_u64(row.output_tokens),
            total_tokens: to_u64(row.total_tokens),
            estimated_cost: row.estimated_cost,
            model: row.model,
            breakdown: from_json(&row.breakdown),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    session_id: String,
    summary_text: String,
    key_findings: String,
    sources: String,
    parse_fallback: bool,
    created_at: String,
}

impl From<SummaryRow> for ResearchSummary {
    fn from(row: SummaryRow) -> Self {
        Self {
            session_id: row.session_id,
            summary_text: row.summary_text,
            key_findings: from_json(&row.key_findings),
            sources: from_json(&row.sources),
            parse_fallback: row.parse_fallback,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReasoningRow {
    session_id: String,
    query_plan: String,
    search_strategy: String,
    source_selection: String,
    synthesis_approach: String,
    steps: String,
    created_at: String,
}

impl From<ReasoningRow> for ResearchReasoning {
    fn from(row: ReasoningRow) -> Self {
        Self {
            session_id: row.session_id,
            query_plan: row.query_plan,
            search_strategy: row.search_strategy,
            source_selection: row.source_selection,
            synthesis_approach: row.synthesis_approach,
            steps: from_json(&row.steps),
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    session_id: String,
    filename: String,
    document_type: String,
    file_size: i64,
    extracted_text: Option<String>,
    summary: Option<String>,
    uploaded_at: String,
}

impl From<DocumentRow> for UploadedDocument {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            filename: row.filename,
            document_type: row.document_type.parse().unwrap_or(DocumentType::Text),
            file_size: to_u64(row.file_size),
            extracted_text: row.extracted_text,
            summary: row.summary,
            uploaded_at: parse_timestamp(&row.uploaded_at),
        }
    }
}
