//! Integration tests for SQLite storage layer
//!
//! Tests database operations using in-memory and file-backed SQLite databases.

use chrono::{Duration, Utc};

use mcp_deep_research::config::DatabaseConfig;
use mcp_deep_research::error::StorageError;
use mcp_deep_research::research::{PricingTable, StageUsage};
use mcp_deep_research::storage::{
    CompletedResearch, CostRecord, DocumentType, ResearchReasoning, ResearchSession,
    ResearchSummary, SessionStatus, SqliteStorage, Storage, UploadedDocument,
};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

/// Insert a pending session with its zeroed cost record
async fn insert_session(storage: &SqliteStorage, session: &ResearchSession) {
    let cost = CostRecord::new(&session.id, "gpt-4o-mini");
    storage.create_session(session, &cost).await.unwrap();
}

fn completed_research(session_id: &str, report: &str) -> CompletedResearch {
    let now = Utc::now();
    let mut cost = CostRecord::new(session_id, "gpt-4o-mini");
    cost.breakdown = vec![StageUsage {
        stage: "plan".to_string(),
        input_tokens: 120,
        output_tokens: 80,
    }];
    cost.set_counts(1200, 800, &PricingTable::default());

    CompletedResearch {
        report: report.to_string(),
        summary: ResearchSummary {
            session_id: session_id.to_string(),
            summary_text: "Short summary".to_string(),
            key_findings: vec!["first".to_string(), "second".to_string()],
            sources: vec!["model knowledge".to_string()],
            parse_fallback: false,
            created_at: now,
        },
        reasoning: ResearchReasoning {
            session_id: session_id.to_string(),
            query_plan: "1. Look things up".to_string(),
            search_strategy: "strategy".to_string(),
            source_selection: "selection".to_string(),
            synthesis_approach: "synthesis".to_string(),
            steps: vec!["a".to_string(), "b".to_string()],
            created_at: now,
        },
        cost,
    }
}

/// Drive a session through pending -> running -> completed
async fn complete(storage: &SqliteStorage, session: &ResearchSession, report: &str) {
    insert_session(storage, session).await;
    storage.mark_running(&session.id, "trace-1").await.unwrap();
    storage
        .complete_session(&session.id, &completed_research(&session.id, report))
        .await
        .unwrap();
}

#[cfg(test)]
mod session_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_and_get_session() {
        let storage = create_test_storage().await;
        let session = ResearchSession::new("How do neutron stars form?").with_user("alice");
        insert_session(&storage, &session).await;

        let retrieved = storage.get_session(&session.id).await.unwrap().unwrap();

        assert_eq!(retrieved.id, session.id);
        assert_eq!(retrieved.user_id, "alice");
        assert_eq!(retrieved.query, "How do neutron stars form?");
        assert_eq!(retrieved.status, SessionStatus::Pending);
        assert_eq!(
            retrieved.created_at.timestamp_micros(),
            session.created_at.timestamp_micros()
        );

        let cost = storage.get_cost(&session.id).await.unwrap().unwrap();
        assert_eq!(cost.total_tokens, 0);
        assert_eq!(cost.estimated_cost, 0.0);
    }

    #[tokio::test]
    async fn test_get_nonexistent_session() {
        let storage = create_test_storage().await;

        assert!(storage.get_session("nonexistent-id").await.unwrap().is_none());

        let err = storage.require_session("nonexistent-id").await.unwrap_err();
        assert!(matches!(err, StorageError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_session_rejected() {
        let storage = create_test_storage().await;
        let session = ResearchSession::new("duplicate id check");
        insert_session(&storage, &session).await;

        let cost = CostRecord::new(&session.id, "gpt-4o-mini");
        assert!(storage.create_session(&session, &cost).await.is_err());
    }

    #[tokio::test]
    async fn test_complete_writes_all_records() {
        let storage = create_test_storage().await;
        let session = ResearchSession::new("What is the Higgs field?");
        complete(&storage, &session, "The report").await;

        let stored = storage.require_session(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(stored.final_report.as_deref(), Some("The report"));
        assert_eq!(stored.trace_id.as_deref(), Some("trace-1"));
        assert!(stored.completed_at.is_some());

        let summary = storage.get_summary(&session.id).await.unwrap().unwrap();
        assert_eq!(summary.key_findings, vec!["first", "second"]);
        assert!(!summary.parse_fallback);

        let reasoning = storage.get_reasoning(&session.id).await.unwrap().unwrap();
        assert_eq!(reasoning.query_plan, "1. Look things up");
        assert_eq!(reasoning.steps, vec!["a", "b"]);

        let cost = storage.get_cost(&session.id).await.unwrap().unwrap();
        assert_eq!(cost.input_tokens, 1200);
        assert_eq!(cost.output_tokens, 800);
        assert_eq!(cost.total_tokens, 2000);
        assert!(cost.estimated_cost > 0.0);
        assert_eq!(cost.breakdown.len(), 1);
        assert_eq!(cost.breakdown[0].stage, "plan");
    }

    #[tokio::test]
    async fn test_fail_sets_narrative_without_completed_at() {
        let storage = create_test_storage().await;
        let session = ResearchSession::new("A query that will fail");
        insert_session(&storage, &session).await;
        storage.mark_running(&session.id, "trace").await.unwrap();

        storage
            .fail_session(&session.id, "Research failed: boom")
            .await
            .unwrap();

        let stored = storage.require_session(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
        assert_eq!(stored.final_report.as_deref(), Some("Research failed: boom"));
        assert!(stored.completed_at.is_none());
        assert!(storage.get_summary(&session.id).await.unwrap().is_none());
    }
}

#[cfg(test)]
mod transition_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cannot_complete_pending_session() {
        let storage = create_test_storage().await;
        let session = ResearchSession::new("skipping running state");
        insert_session(&storage, &session).await;

        let err = storage
            .complete_session(&session.id, &completed_research(&session.id, "r"))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Query { .. }));
        assert!(storage.get_summary(&session.id).await.unwrap().is_none());
        assert_eq!(
            storage.require_session(&session.id).await.unwrap().status,
            SessionStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let storage = create_test_storage().await;
        let session = ResearchSession::new("already completed session");
        complete(&storage, &session, "report").await;

        assert!(storage.mark_running(&session.id, "t2").await.is_err());
        assert!(storage.fail_session(&session.id, "late").await.is_err());
        assert!(storage
            .complete_session(&session.id, &completed_research(&session.id, "again"))
            .await
            .is_err());

        let stored = storage.require_session(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(stored.final_report.as_deref(), Some("report"));
    }

    #[tokio::test]
    async fn test_mark_running_twice_fails() {
        let storage = create_test_storage().await;
        let session = ResearchSession::new("double start attempt");
        insert_session(&storage, &session).await;

        storage.mark_running(&session.id, "t1").await.unwrap();
        assert!(storage.mark_running(&session.id, "t2").await.is_err());

        let stored = storage.require_session(&session.id).await.unwrap();
        assert_eq!(stored.trace_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_transition_on_missing_session() {
        let storage = create_test_storage().await;
        let err = storage.mark_running("missing", "t").await.unwrap_err();
        assert!(matches!(err, StorageError::SessionNotFound { .. }));
    }
}

#[cfg(test)]
mod ownership_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_delete_cascades_to_owned_records() {
        let storage = create_test_storage().await;
        let session = ResearchSession::new("cascade delete check");
        complete(&storage, &session, "report").await;
        let doc = UploadedDocument::new(&session.id, "notes.txt", DocumentType::Text, 3)
            .with_text("abc");
        storage.create_document(&doc).await.unwrap();

        storage.delete_session(&session.id).await.unwrap();

        assert!(storage.get_session(&session.id).await.unwrap().is_none());
        assert!(storage.get_cost(&session.id).await.unwrap().is_none());
        assert!(storage.get_summary(&session.id).await.unwrap().is_none());
        assert!(storage.get_reasoning(&session.id).await.unwrap().is_none());
        assert!(storage
            .get_session_documents(&session.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_parent_keeps_children() {
        let storage = create_test_storage().await;
        let parent = ResearchSession::new("parent research query");
        complete(&storage, &parent, "parent report").await;

        let child = ResearchSession::new("child research query").with_parent(&parent.id);
        insert_session(&storage, &child).await;

        assert_eq!(storage.list_child_sessions(&parent.id).await.unwrap().len(), 1);

        storage.delete_session(&parent.id).await.unwrap();

        let child = storage.require_session(&child.id).await.unwrap();
        assert!(child.parent_session_id.is_none());
    }

    #[tokio::test]
    async fn test_document_requires_existing_session() {
        let storage = create_test_storage().await;
        let doc = UploadedDocument::new("missing", "a.pdf", DocumentType::Pdf, 1);
        assert!(storage.create_document(&doc).await.is_err());
    }

    #[tokio::test]
    async fn test_documents_round_trip_in_upload_order() {
        let storage = create_test_storage().await;
        let session = ResearchSession::new("documents ordering check");
        insert_session(&storage, &session).await;

        let mut first = UploadedDocument::new(&session.id, "a.txt", DocumentType::Text, 10)
            .with_text("first")
            .with_summary("Document too short to summarize.");
        first.uploaded_at = Utc::now() - Duration::seconds(5);
        let second = UploadedDocument::new(&session.id, "b.pdf", DocumentType::Pdf, 20);

        storage.create_document(&second).await.unwrap();
        storage.create_document(&first).await.unwrap();

        let docs = storage.get_session_documents(&session.id).await.unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.pdf"]);
        assert_eq!(docs[0].id, first.id);
        assert_eq!(docs[0].extracted_text.as_deref(), Some("first"));
        assert_eq!(docs[0].document_type, DocumentType::Text);
        assert_eq!(docs[1].document_type, DocumentType::Pdf);
        assert_eq!(docs[1].file_size, 20);
        assert!(docs[1].summary.is_none());
    }
}

#[cfg(test)]
mod history_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_history_newest_first_and_filtered_by_user() {
        let storage = create_test_storage().await;
        let base = Utc::now() - Duration::hours(1);

        let mut ids = Vec::new();
        for i in 0..3 {
            let mut session = ResearchSession::new(format!("alice query number {}", i))
                .with_user("alice");
            session.created_at = base + Duration::minutes(i);
            session.updated_at = session.created_at;
            insert_session(&storage, &session).await;
            ids.push(session.id);
        }
        insert_session(&storage, &ResearchSession::new("bob query here").with_user("bob")).await;

        let history = storage.list_sessions("alice", 10).await.unwrap();
        let listed: Vec<String> = history.into_iter().map(|s| s.id).collect();
        ids.reverse();
        assert_eq!(listed, ids);

        let limited = storage.list_sessions("alice", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, ids[0]);

        assert_eq!(storage.list_sessions("bob", 10).await.unwrap().len(), 1);
        assert!(storage.list_sessions("carol", 10).await.unwrap().is_empty());
    }
}

#[cfg(test)]
mod file_storage_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_file_database_persists_across_pools() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("research.db"),
            max_connections: 2,
        };

        let session = ResearchSession::new("persisted across reopen");
        {
            let storage = SqliteStorage::new(&config).await.unwrap();
            insert_session(&storage, &session).await;
            storage.pool().close().await;
        }

        let storage = SqliteStorage::new(&config).await.unwrap();
        let stored = storage.require_session(&session.id).await.unwrap();
        assert_eq!(stored.query, "persisted across reopen");
    }

    #[tokio::test]
    async fn test_memory_path_uses_in_memory_database() {
        let config = DatabaseConfig {
            path: PathBuf::from(":memory:"),
            max_connections: 5,
        };
        let storage = SqliteStorage::new(&config).await.unwrap();
        assert!(storage.list_sessions("default", 10).await.unwrap().is_empty());
    }
}
