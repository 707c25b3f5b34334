//! Uploaded document ingestion: validation, text extraction and summary.
//!
//! Extraction and summary failures never fail an upload. They are recorded
//! as text on the stored document so the session can still run.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::context::truncate_chars;
use crate::config::{Config, DocumentConfig};
use crate::error::{AppError, AppResult, ExtractionError};
use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::{document_summary_prompt, DOCUMENT_SUMMARY_SYSTEM_PROMPT};
use crate::storage::{DocumentType, Storage, UploadedDocument};

/// Documents with fewer trimmed characters than this are not summarized.
pub const MIN_SUMMARY_CHARS: usize = 50;

/// Characters of extracted text sent to the model for summarization.
pub const SUMMARY_INPUT_CHARS: usize = 10_000;

/// Summary stored for documents below [`MIN_SUMMARY_CHARS`].
pub const TOO_SHORT_SUMMARY: &str = "Document too short to summarize.";

/// Summary stored when text extraction failed.
pub const EXTRACTION_FAILED_SUMMARY: &str = "Could not generate summary due to extraction error.";

/// Validates, extracts and summarizes uploads, then stores them.
#[derive(Clone)]
pub struct DocumentIngestor {
    storage: Arc<dyn Storage>,
    llm: Arc<dyn LlmClient>,
    max_bytes: u64,
    model: String,
    summary_temperature: f64,
}

impl DocumentIngestor {
    /// Create an ingestor with default limits, summarizing with `model`
    pub fn new(storage: Arc<dyn Storage>, llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            storage,
            llm,
            max_bytes: DocumentConfig::default().max_bytes,
            model: model.into(),
            summary_temperature: 0.5,
        }
    }

    /// Create an ingestor from application configuration
    pub fn from_config(storage: Arc<dyn Storage>, llm: Arc<dyn LlmClient>, config: &Config) -> Self {
        Self::new(storage, llm, &config.llm.model)
            .with_max_bytes(config.documents.max_bytes)
            .with_summary_temperature(config.llm.summary_temperature)
    }

    /// Set the upload size limit
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set the summary temperature
    pub fn with_summary_temperature(mut self, temperature: f64) -> Self {
        self.summary_temperature = temperature;
        self
    }

    /// Ingest a file from disk, using its file name for type detection.
    pub async fn ingest_path(&self, session_id: &str, path: &Path) -> AppResult<UploadedDocument> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::validation("path", "Path has no file name"))?
            .to_string();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AppError::validation("path", format!("Cannot read {}: {}", path.display(), e)))?;
        self.check_size(metadata.len())?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::validation("path", format!("Cannot read {}: {}", path.display(), e)))?;

        self.ingest(session_id, &filename, bytes).await
    }

    /// Validate and store an uploaded document for `session_id`.
    ///
    /// Fails only on validation (unsupported type, too large, unknown
    /// session) or storage errors.
    pub async fn ingest(
        &self,
        session_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> AppResult<UploadedDocument> {
        let document_type = DocumentType::from_filename(filename).ok_or_else(|| {
            AppError::validation("file", "Only PDF and TXT files are supported")
        })?;
        let file_size = bytes.len() as u64;
        self.check_size(file_size)?;

        if self.storage.get_session(session_id).await?.is_none() {
            return Err(AppError::validation(
                "session_id",
                "Research session not found",
            ));
        }

        let document = UploadedDocument::new(session_id, filename, document_type, file_size);

        let document = match extract_text(document_type, bytes).await {
            Ok(text) => {
                let summary = self.summarize(&text).await;
                document.with_text(text).with_summary(summary)
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    filename = %filename,
                    error = %e,
                    "Document text extraction failed"
                );
                document
                    .with_text(format!("Error extracting text: {}", e))
                    .with_summary(EXTRACTION_FAILED_SUMMARY)
            }
        };

        self.storage.create_document(&document).await?;

        info!(
            session_id = %session_id,
            document_id = %document.id,
            filename = %document.filename,
            document_type = %document.document_type,
            file_size = document.file_size,
            "Document uploaded"
        );

        Ok(document)
    }

    fn check_size(&self, size: u64) -> AppResult<()> {
        if size > self.max_bytes {
            return Err(AppError::validation(
                "file",
                format!(
                    "File size must be under {}MB",
                    self.max_bytes / (1024 * 1024)
                ),
            ));
        }
        Ok(())
    }

    async fn summarize(&self, text: &str) -> String {
        if text.trim().chars().count() < MIN_SUMMARY_CHARS {
            return TOO_SHORT_SUMMARY.to_string();
        }

        let request = CompletionRequest::new(
            DOCUMENT_SUMMARY_SYSTEM_PROMPT,
            document_summary_prompt(truncate_chars(text, SUMMARY_INPUT_CHARS)),
            &self.model,
        )
        .with_temperature(self.summary_temperature);

        match self.llm.complete(request).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Document summary generation failed");
                format!("Summary generation failed: {}", e)
            }
        }
    }
}

/// Extract text from raw upload bytes.
///
/// PDF parsing runs on the blocking pool; a panic inside the parser is
/// reported as an extraction error.
pub async fn extract_text(
    document_type: DocumentType,
    bytes: Vec<u8>,
) -> Result<String, ExtractionError> {
    match document_type {
        DocumentType::Text => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        DocumentType::Pdf => tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractionError::Pdf {
                message: e.to_string(),
            })
        })
        .await
        .map_err(|e| ExtractionError::Pdf {
            message: format!("PDF parser aborted: {}", e),
        })?,
    }
}
