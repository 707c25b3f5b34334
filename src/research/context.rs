//! Bounded context blocks injected into stage prompts.
//!
//! Truncation is by fixed character count; no summarization happens here.

use crate::storage::{ResearchSession, ResearchSummary, UploadedDocument};

/// Characters of a parent's report embedded when it has no summary.
pub const PARENT_REPORT_EXCERPT_CHARS: usize = 2000;

/// Characters of extracted text embedded per uploaded document.
pub const DOCUMENT_EXCERPT_CHARS: usize = 3000;

/// Placeholder used when a parent session has neither summary nor report.
pub const NO_PREVIOUS_FINDINGS: &str = "No previous findings recorded.";

/// Instruction appended to every parent context block.
pub const BUILD_UPON_INSTRUCTION: &str =
    "BUILD UPON this previous research. Do NOT repeat what was already covered.";

/// Builds the parent and document context blocks for a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextComposer;

impl ContextComposer {
    /// Create a composer
    pub fn new() -> Self {
        Self
    }

    /// Context block describing a completed parent session.
    ///
    /// Uses the parent's summary when present, otherwise the head of its
    /// report, otherwise a placeholder.
    pub fn build_parent_context(
        &self,
        parent: &ResearchSession,
        summary: Option<&ResearchSummary>,
    ) -> String {
        let mut parts = vec![
            "=== PREVIOUS RESEARCH CONTEXT ===".to_string(),
            format!("Previous Query: {}", parent.query),
        ];

        let report = parent
            .final_report
            .as_deref()
            .filter(|r| !r.trim().is_empty());
        // A fallback parse of an empty response carries no summary text.
        let summary = summary.filter(|s| !s.summary_text.trim().is_empty());

        match (summary, report) {
            (Some(summary), _) => {
                parts.push(format!("\nPrevious Summary:\n{}", summary.summary_text));
                if !summary.key_findings.is_empty() {
                    let findings: Vec<String> = summary
                        .key_findings
                        .iter()
                        .map(|f| format!("- {}", f))
                        .collect();
                    parts.push(format!("\nPrevious Key Findings:\n{}", findings.join("\n")));
                }
            }
            (None, Some(report)) => {
                parts.push(format!(
                    "\nPrevious Report Excerpt:\n{}",
                    truncate_chars(report, PARENT_REPORT_EXCERPT_CHARS)
                ));
            }
            (None, None) => {
                parts.push(format!("\n{}", NO_PREVIOUS_FINDINGS));
            }
        }

        parts.push("\n=== END PREVIOUS CONTEXT ===\n".to_string());
        parts.push(BUILD_UPON_INSTRUCTION.to_string());

        parts.join("\n")
    }

    /// Context block describing uploaded documents.
    ///
    /// Returns an empty string when there are no documents; callers omit the
    /// block in that case.
    pub fn build_document_context(&self, documents: &[UploadedDocument]) -> String {
        if documents.is_empty() {
            return String::new();
        }

        let mut parts = vec!["=== UPLOADED DOCUMENT CONTEXT ===".to_string()];

        for doc in documents {
            parts.push(format!("\n--- Document: {} ---", doc.filename));
            if let Some(summary) = &doc.summary {
                parts.push(format!("Summary: {}", summary));
            }
            if let Some(text) = &doc.extracted_text {
                parts.push(format!(
                    "Content:\n{}",
                    truncate_chars(text, DOCUMENT_EXCERPT_CHARS)
                ));
            }
        }

        parts.push("\n=== END DOCUMENT CONTEXT ===\n".to_string());

        parts.join("\n")
    }
}

/// The first `max_chars` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
