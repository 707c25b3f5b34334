//! Extraction of the labeled summary sections from the final stage's output.
//!
//! Expected layout:
//!
//! ```text
//! SUMMARY: <free text>
//! KEY_FINDINGS: ["...", "..."]
//! SOURCES: ["...", "..."]
//! ```
//!
//! Parsing is total. Any deviation yields the fixed fallback triple with
//! [`ParsedSummary::fallback`] set.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

use super::context::truncate_chars;

/// Characters of raw output kept as the summary when parsing falls back.
pub const FALLBACK_SUMMARY_CHARS: usize = 500;

/// Key finding stored when parsing falls back.
pub const FALLBACK_KEY_FINDING: &str = "Research completed successfully";

/// Source stored when parsing falls back.
pub const FALLBACK_SOURCE: &str = "AI-synthesized research";

static SUMMARY_PATTERN: OnceLock<Regex> = OnceLock::new();
static FINDINGS_PATTERN: OnceLock<Regex> = OnceLock::new();
static SOURCES_PATTERN: OnceLock<Regex> = OnceLock::new();

fn summary_pattern() -> &'static Regex {
    SUMMARY_PATTERN.get_or_init(|| {
        Regex::new(r"(?s)SUMMARY:(.*?)(?:KEY_FINDINGS:|$)").expect("summary pattern is valid")
    })
}

fn findings_pattern() -> &'static Regex {
    FINDINGS_PATTERN.get_or_init(|| {
        Regex::new(r"(?s)KEY_FINDINGS:\s*(\[.*?\])").expect("findings pattern is valid")
    })
}

fn sources_pattern() -> &'static Regex {
    SOURCES_PATTERN
        .get_or_init(|| Regex::new(r"(?s)SOURCES:\s*(\[.*?\])").expect("sources pattern is valid"))
}

/// Summary, key findings and sources extracted from a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSummary {
    /// Summary paragraph.
    pub summary: String,
    /// Key findings, in order.
    pub key_findings: Vec<String>,
    /// Cited sources, in order.
    pub sources: Vec<String>,
    /// True when the response did not match the expected layout.
    pub fallback: bool,
}

impl ParsedSummary {
    /// The deterministic fallback for `raw`
    pub fn fallback(raw: &str) -> Self {
        Self {
            summary: truncate_chars(raw, FALLBACK_SUMMARY_CHARS).to_string(),
            key_findings: vec![FALLBACK_KEY_FINDING.to_string()],
            sources: vec![FALLBACK_SOURCE.to_string()],
            fallback: true,
        }
    }
}

/// Parse a summarize-stage response. Never fails.
pub fn parse_summary_response(raw: &str) -> ParsedSummary {
    match try_parse(raw) {
        Some(parsed) => parsed,
        None => {
            warn!(
                response_chars = raw.chars().count(),
                "Summary response did not match expected layout, using fallback"
            );
            ParsedSummary::fallback(raw)
        }
    }
}

fn try_parse(raw: &str) -> Option<ParsedSummary> {
    let summary = summary_pattern()
        .captures(raw)?
        .get(1)?
        .as_str()
        .trim()
        .to_string();
    if summary.is_empty() {
        return None;
    }

    let key_findings = extract_list(findings_pattern(), raw)?;
    let sources = extract_list(sources_pattern(), raw)?;

    Some(ParsedSummary {
        summary,
        key_findings,
        sources,
        fallback: false,
    })
}

/// Parse the JSON array following a label.
///
/// The shortest bracketed span is tried first; if that is not valid JSON
/// (an element containing `]`), the array is read as the first JSON value
/// starting at the opening bracket.
fn extract_list(pattern: &Regex, raw: &str) -> Option<Vec<String>> {
    let span = pattern.captures(raw)?.get(1)?;

    if let Ok(items) = serde_json::from_str::<Vec<String>>(span.as_str()) {
        return Some(items);
    }

    serde_json::Deserializer::from_str(&raw[span.start()..])
        .into_iter::<Vec<String>>()
        .next()?
        .ok()
}

/// Stateless wrapper around [`parse_summary_response`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredOutputParser;

impl StructuredOutputParser {
    /// Parse `raw`; see [`parse_summary_response`]
    pub fn parse(&self, raw: &str) -> ParsedSummary {
        parse_summary_response(raw)
    }
}
