//! Centralized prompt definitions for the research pipeline
//!
//! System prompts are constants; user prompts are assembled by the
//! `*_prompt` builders so every stage's text is deterministic for a given
//! query, context and previous stage output.

/// System prompt for the planning stage.
pub const PLANNER_SYSTEM_PROMPT: &str = "You are an expert research planner.";

/// System prompt for the research stage.
pub const RESEARCHER_SYSTEM_PROMPT: &str =
    "You are an expert researcher with access to comprehensive knowledge.";

/// System prompt for the report stage.
pub const REPORT_WRITER_SYSTEM_PROMPT: &str = "You are an expert report writer.";

/// System prompt for the summarize stage.
pub const SUMMARIZER_SYSTEM_PROMPT: &str = "You are a research summarizer.";

/// System prompt for uploaded document summaries.
pub const DOCUMENT_SUMMARY_SYSTEM_PROMPT: &str =
    "You are a document summarizer. Provide a concise 2-3 sentence summary.";

/// Build the planning stage prompt.
pub fn planning_prompt(query: &str, parent_context: &str, document_context: &str) -> String {
    format!(
        r#"You are a research planning assistant.

{parent_context}
{document_context}

USER QUERY: {query}

Create a research plan with:
1. Break down the query into sub-questions
2. Identify key topics to research
3. Suggest search strategies

Respond in a structured format."#
    )
}

/// Build the research stage prompt.
pub fn research_prompt(
    query: &str,
    plan: &str,
    parent_context: &str,
    document_context: &str,
) -> String {
    format!(
        r#"You are a deep research assistant.

{parent_context}
{document_context}

RESEARCH PLAN:
{plan}

USER QUERY: {query}

Conduct thorough research on this topic. Provide:
1. Comprehensive findings from multiple perspectives
2. Key facts and data points
3. Expert opinions and analyses
4. Relevant examples and case studies

Be thorough, accurate, and cite your reasoning."#
    )
}

/// Build the report stage prompt.
pub fn report_prompt(query: &str, findings: &str) -> String {
    format!(
        r#"You are a research report writer.

RESEARCH FINDINGS:
{findings}

USER QUERY: {query}

Write a comprehensive, well-structured research report that:
1. Has a clear executive summary
2. Presents findings in logical sections
3. Includes key insights and conclusions
4. Is professional and easy to read

Format with clear headings and sections."#
    )
}

/// Build the summarize stage prompt. The response format here is what
/// [`crate::research::parse_summary_response`] expects.
pub fn summary_prompt(report: &str) -> String {
    format!(
        r#"Based on this research report, provide:

REPORT:
{report}

1. A 2-3 sentence summary
2. A JSON list of 3-5 key findings (as strings)
3. A JSON list of sources/topics covered (as strings)

Format your response as:
SUMMARY: [your summary]
KEY_FINDINGS: ["finding 1", "finding 2", ...]
SOURCES: ["source 1", "source 2", ...]"#
    )
}

/// Build the document summary prompt.
pub fn document_summary_prompt(text: &str) -> String {
    format!("Summarize this document:\n\n{text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planning_prompt_embeds_query_and_context() {
        let prompt = planning_prompt("Why is the sky blue?", "PARENT", "DOCS");
        assert!(prompt.contains("USER QUERY: Why is the sky blue?"));
        assert!(prompt.contains("PARENT\nDOCS"));
    }

    #[test]
    fn test_research_prompt_includes_plan() {
        let prompt = research_prompt("q", "1. look up rayleigh", "", "");
        assert!(prompt.contains("RESEARCH PLAN:\n1. look up rayleigh"));
    }

    #[test]
    fn test_report_prompt_omits_context() {
        let prompt = report_prompt("q", "findings here");
        assert!(prompt.contains("RESEARCH FINDINGS:\nfindings here"));
        assert!(!prompt.contains("PREVIOUS RESEARCH CONTEXT"));
    }

    #[test]
    fn test_summary_prompt_describes_labels() {
        let prompt = summary_prompt("the report");
        assert!(prompt.contains("SUMMARY:"));
        assert!(prompt.contains("KEY_FINDINGS:"));
        assert!(prompt.contains("SOURCES:"));
        assert!(prompt.contains("REPORT:\nthe report"));
    }
}
