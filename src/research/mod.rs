//! The research core: token accounting, context composition, output
//! parsing, the staged pipeline, document ingestion and session
//! orchestration.

mod context;
mod documents;
mod orchestrator;
mod parser;
mod pipeline;
mod tokens;
mod worker;

pub use context::{
    truncate_chars, ContextComposer, BUILD_UPON_INSTRUCTION, DOCUMENT_EXCERPT_CHARS,
    NO_PREVIOUS_FINDINGS, PARENT_REPORT_EXCERPT_CHARS,
};
pub use documents::{
    extract_text, DocumentIngestor, EXTRACTION_FAILED_SUMMARY, MIN_SUMMARY_CHARS,
    SUMMARY_INPUT_CHARS, TOO_SHORT_SUMMARY,
};
pub use orchestrator::{
    validate_query, ExecutionMode, SessionDetail, SessionOrchestrator, DEFAULT_HISTORY_LIMIT,
    MAX_QUERY_CHARS, MIN_QUERY_CHARS,
};
pub use parser::{
    parse_summary_response, ParsedSummary, StructuredOutputParser, FALLBACK_KEY_FINDING,
    FALLBACK_SOURCE, FALLBACK_SUMMARY_CHARS,
};
pub use pipeline::{
    ReasoningTrace, ResearchPipeline, ResearchResult, ResearchStage, REASONING_STEPS,
    SEARCH_STRATEGY, SOURCE_SELECTION, SYNTHESIS_APPROACH,
};
pub use tokens::{
    ModelPricing, PricingTable, StageUsage, TokenAccountant, TokenStats, Tokenizer,
    DEFAULT_PRICING_MODEL,
};
pub use worker::ResearchWorkerPool;
