//! The four-stage research pipeline: plan, research, report, summarize.
//!
//! Stage two is pure model synthesis. No retrieval happens anywhere in the
//! pipeline, so findings are only as good as the model's own knowledge plus
//! whatever document context was supplied.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use super::parser::StructuredOutputParser;
use super::tokens::{PricingTable, StageUsage, TokenAccountant, TokenStats, Tokenizer};
use crate::error::LlmResult;
use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::{
    planning_prompt, report_prompt, research_prompt, summary_prompt, PLANNER_SYSTEM_PROMPT,
    REPORT_WRITER_SYSTEM_PROMPT, RESEARCHER_SYSTEM_PROMPT, SUMMARIZER_SYSTEM_PROMPT,
};

/// Strategy label stored on every reasoning trace.
pub const SEARCH_STRATEGY: &str = "Multi-step LLM-based research with context building";

/// Source selection label stored on every reasoning trace.
pub const SOURCE_SELECTION: &str = "AI knowledge synthesis with document context";

/// Synthesis label stored on every reasoning trace.
pub const SYNTHESIS_APPROACH: &str =
    "Iterative refinement with planning, research, and report generation";

/// Step labels stored on every reasoning trace, in order.
pub const REASONING_STEPS: [&str; 4] = [
    "Query planning and decomposition",
    "Deep research with context",
    "Report generation",
    "Summary extraction",
];

/// One model invocation of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStage {
    /// Decompose the query.
    Plan,
    /// Synthesize findings.
    Research,
    /// Write the report.
    Report,
    /// Extract summary, findings and sources.
    Summarize,
}

impl ResearchStage {
    /// All stages in execution order
    pub const ALL: [ResearchStage; 4] = [
        ResearchStage::Plan,
        ResearchStage::Research,
        ResearchStage::Report,
        ResearchStage::Summarize,
    ];

    /// Stable name used in logs and cost breakdowns
    pub fn as_str(self) -> &'static str {
        match self {
            ResearchStage::Plan => "plan",
            ResearchStage::Research => "research",
            ResearchStage::Report => "report",
            ResearchStage::Summarize => "summarize",
        }
    }

    fn system_prompt(self) -> &'static str {
        match self {
            ResearchStage::Plan => PLANNER_SYSTEM_PROMPT,
            ResearchStage::Research => RESEARCHER_SYSTEM_PROMPT,
            ResearchStage::Report => REPORT_WRITER_SYSTEM_PROMPT,
            ResearchStage::Summarize => SUMMARIZER_SYSTEM_PROMPT,
        }
    }
}

impl std::fmt::Display for ResearchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a report was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    /// Plan stage output, verbatim.
    pub query_plan: String,
    /// Fixed strategy label.
    pub search_strategy: String,
    /// Fixed source selection label.
    pub source_selection: String,
    /// Fixed synthesis label.
    pub synthesis_approach: String,
    /// Fixed step labels.
    pub steps: Vec<String>,
}

impl ReasoningTrace {
    /// Trace for a run whose planning stage produced `plan`
    pub fn from_plan(plan: impl Into<String>) -> Self {
        Self {
            query_plan: plan.into(),
            search_strategy: SEARCH_STRATEGY.to_string(),
            source_selection: SOURCE_SELECTION.to_string(),
            synthesis_approach: SYNTHESIS_APPROACH.to_string(),
            steps: REASONING_STEPS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResult {
    /// Report stage output.
    pub report: String,
    /// Parsed summary text.
    pub summary: String,
    /// Parsed key findings.
    pub key_findings: Vec<String>,
    /// Parsed sources.
    pub sources: Vec<String>,
    /// How the run reached its result.
    pub reasoning: ReasoningTrace,
    /// The summarize stage output did not match the expected layout.
    pub parse_fallback: bool,
    /// Totals for the whole run.
    pub usage: TokenStats,
    /// Per-stage token counts.
    pub breakdown: Vec<StageUsage>,
}

/// Runs the stages in order against an injected [`LlmClient`].
///
/// The pipeline holds no per-run state; each call to [`run`](Self::run)
/// creates its own [`TokenAccountant`], so one pipeline can serve many
/// concurrent runs.
#[derive(Clone)]
pub struct ResearchPipeline {
    llm: Arc<dyn LlmClient>,
    tokenizer: Tokenizer,
    pricing: Arc<PricingTable>,
    model: String,
    temperature: f64,
    parser: StructuredOutputParser,
}

impl ResearchPipeline {
    /// Create a pipeline using `model` for every stage
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tokenizer: Tokenizer,
        pricing: Arc<PricingTable>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            tokenizer,
            pricing,
            model: model.into(),
            temperature: 0.7,
            parser: StructuredOutputParser,
        }
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Model used for every stage
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Execute all four stages.
    ///
    /// Context blocks may be empty. Any stage error aborts the run and is
    /// returned unchanged; nothing is retried here.
    pub async fn run(
        &self,
        query: &str,
        parent_context: &str,
        document_context: &str,
    ) -> LlmResult<ResearchResult> {
        let start = Instant::now();
        let mut tokens =
            TokenAccountant::new(self.tokenizer.clone(), self.pricing.clone(), &self.model);

        tokens.record_input(parent_context);
        tokens.record_input(document_context);

        let plan = self
            .stage(
                &mut tokens,
                ResearchStage::Plan,
                planning_prompt(query, parent_context, document_context),
            )
            .await?;

        let findings = self
            .stage(
                &mut tokens,
                ResearchStage::Research,
                research_prompt(query, &plan, parent_context, document_context),
            )
            .await?;

        let report = self
            .stage(
                &mut tokens,
                ResearchStage::Report,
                report_prompt(query, &findings),
            )
            .await?;

        let raw_summary = self
            .stage(
                &mut tokens,
                ResearchStage::Summarize,
                summary_prompt(&report),
            )
            .await?;

        let parsed = self.parser.parse(&raw_summary);
        let usage = tokens.stats();

        info!(
            model = %self.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            estimated_cost = usage.estimated_cost,
            parse_fallback = parsed.fallback,
            latency_ms = start.elapsed().as_millis() as u64,
            "Research pipeline completed"
        );

        Ok(ResearchResult {
            report,
            summary: parsed.summary,
            key_findings: parsed.key_findings,
            sources: parsed.sources,
            reasoning: ReasoningTrace::from_plan(plan),
            parse_fallback: parsed.fallback,
            usage,
            breakdown: tokens.breakdown().to_vec(),
        })
    }

    async fn stage(
        &self,
        tokens: &mut TokenAccountant,
        stage: ResearchStage,
        user_prompt: String,
    ) -> LlmResult<String> {
        let start = Instant::now();
        let system_prompt = stage.system_prompt();

        tokens.begin_stage(stage.as_str());
        tokens.record_input(system_prompt);
        tokens.record_input(&user_prompt);

        debug!(stage = %stage, prompt_chars = user_prompt.len(), "Starting research stage");

        let request = CompletionRequest::new(system_prompt, user_prompt, &self.model)
            .with_temperature(self.temperature);

        let output = match self.llm.complete(request).await {
            Ok(output) => output,
            Err(e) => {
                error!(
                    stage = %stage,
                    error = %e,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Research stage failed"
                );
                return Err(e);
            }
        };

        tokens.record_output(&output);

        if let Some(usage) = tokens.breakdown().last() {
            debug!(
                stage = %stage,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                latency_ms = start.elapsed().as_millis() as u64,
                "Research stage completed"
            );
        }

        Ok(output)
    }
}
