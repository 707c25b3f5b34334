//! Token counting and cost accounting for a single research run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Model whose pricing row is used when a requested model is unknown.
pub const DEFAULT_PRICING_MODEL: &str = "gpt-4o-mini";

/// Price per one million tokens, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// USD per million input tokens.
    pub input_per_million: f64,
    /// USD per million output tokens.
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Create a pricing row
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }
}

/// Static mapping from model identifier to pricing, with a default row.
#[derive(Debug, Clone)]
pub struct PricingTable {
    rows: HashMap<String, ModelPricing>,
    default_model: String,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new(DEFAULT_PRICING_MODEL, ModelPricing::new(0.15, 0.60))
            .with_model("gpt-4o", ModelPricing::new(2.50, 10.00))
            .with_model("gpt-4", ModelPricing::new(30.00, 60.00))
    }
}

impl PricingTable {
    /// Table containing only the default row
    pub fn new(default_model: impl Into<String>, default_pricing: ModelPricing) -> Self {
        let default_model = default_model.into();
        let mut rows = HashMap::new();
        rows.insert(default_model.clone(), default_pricing);
        Self {
            rows,
            default_model,
        }
    }

    /// Add or replace a row
    pub fn with_model(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.rows.insert(model.into(), pricing);
        self
    }

    /// Pricing for `model`, or the default row when the model is unknown
    pub fn pricing_for(&self, model: &str) -> ModelPricing {
        self.rows
            .get(model)
            .or_else(|| self.rows.get(&self.default_model))
            .copied()
            .unwrap_or(ModelPricing::new(0.0, 0.0))
    }

    /// Estimated cost in USD for the given counts
    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let pricing = self.pricing_for(model);
        let cost = (input_tokens as f64 / 1_000_000.0) * pricing.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * pricing.output_per_million;
        cost.max(0.0)
    }

    /// Whether the table has a row for `model`
    pub fn knows(&self, model: &str) -> bool {
        self.rows.contains_key(model)
    }
}

/// Shared, immutable BPE tokenizer.
///
/// Loading the BPE ranks is expensive, so one instance is built at startup
/// and cloned into every run's [`TokenAccountant`].
#[derive(Clone)]
pub struct Tokenizer {
    bpe: Arc<CoreBPE>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer").finish()
    }
}

impl Tokenizer {
    /// Tokenizer for `model`, falling back to `cl100k_base` for models
    /// tiktoken does not know.
    pub fn for_model(model: &str) -> AppResult<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => {
                debug!(model = %model, "Unknown tokenizer model, using cl100k_base");
                tiktoken_rs::cl100k_base().map_err(|e| AppError::Internal {
                    message: format!("Failed to load cl100k_base tokenizer: {}", e),
                })?
            }
        };

        Ok(Self { bpe: Arc::new(bpe) })
    }

    /// Number of tokens in `text`
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Tokens attributed to one named stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageUsage {
    /// Stage name.
    pub stage: String,
    /// Prompt tokens for the stage.
    pub input_tokens: u64,
    /// Response tokens for the stage.
    pub output_tokens: u64,
}

/// Point-in-time snapshot of a run's token usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenStats {
    /// Prompt tokens so far.
    pub input_tokens: u64,
    /// Response tokens so far.
    pub output_tokens: u64,
    /// Input plus output.
    pub total_tokens: u64,
    /// USD estimate from the pricing table.
    pub estimated_cost: f64,
    /// Model the pricing row was looked up for.
    pub model: String,
}

/// Running input/output token totals for one pipeline run.
///
/// Each run owns its accountant; instances are never shared between runs.
#[derive(Debug, Clone)]
pub struct TokenAccountant {
    tokenizer: Tokenizer,
    pricing: Arc<PricingTable>,
    model: String,
    input_tokens: u64,
    output_tokens: u64,
    breakdown: Vec<StageUsage>,
}

impl TokenAccountant {
    /// Create an accountant with zeroed counters
    pub fn new(tokenizer: Tokenizer, pricing: Arc<PricingTable>, model: impl Into<String>) -> Self {
        Self {
            tokenizer,
            pricing,
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            breakdown: Vec::new(),
        }
    }

    /// Count tokens in `text` without recording them
    pub fn count(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    /// Attribute subsequent counts to `stage`
    pub fn begin_stage(&mut self, stage: impl Into<String>) {
        self.breakdown.push(StageUsage {
            stage: stage.into(),
            input_tokens: 0,
            output_tokens: 0,
        });
    }

    /// Record `text` as sent to the model
    pub fn record_input(&mut self, text: &str) {
        let tokens = self.count(text) as u64;
        self.input_tokens += tokens;
        if let Some(stage) = self.breakdown.last_mut() {
            stage.input_tokens += tokens;
        }
    }

    /// Record `text` as received from the model
    pub fn record_output(&mut self, text: &str) {
        let tokens = self.count(text) as u64;
        self.output_tokens += tokens;
        if let Some(stage) = self.breakdown.last_mut() {
            stage.output_tokens += tokens;
        }
    }

    /// Estimated cost of everything recorded so far
    pub fn cost(&self) -> f64 {
        self.pricing
            .cost(&self.model, self.input_tokens, self.output_tokens)
    }

    /// Snapshot of the current totals
    pub fn stats(&self) -> TokenStats {
        TokenStats {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            total_tokens: self.input_tokens + self.output_tokens,
            estimated_cost: self.cost(),
            model: self.model.clone(),
        }
    }

    /// Per-stage attribution recorded so far
    pub fn breakdown(&self) -> &[StageUsage] {
        &self.breakdown
    }

    /// Model used for pricing
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accountant(model: &str) -> TokenAccountant {
        let tokenizer = Tokenizer::for_model(model).unwrap();
        TokenAccountant::new(tokenizer, Arc::new(PricingTable::default()), model)
    }

    #[test]
    fn test_count_empty_is_zero() {
        let acc = accountant("gpt-4o-mini");
        assert_eq!(acc.count(""), 0);
        assert!(acc.count("Hello, world!") > 0);
    }

    #[test]
    fn test_unknown_tokenizer_model_falls_back() {
        let tokenizer = Tokenizer::for_model("my-local-llama").unwrap();
        assert!(tokenizer.count("some text") > 0);
    }

    #[test]
    fn test_cost_formula() {
        let table = PricingTable::default();
        let cost = table.cost("gpt-4o-mini", 1_000_000, 1_000_000);
        assert!((cost - 0.75).abs() < 1e-12);

        let cost = table.cost("gpt-4", 500_000, 0);
        assert!((cost - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_model_uses_default_pricing() {
        let table = PricingTable::default();
        assert!(!table.knows("claude-x"));
        assert_eq!(table.pricing_for("claude-x"), table.pricing_for("gpt-4o-mini"));
        assert_eq!(
            table.cost("claude-x", 1000, 2000),
            table.cost("gpt-4o-mini", 1000, 2000)
        );
    }

    #[test]
    fn test_stats_total_is_sum() {
        let mut acc = accountant("gpt-4o-mini");
        acc.record_input("The quick brown fox jumps over the lazy dog.");
        acc.record_output("A fox jumped.");

        let stats = acc.stats();
        assert!(stats.input_tokens > 0);
        assert!(stats.output_tokens > 0);
        assert_eq!(stats.total_tokens, stats.input_tokens + stats.output_tokens);
        assert_eq!(stats.model, "gpt-4o-mini");
        assert!(stats.estimated_cost > 0.0);
    }

    #[test]
    fn test_cost_is_monotonic() {
        let mut acc = accountant("gpt-4o");
        let mut previous = acc.cost();
        for chunk in ["alpha", "", "beta gamma delta", "epsilon"] {
            acc.record_input(chunk);
            assert!(acc.cost() >= previous);
            previous = acc.cost();
            acc.record_output(chunk);
            assert!(acc.cost() >= previous);
            previous = acc.cost();
        }
    }

    #[test]
    fn test_breakdown_attributes_to_current_stage() {
        let mut acc = accountant("gpt-4o-mini");
        acc.record_input("before any stage");
        acc.begin_stage("plan");
        acc.record_input("plan prompt");
        acc.record_output("plan output");
        acc.begin_stage("research");
        acc.record_input("research prompt");

        let breakdown = acc.breakdown();
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].stage, "plan");
        assert!(breakdown[0].output_tokens > 0);
        assert_eq!(breakdown[1].output_tokens, 0);

        let staged: u64 = breakdown.iter().map(|s| s.input_tokens).sum();
        assert!(acc.stats().input_tokens > staged);
    }
}
