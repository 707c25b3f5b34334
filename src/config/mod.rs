use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// LLM endpoint and sampling settings.
    pub llm: LlmConfig,
    /// SQLite location and pool size.
    pub database: DatabaseConfig,
    /// Log level and format.
    pub logging: LoggingConfig,
    /// HTTP timeout and retry policy.
    pub request: RequestConfig,
    /// Research run limits.
    pub research: ResearchConfig,
    /// Upload limits.
    pub documents: DocumentConfig,
}

/// LLM provider configuration (OpenAI-compatible chat completions API)
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Bearer token for the LLM endpoint.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Model used for every pipeline stage and for pricing lookup.
    pub model: String,
    /// Temperature for pipeline stages.
    pub temperature: f64,
    /// Temperature for document summaries.
    pub summary_temperature: f64,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path, or `:memory:`.
    pub path: PathBuf,
    /// Maximum pooled connections.
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable output.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Initial backoff delay, doubled per retry.
    pub retry_delay_ms: u64,
}

/// Research session execution configuration
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Upper bound on pipelines running at once in the background pool.
    pub max_concurrent_runs: usize,
    /// Owner recorded on sessions created without an explicit user.
    pub default_user: String,
}

/// Uploaded document limits
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    /// Largest accepted upload in bytes.
    pub max_bytes: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let llm = LlmConfig {
            api_key: env::var("LLM_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .map_err(|_| AppError::Config {
                    message: "LLM_API_KEY is required".to_string(),
                })?,
            base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            temperature: parse_var("LLM_TEMPERATURE", 0.7),
            summary_temperature: parse_var("LLM_SUMMARY_TEMPERATURE", 0.5),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/research.db".to_string()),
            ),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_var("REQUEST_TIMEOUT_MS", 30000),
            max_retries: parse_var("MAX_RETRIES", 2),
            retry_delay_ms: parse_var("RETRY_DELAY_MS", 1000),
        };

        let research = ResearchConfig {
            max_concurrent_runs: parse_var("RESEARCH_MAX_CONCURRENT_RUNS", 4usize).max(1),
            default_user: env::var("RESEARCH_DEFAULT_USER")
                .unwrap_or_else(|_| "default".to_string()),
        };

        let documents = DocumentConfig {
            max_bytes: parse_var("DOCUMENT_MAX_BYTES", DocumentConfig::default().max_bytes),
        };

        Ok(Config {
            llm,
            database,
            logging,
            request,
            research,
            documents,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 4,
            default_user: "default".to_string(),
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

impl LlmConfig {
    /// Configuration pointing at `base_url` with default model settings.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            summary_temperature: 0.5,
        }
    }
}
