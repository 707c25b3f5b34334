use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ChatRequest, ChatResponse, CompletionRequest};
use crate::config::{LlmConfig, RequestConfig};
use crate::error::{LlmError, LlmResult};

/// A handle that can run one model invocation.
///
/// Injected into the pipeline and the document ingestor so tests can
/// substitute a scripted implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run `request` and return the completion text.
    async fn complete(&self, request: CompletionRequest) -> LlmResult<String>;
}

/// Client for OpenAI-compatible chat completion endpoints
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl OpenAiClient {
    /// Create a new client
    pub fn new(config: &LlmConfig, request_config: RequestConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Call the chat completions endpoint, retrying transport failures
    pub async fn chat(&self, request: &ChatRequest) -> LlmResult<ChatResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    model = %request.model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying chat completion request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, request).await {
                Ok(response) => {
                    info!(
                        model = %request.model,
                        latency_ms = start.elapsed().as_millis(),
                        "Chat completion succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        model = %request.model,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Chat completion failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(LlmError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(&self, url: &str, request: &ChatRequest) -> LlmResult<ChatResponse> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling chat completions"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<String> {
        let chat = ChatRequest::from(&request);
        let response = self.chat(&chat).await?;

        response
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "Completion contained no message content".to_string(),
            })
    }
}
