//! LLM invocation collaborator.
//!
//! [`LlmClient`] is the seam the research pipeline and document ingestor call
//! through; [`OpenAiClient`] implements it against an OpenAI-compatible
//! chat completions endpoint.

mod client;
mod types;

#[cfg(test)]
pub use client::MockLlmClient;
pub use client::{LlmClient, OpenAiClient};
pub use types::{
    ChatRequest, ChatResponse, Choice, ChoiceMessage, CompletionRequest, Message, MessageRole,
    Usage,
};
