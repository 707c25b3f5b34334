use serde::{Deserialize, Serialize};

/// Message in a chat completion conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author of the message.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions for the model.
    System,
    /// Caller input.
    User,
    /// Model output.
    Assistant,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// One model invocation: a system prompt and a user prompt against a model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Role instructions for the model.
    pub system_prompt: String,
    /// The stage prompt.
    pub user_prompt: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
}

impl CompletionRequest {
    /// Create a request for `model` with the default temperature of 0.7
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: model.into(),
            temperature: 0.7,
        }
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Request body for `POST /v1/chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation so far.
    pub messages: Vec<Message>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Completion length cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl From<&CompletionRequest> for ChatRequest {
    fn from(request: &CompletionRequest) -> Self {
        Self {
            model: request.model.clone(),
            messages: vec![
                Message::system(&request.system_prompt),
                Message::user(&request.user_prompt),
            ],
            temperature: request.temperature,
            max_tokens: None,
        }
    }
}

/// Response body from `POST /v1/chat/completions`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// Provider response id.
    #[serde(default)]
    pub id: Option<String>,
    /// Model that answered.
    #[serde(default)]
    pub model: Option<String>,
    /// Completion choices, usually one.
    pub choices: Vec<Choice>,
    /// Token usage, when reported.
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// A single completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    /// Position in the choice list.
    pub index: u32,
    /// The generated message.
    pub message: ChoiceMessage,
    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Assistant message inside a choice
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    /// Always assistant.
    pub role: MessageRole,
    /// Generated text; null for tool calls.
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: Option<u32>,
    /// Tokens generated.
    pub completion_tokens: Option<u32>,
    /// Sum of both.
    pub total_tokens: Option<u32>,
}

impl ChatResponse {
    /// Text of the first choice, if the provider returned any content
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}
