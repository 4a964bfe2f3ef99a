//! LLM Provider abstraction and implementations

mod groq;
mod openai;

pub use groq::GroqProvider;
pub use openai::OpenAiCompatProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

/// Errors that can occur when interacting with an LLM provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Provider returned error: {0}")]
    ProviderError(String),

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Connection failed: {0}")]
    ConnectionError(String),

    #[error("Timeout waiting for response")]
    Timeout,

    #[error("No API key supplied for provider {0}")]
    MissingCredential(String),
}

impl ProviderError {
    /// Classify a reqwest failure, pulling timeouts and connect errors out of the generic bucket
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_connect() {
            ProviderError::ConnectionError(err.to_string())
        } else {
            ProviderError::HttpError(err)
        }
    }
}

/// Request to send to an LLM
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System prompt
    pub system: String,

    /// User message/prompt
    pub prompt: String,

    /// Temperature (0.0 - 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Bearer credential, never serialized
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl LlmRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
            api_key: None,
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Response from an LLM
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// The generated text
    pub content: String,

    /// Token usage statistics
    pub usage: Option<TokenUsage>,

    /// Time taken for generation (ms)
    pub duration_ms: Option<u64>,
}

/// Token usage statistics
#[derive(Debug, Clone, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name for logging/identification
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;

    /// Send a completion request to the LLM
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError>;
}

/// OpenAI-compatible chat request, shared by every backend in this module
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// OpenAI-compatible chat response
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// POST a chat completion to `url` and unwrap the first choice
async fn post_chat_completion(
    client: &reqwest::Client,
    url: &str,
    provider_name: &str,
    model: &str,
    request: &LlmRequest,
) -> Result<LlmResponse, ProviderError> {
    let api_key = request
        .api_key
        .as_deref()
        .ok_or_else(|| ProviderError::MissingCredential(provider_name.to_string()))?;

    let chat_request = ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: &request.system,
            },
            ChatMessage {
                role: "user",
                content: &request.prompt,
            },
        ],
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream: false,
    };

    let start = Instant::now();

    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(&chat_request)
        .send()
        .await
        .map_err(ProviderError::from_transport)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited(body));
        }
        return Err(ProviderError::ProviderError(format!(
            "HTTP {}: {}",
            status, body
        )));
    }

    let chat_response: ChatResponse = response
        .json()
        .await
        .map_err(ProviderError::from_transport)?;
    let duration_ms = start.elapsed().as_millis() as u64;

    let content = chat_response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();

    Ok(LlmResponse {
        content,
        usage: chat_response.usage,
        duration_ms: Some(duration_ms),
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = LlmRequest::new("sys", "user")
            .with_temperature(0.2)
            .with_max_tokens(6000)
            .with_api_key("gsk_test");
        assert_eq!(req.temperature, Some(0.2));
        assert_eq!(req.max_tokens, Some(6000));
        assert_eq!(req.api_key.as_deref(), Some("gsk_test"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let req = LlmRequest::new("sys", "user").with_api_key("secret");
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn test_chat_response_tolerates_null_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}],"usage":null}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
