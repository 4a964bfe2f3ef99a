//! Groq API provider implementation

use super::{LlmProvider, LlmRequest, LlmResponse, ProviderError, post_chat_completion};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Groq hosted inference provider
pub struct GroqProvider {
    client: Client,
    model: String,
}

impl GroqProvider {
    /// Create with a specific model and request timeout
    pub fn with_model(model: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            model: model.into(),
        })
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        post_chat_completion(&self.client, GROQ_CHAT_URL, self.name(), &self.model, request).await
    }
}
