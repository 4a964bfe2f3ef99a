//! OpenAI-compatible gateway provider
//!
//! Talks to any server exposing `/v1/chat/completions` (OpenAI, LiteLLM, vLLM, a self-hosted
//! Groq proxy). The base URL is configured; the bearer key travels with each request.

use super::{LlmProvider, LlmRequest, LlmResponse, ProviderError, post_chat_completion};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// OpenAI-compatible provider with a configurable base URL
pub struct OpenAiCompatProvider {
    client: Client,
    base_url: String,
    model: String,
    name: String,
}

impl OpenAiCompatProvider {
    /// Create with a custom base URL
    pub fn with_base_url(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        let name = format!("openai:{}", model);
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url,
            model,
            name,
        })
    }

    fn chat_url(&self) -> String {
        if self.base_url.ends_with("/v1") {
            format!("{}/chat/completions", self.base_url)
        } else {
            format!("{}/v1/chat/completions", self.base_url)
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        post_chat_completion(&self.client, &self.chat_url(), &self.name, &self.model, request)
            .await
    }
}
