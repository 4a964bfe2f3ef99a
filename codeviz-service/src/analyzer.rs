//! The single analysis boundary: request in, normalized record or error out

use crate::credential::CredentialSource;
use crate::normalize::{AnalysisRecord, NormalizeError, Normalizer};
use crate::prompt::{TaskKind, build_prompts};
use crate::provider::{LlmProvider, LlmRequest, ProviderError};
use crate::CodevizConfig;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from running an analysis
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No API key available (checked {0})")]
    AuthenticationMissing(String),

    #[error("LLM service unavailable: {0}")]
    ServiceUnavailable(#[source] ProviderError),

    #[error("Model output could not be understood: {0}")]
    MalformedModelOutput(#[from] NormalizeError),
}

/// What to analyze and how
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnalysisRequest {
    #[serde(alias = "code")]
    source_code: String,
    language: String,
    #[serde(default = "default_task")]
    task: TaskKind,
}

fn default_task() -> TaskKind {
    TaskKind::Trace
}

impl AnalysisRequest {
    pub fn new(source_code: impl Into<String>, language: impl Into<String>, task: TaskKind) -> Self {
        Self {
            source_code: source_code.into(),
            language: language.into(),
            task,
        }
    }

    pub fn source_code(&self) -> &str {
        &self.source_code
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn task(&self) -> TaskKind {
        self.task
    }
}

/// Runs analyses against one provider
pub struct Analyzer {
    config: CodevizConfig,
    provider: Arc<dyn LlmProvider>,
    credentials: Arc<dyn CredentialSource>,
    normalizer: Normalizer,
}

impl Analyzer {
    pub fn new(
        config: CodevizConfig,
        provider: Arc<dyn LlmProvider>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let normalizer = Normalizer::new(config.limits.max_steps);
        Self {
            config,
            provider,
            credentials,
            normalizer,
        }
    }

    pub fn config(&self) -> &CodevizConfig {
        &self.config
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    /// Whether a credential is currently available; callers use this to disable analysis
    pub fn credential_available(&self) -> bool {
        self.credentials.get_credential().is_some()
    }

    fn validate(&self, request: &AnalysisRequest) -> Result<(), AnalysisError> {
        if request.source_code.trim().is_empty() {
            return Err(AnalysisError::InvalidRequest(
                "source code is empty".to_string(),
            ));
        }
        let chars = request.source_code.chars().count();
        let limit = self.config.limits.max_source_chars;
        if chars > limit {
            return Err(AnalysisError::InvalidRequest(format!(
                "source code is {chars} chars, limit is {limit}"
            )));
        }
        Ok(())
    }

    /// Run one analysis end to end
    pub async fn run(&self, request: &AnalysisRequest) -> Result<AnalysisRecord, AnalysisError> {
        self.validate(request)?;

        let api_key = self
            .credentials
            .get_credential()
            .ok_or_else(|| AnalysisError::AuthenticationMissing(self.credentials.describe()))?;

        let params = self.config.tasks.for_task(request.task);
        let prompts = build_prompts(request.task, &request.language, &request.source_code);
        let llm_request = LlmRequest::new(prompts.system, prompts.user)
            .with_temperature(params.temperature)
            .with_max_tokens(params.max_tokens)
            .with_api_key(api_key);

        info!(
            task = %request.task,
            language = %request.language,
            provider = self.provider.name(),
            model = self.provider.model(),
            source_chars = request.source_code.len(),
            "Starting analysis"
        );

        let response = self
            .provider
            .complete(&llm_request)
            .await
            .map_err(|e| {
                warn!(error = %e, "LLM call failed");
                AnalysisError::ServiceUnavailable(e)
            })?;

        debug!(
            reply_len = response.content.len(),
            duration_ms = ?response.duration_ms,
            total_tokens = ?response.usage.as_ref().map(|u| u.total_tokens),
            "Got LLM response"
        );

        match self
            .normalizer
            .normalize(request.task, &response.content, &request.language)
        {
            Ok(record) => Ok(record),
            Err(e) => {
                warn!(error = %e, reply_len = response.content.len(), "Model output could not be normalized");
                debug!(raw_reply = %response.content, "Unparseable model reply");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticCredential;
    use crate::provider::mock::{Script, ScriptedProvider};

    fn analyzer(provider: Arc<ScriptedProvider>, key: Option<&str>) -> Analyzer {
        Analyzer::new(
            CodevizConfig::default(),
            provider,
            Arc::new(StaticCredential::new(key.map(str::to_string))),
        )
    }

    fn trace_request() -> AnalysisRequest {
        AnalysisRequest::new("x = 1 + 2\nprint(x)", "python", TaskKind::Trace)
    }

    #[tokio::test]
    async fn test_missing_credential_short_circuits() {
        let provider = Arc::new(ScriptedProvider::replying("{}"));
        let analyzer = analyzer(provider.clone(), None);

        let err = analyzer.run(&trace_request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::AuthenticationMissing(_)));
        assert_eq!(provider.calls(), 0);
        assert!(!analyzer.credential_available());
    }

    #[tokio::test]
    async fn test_empty_source_rejected_before_call() {
        let provider = Arc::new(ScriptedProvider::replying("{}"));
        let analyzer = analyzer(provider.clone(), Some("gsk"));

        let request = AnalysisRequest::new("   \n", "python", TaskKind::Trace);
        let err = analyzer.run(&request).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidRequest(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_oversized_source_rejected_before_call() {
        let provider = Arc::new(ScriptedProvider::replying("{}"));
        let mut config = CodevizConfig::default();
        config.limits.max_source_chars = 10;
        let analyzer = Analyzer::new(
            config,
            provider.clone(),
            Arc::new(StaticCredential::new(Some("gsk".to_string()))),
        );

        let err = analyzer.run(&trace_request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidRequest(ref m) if m.contains("limit is 10")));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_trace_end_to_end() {
        let reply = "```json\n{\"language\":\"python\",\"summary\":\"adds two numbers\",\"steps\":[{\"line\":1,\"operation\":\"assign\"},]}\n```";
        let provider = Arc::new(ScriptedProvider::replying(reply));
        let analyzer = analyzer(provider.clone(), Some("gsk_live"));

        let record = analyzer.run(&trace_request()).await.unwrap();
        let trace = record.as_trace().unwrap();
        assert_eq!(trace.summary, "adds two numbers");
        assert_eq!(trace.steps[0].step, 1);
        assert_eq!(provider.calls(), 1);

        let sent = provider.last_request().unwrap();
        assert_eq!(sent.api_key.as_deref(), Some("gsk_live"));
        assert_eq!(sent.temperature, Some(0.2));
        assert_eq!(sent.max_tokens, Some(6000));
        assert!(sent.prompt.contains("<CODE>\nx = 1 + 2\nprint(x)\n</CODE>"));
    }

    #[tokio::test]
    async fn test_task_parameters_follow_task() {
        let provider = Arc::new(ScriptedProvider::replying(r#"{"functions":[]}"#));
        let analyzer = analyzer(provider.clone(), Some("gsk"));

        let request = AnalysisRequest::new("def f(): pass", "python", TaskKind::Complexity);
        let record = analyzer.run(&request).await.unwrap();
        assert!(matches!(record, AnalysisRecord::Complexity(_)));
        assert_eq!(provider.last_request().unwrap().max_tokens, Some(3500));
    }

    #[tokio::test]
    async fn test_service_failures_are_not_malformed_output() {
        for script in [Script::RateLimited, Script::Timeout] {
            let provider = Arc::new(ScriptedProvider::new(script));
            let analyzer = analyzer(provider.clone(), Some("gsk"));
            let err = analyzer.run(&trace_request()).await.unwrap_err();
            assert!(matches!(err, AnalysisError::ServiceUnavailable(_)), "{err}");
            assert_eq!(provider.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_garbage_reply_is_malformed_output() {
        let provider = Arc::new(ScriptedProvider::replying("Sorry, I can't do that."));
        let analyzer = analyzer(provider, Some("gsk"));
        let err = analyzer.run(&trace_request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedModelOutput(_)));
        assert!(!err.to_string().contains("Sorry"));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: AnalysisRequest =
            serde_json::from_str(r#"{"code": "print(1)", "language": "python"}"#).unwrap();
        assert_eq!(request.task(), TaskKind::Trace);
        assert_eq!(request.source_code(), "print(1)");
    }
}
