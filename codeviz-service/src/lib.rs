//! Code Visualizer - LLM-backed execution traces for pasted source code
//!
//! This crate provides:
//! - Prompt construction for trace, error-scan and complexity analyses
//! - A tolerant normalizer that turns free-form model replies into typed records
//! - OpenAI-compatible provider backends (Groq, custom gateways)
//! - Presentation state for stepping through a trace, plus a REST API and web page

pub mod analyzer;
pub mod api;
pub mod credential;
pub mod normalize;
pub mod prompt;
pub mod provider;
pub mod session;
pub mod view;

pub use analyzer::{AnalysisError, AnalysisRequest, Analyzer};
pub use normalize::{AnalysisRecord, NormalizedTrace, Normalizer, Step};
pub use prompt::{TaskKind, build_prompts};
pub use provider::{LlmProvider, LlmRequest, LlmResponse};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use credential::{CredentialChain, EnvCredential, SecretsFileCredential, StaticCredential};
use provider::{GroqProvider, OpenAiCompatProvider, ProviderError};

/// Errors loading configuration or building what it describes
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unknown provider type: {0}")]
    UnknownProvider(String),

    #[error("Failed to build provider: {0}")]
    Provider(#[from] ProviderError),
}

/// Configuration for the whole system
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CodevizConfig {
    /// Max tracing level for the binaries: error, warn, info, debug, trace
    pub log_level: LogLevel,

    pub provider: ProviderConfig,

    pub tasks: TaskSettings,

    pub limits: LimitsConfig,

    pub server: ServerConfig,
}

impl CodevizConfig {
    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Credential lookup order: inline key, environment variable, secrets file
    pub fn credential_chain(&self) -> CredentialChain {
        CredentialChain::new()
            .with(StaticCredential::new(self.provider.api_key.clone()))
            .with(EnvCredential::new(&self.provider.api_key_env))
            .with(SecretsFileCredential::new(
                &self.provider.secrets_file,
                &self.provider.api_key_env,
            ))
    }

    /// Build the configured provider backend
    pub fn build_provider(&self) -> Result<Arc<dyn LlmProvider>, ConfigError> {
        let timeout = Duration::from_secs(self.provider.timeout_secs);
        match self.provider.provider_type.as_str() {
            "groq" => Ok(Arc::new(GroqProvider::with_model(
                &self.provider.model,
                timeout,
            )?)),
            "openai" => Ok(Arc::new(OpenAiCompatProvider::with_base_url(
                &self.provider.base_url,
                &self.provider.model,
                timeout,
            )?)),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Configuration for the LLM provider
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider type: "groq" or "openai"
    pub provider_type: String,

    /// Base URL, only used by "openai"
    pub base_url: String,

    /// Model name
    pub model: String,

    /// Inline API key; prefer the environment
    pub api_key: Option<String>,

    /// Environment variable (and secrets-file key) holding the API key
    pub api_key_env: String,

    /// TOML secrets file checked after the environment
    pub secrets_file: PathBuf,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: "groq".to_string(),
            base_url: "http://localhost:4000".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            api_key: None,
            api_key_env: "GROQ_API_KEY".to_string(),
            secrets_file: PathBuf::from(".streamlit/secrets.toml"),
            timeout_secs: 120,
        }
    }
}

/// Sampling parameters for one task
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl TaskParams {
    fn overridden(self, table: TaskTable) -> Self {
        Self {
            temperature: table.temperature.unwrap_or(self.temperature),
            max_tokens: table.max_tokens.unwrap_or(self.max_tokens),
        }
    }
}

/// One `[tasks.*]` table as written; missing keys keep the task's default
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
struct TaskTable {
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TaskTables {
    trace: TaskTable,
    errors: TaskTable,
    complexity: TaskTable,
}

/// Per-task sampling parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "TaskTables")]
pub struct TaskSettings {
    pub trace: TaskParams,
    pub errors: TaskParams,
    pub complexity: TaskParams,
}

impl TaskSettings {
    pub fn for_task(&self, task: TaskKind) -> TaskParams {
        match task {
            TaskKind::Trace => self.trace,
            TaskKind::ErrorScan => self.errors,
            TaskKind::Complexity => self.complexity,
        }
    }
}

impl From<TaskTables> for TaskSettings {
    fn from(tables: TaskTables) -> Self {
        let defaults = Self::default();
        Self {
            trace: defaults.trace.overridden(tables.trace),
            errors: defaults.errors.overridden(tables.errors),
            complexity: defaults.complexity.overridden(tables.complexity),
        }
    }
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            trace: TaskParams {
                temperature: 0.2,
                max_tokens: 6000,
            },
            errors: TaskParams {
                temperature: 0.1,
                max_tokens: 3000,
            },
            complexity: TaskParams {
                temperature: 0.1,
                max_tokens: 3500,
            },
        }
    }
}

/// Resource limits on what goes out and what comes back
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest source (in chars) embedded in a prompt
    pub max_source_chars: usize,

    /// Steps kept from a trace reply
    pub max_steps: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_source_chars: 20_000,
            max_steps: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,

    /// Auto-advance interval for playback
    pub autoplay_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            autoplay_interval_ms: 800,
        }
    }
}
