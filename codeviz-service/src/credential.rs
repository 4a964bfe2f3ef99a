//! Bearer credential lookup
//!
//! The analyzer only asks one question: is there an API key right now? Sources are
//! checked in order and the first non-empty value wins.

use std::path::PathBuf;
use tracing::debug;

/// Anything that can hand out the provider API key
pub trait CredentialSource: Send + Sync {
    /// Short label for logs; never the secret itself
    fn describe(&self) -> String;

    fn get_credential(&self) -> Option<String>;
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A key fixed at construction, usually the inline `api_key` from config
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    pub fn new(key: Option<String>) -> Self {
        Self(non_empty(key))
    }
}

impl CredentialSource for StaticCredential {
    fn describe(&self) -> String {
        "config".to_string()
    }

    fn get_credential(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads an environment variable on every lookup
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialSource for EnvCredential {
    fn describe(&self) -> String {
        format!("env:{}", self.var)
    }

    fn get_credential(&self) -> Option<String> {
        non_empty(std::env::var(&self.var).ok())
    }
}

/// Host secrets store: a TOML file with top-level `KEY = "value"` pairs
pub struct SecretsFileCredential {
    path: PathBuf,
    key: String,
}

impl SecretsFileCredential {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }
}

impl CredentialSource for SecretsFileCredential {
    fn describe(&self) -> String {
        format!("secrets:{}", self.path.display())
    }

    fn get_credential(&self) -> Option<String> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        let table: toml::Table = match toml::from_str(&contents) {
            Ok(table) => table,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Secrets file is not valid TOML");
                return None;
            }
        };
        non_empty(table.get(&self.key)?.as_str().map(str::to_string))
    }
}

/// Ordered list of sources
#[derive(Default)]
pub struct CredentialChain {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl CredentialChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl CredentialSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl CredentialSource for CredentialChain {
    fn describe(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.describe())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    fn get_credential(&self) -> Option<String> {
        self.sources.iter().find_map(|source| {
            let key = source.get_credential();
            if key.is_some() {
                debug!(source = %source.describe(), "Resolved API key");
            }
            key
        })
    }
}
