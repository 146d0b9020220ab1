pub mod pool;
pub mod providers;

use crate::config::{LlmConfig, ProviderConfig};
use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use pool::ModelPool;

/// Hint shown to users when the whole pool is exhausted.
pub const RETRY_HINT: &str = "AI models temporarily unavailable. Try again.";

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
    ServiceUnavailable(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
            LlmError::ServiceUnavailable(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for LlmError {}

/// A backend able to turn a prompt into text with a named model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError>;

    /// Short backend label used in logs.
    fn name(&self) -> &str;
}

/// Builds one adapter for a configured provider entry.
pub fn build_backend(
    provider: &ProviderConfig,
    timeout: Duration,
) -> Result<Arc<dyn TextGenerator>, LlmError> {
    let backend: Arc<dyn TextGenerator> = match provider.backend.as_str() {
        "gemini" => Arc::new(providers::gemini::GeminiProvider::new(provider, timeout)?),
        "remote" => Arc::new(providers::remote::RemoteLlmProvider::new(provider, timeout)?),
        "ollama" => Arc::new(providers::ollama::OllamaProvider::new(provider, timeout)?),
        _ => {
            return Err(LlmError::ConfigError(format!(
                "Unsupported LLM backend: {}",
                provider.backend
            )))
        }
    };

    Ok(backend)
}

/// Flattens every configured provider into one ordered pool.
pub fn build_pool(config: &LlmConfig) -> Result<ModelPool, LlmError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let mut pool = ModelPool::new(config.attempts_per_model);

    for provider in &config.providers {
        let backend = build_backend(provider, timeout)?;
        for model in &provider.models {
            pool.push(Arc::clone(&backend), model.clone());
        }
    }

    if pool.is_empty() {
        return Err(LlmError::ConfigError("No LLM models configured".to_string()));
    }

    Ok(pool)
}
