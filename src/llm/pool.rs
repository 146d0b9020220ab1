use super::{LlmError, RETRY_HINT, TextGenerator};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct PoolEntry {
    backend: Arc<dyn TextGenerator>,
    model: String,
}

/// Ordered set of (backend, model) pairs tried in sequence until one answers.
pub struct ModelPool {
    entries: Vec<PoolEntry>,
    attempts_per_model: usize,
}

impl ModelPool {
    pub fn new(attempts_per_model: usize) -> Self {
        Self {
            entries: Vec::new(),
            attempts_per_model: attempts_per_model.max(1),
        }
    }

    pub fn push(&mut self, backend: Arc<dyn TextGenerator>, model: impl Into<String>) {
        self.entries.push(PoolEntry {
            backend,
            model: model.into(),
        });
    }

    pub fn with_model(mut self, backend: Arc<dyn TextGenerator>, model: impl Into<String>) -> Self {
        self.push(backend, model);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `backend:model` labels in fallback order.
    pub fn models(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| format!("{}:{}", e.backend.name(), e.model))
            .collect()
    }

    /// Returns the first successful, trimmed response. Individual failures are
    /// logged and skipped; only total exhaustion is reported.
    pub async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        if prompt.trim().is_empty() {
            return Err(LlmError::ConfigError("Prompt must not be empty".to_string()));
        }

        for entry in &self.entries {
            for attempt in 1..=self.attempts_per_model {
                debug!(
                    backend = entry.backend.name(),
                    model = %entry.model,
                    attempt,
                    "Sending prompt"
                );

                match entry.backend.generate(&entry.model, prompt).await {
                    Ok(text) if !text.trim().is_empty() => {
                        info!(backend = entry.backend.name(), model = %entry.model, "Model responded");
                        return Ok(text.trim().to_string());
                    }
                    Ok(_) => {
                        warn!(model = %entry.model, attempt, "Model returned an empty response");
                    }
                    Err(e) => {
                        warn!(model = %entry.model, attempt, "Model call failed: {}", e);
                    }
                }
            }
        }

        Err(LlmError::ServiceUnavailable(RETRY_HINT.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Backend that answers from a closure and records every call.
    pub struct ScriptedBackend {
        pub calls: Mutex<Vec<(String, String)>>,
        respond: Box<dyn Fn(&str, &str) -> Result<String, LlmError> + Send + Sync>,
    }

    impl ScriptedBackend {
        pub fn new(
            respond: impl Fn(&str, &str) -> Result<String, LlmError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedBackend {
        async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), prompt.to_string()));
            (self.respond)(model, prompt)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Single-model pool over a scripted backend.
    pub fn pool_with(backend: Arc<ScriptedBackend>) -> Arc<ModelPool> {
        Arc::new(ModelPool::new(2).with_model(backend, "test-model"))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;

    fn pool_over(backend: &Arc<ScriptedBackend>, models: &[&str]) -> ModelPool {
        let mut pool = ModelPool::new(2);
        for model in models {
            pool.push(backend.clone(), *model);
        }
        pool
    }

    #[tokio::test]
    async fn falls_through_to_third_model() {
        let backend = ScriptedBackend::new(|model, _| match model {
            "third" => Ok("  SELECT 1;  ".to_string()),
            _ => Err(LlmError::ConnectionError("connection reset".to_string())),
        });
        let pool = pool_over(&backend, &["first", "second", "third"]);

        let text = pool.generate("prompt").await.unwrap();

        assert_eq!(text, "SELECT 1;");
        assert_eq!(backend.call_count(), 5);
        assert!(backend.call_count() <= 2 * 2 + 1);
    }

    #[tokio::test]
    async fn retries_same_model_before_moving_on() {
        let backend = ScriptedBackend::new({
            let failures = std::sync::atomic::AtomicUsize::new(0);
            move |_, _| {
                if failures.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    Err(LlmError::ResponseError("429".to_string()))
                } else {
                    Ok("ok".to_string())
                }
            }
        });
        let pool = pool_over(&backend, &["only", "spare"]);

        assert_eq!(pool.generate("prompt").await.unwrap(), "ok");
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(model, _)| model == "only"));
    }

    #[tokio::test]
    async fn exhausted_pool_is_service_unavailable() {
        let backend = ScriptedBackend::new(|_, _| {
            Err(LlmError::ConnectionError("timeout".to_string()))
        });
        let pool = pool_over(&backend, &["a", "b", "c"]);

        let err = pool.generate("prompt").await.unwrap_err();

        assert!(matches!(err, LlmError::ServiceUnavailable(_)));
        assert_eq!(err.to_string(), RETRY_HINT);
        assert_eq!(backend.call_count(), 6);
    }

    #[tokio::test]
    async fn blank_responses_count_as_failures() {
        let backend = ScriptedBackend::new(|model, _| match model {
            "blank" => Ok("   ".to_string()),
            _ => Ok("answer".to_string()),
        });
        let pool = pool_over(&backend, &["blank", "good"]);

        assert_eq!(pool.generate("prompt").await.unwrap(), "answer");
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn empty_prompt_is_refused_without_calls() {
        let backend = ScriptedBackend::new(|_, _| Ok("x".to_string()));
        let pool = pool_over(&backend, &["a"]);

        assert!(pool.generate("  ").await.is_err());
        assert_eq!(backend.call_count(), 0);
    }
}
