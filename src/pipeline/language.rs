use super::prompt::PromptBuilder;
use crate::llm::{LlmError, ModelPool};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedQuestion {
    /// English text handed to SQL generation.
    pub text: String,
    /// Set when the input was translated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_from: Option<String>,
    /// Detection or translation failed and the original text was kept.
    pub degraded: bool,
}

impl NormalizedQuestion {
    pub fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            translated_from: None,
            degraded: false,
        }
    }
}

/// Makes sure questions reach SQL generation in English.
pub struct LanguageNormalizer {
    pool: Arc<ModelPool>,
    prompts: Arc<PromptBuilder>,
}

impl LanguageNormalizer {
    pub fn new(pool: Arc<ModelPool>, prompts: Arc<PromptBuilder>) -> Self {
        Self { pool, prompts }
    }

    pub async fn is_english(&self, text: &str) -> Result<bool, LlmError> {
        let answer = self.pool.generate(&self.prompts.language_check(text)).await?;
        Ok(answer.to_uppercase().contains("YES"))
    }

    pub async fn translate(&self, text: &str) -> Result<String, LlmError> {
        self.pool.generate(&self.prompts.translation(text)).await
    }

    /// Never fails: any service error keeps the original text and marks the
    /// result as degraded.
    pub async fn normalize(&self, text: &str) -> NormalizedQuestion {
        match self.try_normalize(text).await {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!("Translation degraded, using original question: {}", e);
                NormalizedQuestion {
                    degraded: true,
                    ..NormalizedQuestion::unchanged(text)
                }
            }
        }
    }

    async fn try_normalize(&self, text: &str) -> Result<NormalizedQuestion, LlmError> {
        if self.is_english(text).await? {
            return Ok(NormalizedQuestion::unchanged(text));
        }

        let translated = self.translate(text).await?;
        info!("Translated question to English: {}", translated);
        Ok(NormalizedQuestion {
            text: translated,
            translated_from: Some(text.to_string()),
            degraded: false,
        })
    }
}
