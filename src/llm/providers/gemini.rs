//! Google Gemini `generateContent` adapter.

use crate::config::ProviderConfig;
use crate::llm::{LlmError, TextGenerator};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self, LlmError> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            LlmError::ConfigError("API key is required for the Gemini provider".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    /// Accepts both `models/gemini-2.0-flash` and bare `gemini-2.0-flash`.
    fn endpoint(&self, model: &str) -> String {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        format!("{}/{}:generateContent", self.api_url, model)
    }

    fn parse_response(json: &Value) -> Result<String, LlmError> {
        let parts = json
            .pointer("/candidates/0/content/parts")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                LlmError::ResponseError("Missing candidates[0].content.parts".to_string())
            })?;

        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect();

        if text.trim().is_empty() {
            return Err(LlmError::ResponseError("Gemini returned no text".to_string()));
        }

        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiProvider {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}]
        });

        debug!("Sending request to Gemini model {}", model);

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!("Gemini responded with status code: {} - {}", status, error_body);
            return Err(LlmError::ResponseError(format!(
                "Gemini API responded with status code: {}",
                status
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        Self::parse_response(&json)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
