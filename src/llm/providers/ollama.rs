use crate::config::ProviderConfig;
use crate::llm::{LlmError, TextGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Serialize, Debug)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self, LlmError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434/api/generate".to_string());

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self { client, api_url })
    }
}

#[async_trait]
impl TextGenerator for OllamaProvider {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        debug!("Sending request to Ollama with model: {}", model);

        let request = OllamaRequest {
            model,
            prompt,
            options: OllamaOptions { temperature: 0.1 },
            stream: false,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = match response.text().await {
                Ok(body) => format!(" - Response body: {}", body),
                Err(_) => String::new(),
            };

            error!("Ollama API responded with status code: {}{}", status, error_body);
            return Err(LlmError::ResponseError(format!(
                "Ollama API responded with status code: {}{}",
                status, error_body
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        debug!("Raw response from Ollama: {}", response_text);

        let ollama_response = serde_json::from_str::<OllamaResponse>(&response_text).map_err(|e| {
            error!("Failed to parse Ollama response: {} - Response was: {}", e, response_text);
            LlmError::ResponseError(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(ollama_response.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::stub;
    use axum::{Json, Router, routing::post};
    use serde_json::Value;

    fn config(api_url: String) -> ProviderConfig {
        ProviderConfig {
            backend: "ollama".to_string(),
            models: vec!["sqlcoder".to_string()],
            api_key: None,
            api_key_env: None,
            api_url: Some(api_url),
        }
    }

    #[tokio::test]
    async fn disables_streaming_and_reads_response_field() {
        let router = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                let reply = format!(
                    "{}|{}|{}",
                    body["model"].as_str().unwrap_or_default(),
                    body["stream"],
                    body["prompt"].as_str().unwrap_or_default()
                );
                Json(serde_json::json!({"model": "sqlcoder", "response": reply, "done": true}))
            }),
        );
        let base = stub::serve(router).await;

        let p = OllamaProvider::new(&config(format!("{}/api/generate", base)), Duration::from_secs(5))
            .unwrap();

        let text = p.generate("sqlcoder", "hi").await.unwrap();
        assert_eq!(text, "sqlcoder|false|hi");
    }

    #[tokio::test]
    async fn malformed_body_is_a_response_error() {
        let router = Router::new().route("/api/generate", post(|| async { "not json" }));
        let base = stub::serve(router).await;

        let p = OllamaProvider::new(&config(format!("{}/api/generate", base)), Duration::from_secs(5))
            .unwrap();

        let err = p.generate("sqlcoder", "hi").await.unwrap_err();
        assert!(matches!(err, LlmError::ResponseError(_)));
    }
}
