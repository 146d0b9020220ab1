use crate::config::ProviderConfig;
use crate::llm::{LlmError, TextGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI-compatible chat completions endpoint.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl RemoteLlmProvider {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self, LlmError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            LlmError::ConfigError("API URL is required for remote LLM provider".to_string())
        })?;

        let api_key = config.resolve_api_key().ok_or_else(|| {
            LlmError::ConfigError("API key is required for remote LLM provider".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
        })
    }
}

#[async_trait]
impl TextGenerator for RemoteLlmProvider {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let request = PromptRequest {
            model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: 0.1,
            max_tokens: 2000,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ResponseError(format!(
                "API responded with status code: {}",
                response.status()
            )));
        }

        let prompt_response: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        prompt_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ResponseError("No choices in response".to_string()))
    }

    fn name(&self) -> &str {
        "remote"
    }
}
