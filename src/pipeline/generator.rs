use super::context::ConversationTurn;
use super::prompt::PromptBuilder;
use crate::llm::{LlmError, ModelPool};
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Turns a question into one `;`-terminated SQL string via the model pool.
pub struct SqlGenerator {
    pool: Arc<ModelPool>,
    prompts: Arc<PromptBuilder>,
    fence: Regex,
    label: Regex,
}

impl SqlGenerator {
    pub fn new(pool: Arc<ModelPool>, prompts: Arc<PromptBuilder>) -> Result<Self, regex::Error> {
        Ok(Self {
            pool,
            prompts,
            // ```sql, ```SQL, ``` sql and bare ``` fences
            fence: Regex::new(r"(?i)```[ \t]*sql\b|```")?,
            // a leading "sql" label left on its own line, or an "SQL:" prefix
            label: Regex::new(r"(?i)\Asql(?:[ \t]*\n|:)")?,
        })
    }

    pub async fn generate_sql(&self, question: &str) -> Result<String, LlmError> {
        self.generate_with_history(question, None).await
    }

    pub async fn generate_with_history(
        &self,
        question: &str,
        history: Option<&[ConversationTurn]>,
    ) -> Result<String, LlmError> {
        let prompt = self.prompts.build(question, history);
        debug!("SQL prompt:\n{}", prompt);

        let raw = self.pool.generate(&prompt).await?;
        debug!("Raw model output: {}", raw);

        let sql = self.clean(&raw);
        if sql == ";" {
            return Err(LlmError::ResponseError(
                "Model returned no SQL statement".to_string(),
            ));
        }

        Ok(sql)
    }

    /// Strips fences and labels, trims, and leaves exactly one trailing `;`.
    pub fn clean(&self, raw: &str) -> String {
        let unfenced = self.fence.replace_all(raw, "");
        let trimmed = unfenced.trim();
        let unlabelled = self.label.replace(trimmed, "");
        let body = unlabelled.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        format!("{};", body)
    }
}
