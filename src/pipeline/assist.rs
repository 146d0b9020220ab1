use super::prompt::PromptBuilder;
use crate::db::ResultSet;
use crate::llm::{LlmError, ModelPool};
use std::sync::Arc;

/// Rows handed to the model when asking for insights.
const INSIGHT_SAMPLE_ROWS: usize = 30;

/// Optional model-written commentary around a query. None of these affect
/// whether the query itself succeeds.
pub struct Assistant {
    pool: Arc<ModelPool>,
    prompts: Arc<PromptBuilder>,
}

impl Assistant {
    pub fn new(pool: Arc<ModelPool>, prompts: Arc<PromptBuilder>) -> Self {
        Self { pool, prompts }
    }

    pub async fn explain_sql(&self, sql: &str) -> Result<String, LlmError> {
        self.pool.generate(&self.prompts.explanation(sql)).await
    }

    pub async fn optimize_sql(&self, sql: &str) -> Result<String, LlmError> {
        self.pool.generate(&self.prompts.optimization(sql)).await
    }

    pub async fn insights(&self, result: &ResultSet) -> Result<String, LlmError> {
        if result.is_empty() {
            return Err(LlmError::ResponseError(
                "No rows to analyze".to_string(),
            ));
        }
        let table = result.to_text_table(INSIGHT_SAMPLE_ROWS);
        self.pool.generate(&self.prompts.insights(&table)).await
    }

    /// Up to eight suggested questions, numbering stripped.
    pub async fn sample_questions(&self) -> Result<Vec<String>, LlmError> {
        let text = self.pool.generate(&self.prompts.sample_questions()).await?;
        Ok(parse_numbered_list(&text))
    }
}

fn parse_numbered_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
            if rest.len() == line.len() {
                return None;
            }
            let rest = rest.trim_start_matches(['.', ')', ':']).trim();
            let rest = rest.trim_matches('*').trim();
            (!rest.is_empty()).then(|| rest.to_string())
        })
        .take(8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::pool::testing::{ScriptedBackend, pool_with};
    use crate::pipeline::schema::STUDENT_SCHEMA;

    fn assistant(backend: Arc<ScriptedBackend>) -> Assistant {
        Assistant::new(pool_with(backend), Arc::new(PromptBuilder::new(STUDENT_SCHEMA)))
    }

    #[tokio::test]
    async fn explanation_prompt_carries_sql() {
        let backend = ScriptedBackend::new(|_, prompt| {
            assert!(prompt.ends_with("SQL: SELECT COUNT(*) FROM STUDENT;"));
            Ok("It counts every student.".to_string())
        });

        let text = assistant(backend)
            .explain_sql("SELECT COUNT(*) FROM STUDENT;")
            .await
            .unwrap();

        assert_eq!(text, "It counts every student.");
    }

    #[tokio::test]
    async fn insights_sample_is_capped() {
        let backend = ScriptedBackend::new(|_, prompt| {
            Ok(format!("{}", prompt.matches("\nrow").count()))
        });
        let result = ResultSet {
            columns: vec!["NAME".to_string()],
            rows: (0..50).map(|i| vec![serde_json::json!(format!("row{}", i))]).collect(),
            execution_time_ms: 1,
        };

        let count = assistant(backend).insights(&result).await.unwrap();

        assert_eq!(count, "30");
    }

    #[tokio::test]
    async fn insights_on_empty_result_skip_the_model() {
        let backend = ScriptedBackend::new(|_, _| Ok("x".to_string()));
        let result = ResultSet {
            columns: vec!["NAME".to_string()],
            rows: vec![],
            execution_time_ms: 1,
        };

        assert!(assistant(backend.clone()).insights(&result).await.is_err());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn sample_questions_are_parsed() {
        let backend = ScriptedBackend::new(|_, _| {
            Ok("Here you go:\n1. Who scored highest?\n2) How many girls are in AIML?\n3. **Average marks per section**\n".to_string())
        });

        let questions = assistant(backend).sample_questions().await.unwrap();

        assert_eq!(
            questions,
            vec![
                "Who scored highest?",
                "How many girls are in AIML?",
                "Average marks per section",
            ]
        );
    }

    #[test]
    fn list_parser_caps_at_eight() {
        let text = (1..=12).map(|i| format!("{}. q{}", i, i)).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_numbered_list(&text).len(), 8);
    }
}
