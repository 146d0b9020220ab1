//! Natural language to SQL: normalize, generate, gate, execute.

pub mod assist;
pub mod context;
pub mod generator;
pub mod language;
pub mod prompt;
pub mod safety;
pub mod schema;

use crate::config::PipelineConfig;
use crate::db::{QueryExecutionError, QueryExecutor, ResultSet};
use crate::llm::{LlmError, ModelPool};
use context::ConversationTurn;
use generator::SqlGenerator;
use language::{LanguageNormalizer, NormalizedQuestion};
use prompt::PromptBuilder;
use safety::SafetyGate;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug)]
pub enum PipelineError {
    /// Every model in the pool failed.
    ServiceUnavailable(String),
    /// The safety gate vetoed the generated statement.
    UnsafeStatementRejected { sql: String, keyword: String },
    /// The store rejected the statement.
    QueryExecution { sql: String, message: String },
    /// The overall budget ran out.
    TimedOut(Duration),
    Internal(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::ServiceUnavailable(msg) => write!(f, "{}", msg),
            PipelineError::UnsafeStatementRejected { keyword, .. } => write!(
                f,
                "Blocked: dangerous SQL operation detected ({}). Query rejected for safety.",
                keyword
            ),
            PipelineError::QueryExecution { message, .. } => write!(f, "DB error: {}", message),
            PipelineError::TimedOut(budget) => {
                write!(f, "Request took longer than {}s. Try again.", budget.as_secs())
            }
            PipelineError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl Error for PipelineError {}

impl PipelineError {
    /// Stable machine-readable label.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ServiceUnavailable(_) => "service_unavailable",
            PipelineError::UnsafeStatementRejected { .. } => "unsafe_statement",
            PipelineError::QueryExecution { .. } => "query_execution",
            PipelineError::TimedOut(_) => "timeout",
            PipelineError::Internal(_) => "internal",
        }
    }

    /// The SQL the model produced, when the failure happened after generation.
    pub fn sql(&self) -> Option<&str> {
        match self {
            PipelineError::UnsafeStatementRejected { sql, .. }
            | PipelineError::QueryExecution { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

impl From<LlmError> for PipelineError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::ServiceUnavailable(msg) => PipelineError::ServiceUnavailable(msg),
            other => PipelineError::ServiceUnavailable(other.to_string()),
        }
    }
}

/// Everything one successful question produced.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub question: NormalizedQuestion,
    pub sql: String,
    pub result: ResultSet,
}

pub struct Pipeline {
    prompts: Arc<PromptBuilder>,
    normalizer: LanguageNormalizer,
    generator: SqlGenerator,
    gate: SafetyGate,
    executor: QueryExecutor,
    translate: bool,
    budget: Duration,
}

impl Pipeline {
    pub fn new(
        pool: Arc<ModelPool>,
        prompts: Arc<PromptBuilder>,
        gate: SafetyGate,
        executor: QueryExecutor,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let generator = SqlGenerator::new(Arc::clone(&pool), Arc::clone(&prompts))
            .map_err(|e| PipelineError::Internal(e.to_string()))?;

        Ok(Self {
            normalizer: LanguageNormalizer::new(pool, Arc::clone(&prompts)),
            prompts,
            generator,
            gate,
            executor,
            translate: config.translate,
            budget: Duration::from_secs(config.timeout_secs.max(1)),
        })
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn gate(&self) -> &SafetyGate {
        &self.gate
    }

    /// Runs the whole pipeline under the configured wall-clock budget.
    pub async fn ask(
        &self,
        question: &str,
        history: Option<&[ConversationTurn]>,
    ) -> Result<QueryOutcome, PipelineError> {
        tokio::time::timeout(self.budget, self.run(question, history))
            .await
            .map_err(|_| {
                warn!("Pipeline exceeded its {:?} budget", self.budget);
                PipelineError::TimedOut(self.budget)
            })?
    }

    async fn run(
        &self,
        question: &str,
        history: Option<&[ConversationTurn]>,
    ) -> Result<QueryOutcome, PipelineError> {
        let normalized = if self.translate {
            self.normalizer.normalize(question).await
        } else {
            NormalizedQuestion::unchanged(question)
        };

        let sql = self
            .generator
            .generate_with_history(&normalized.text, history)
            .await?;
        info!("Generated SQL: {}", sql);

        let verdict = self.gate.check(&sql);
        if !verdict.safe {
            let keyword = verdict.keyword.unwrap_or_default();
            warn!("Blocked generated SQL containing {}: {}", keyword, sql);
            return Err(PipelineError::UnsafeStatementRejected { sql, keyword });
        }

        let result = self
            .executor
            .execute(&sql)
            .await
            .map_err(|QueryExecutionError(message)| PipelineError::QueryExecution {
                sql: sql.clone(),
                message,
            })?;

        Ok(QueryOutcome {
            question: normalized,
            sql,
            result,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::db::bootstrap;
    use crate::llm::pool::testing::{ScriptedBackend, pool_with};
    use schema::STUDENT_SCHEMA;
    use std::path::{Path, PathBuf};

    /// Temp DuckDB file with the STUDENT table and a handful of rows.
    pub fn seeded_db() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("student.duckdb");
        bootstrap::ensure_schema(&path).unwrap();

        let conn = duckdb::Connection::open(&path).unwrap();
        conn.execute_batch(
            "INSERT INTO STUDENT VALUES ('Aarav', 'CSE', 'A', 'Male', 91);
             INSERT INTO STUDENT VALUES ('Diya', 'AIML', 'B', 'Female', 78);
             INSERT INTO STUDENT VALUES ('Meera', 'CSE', 'A', 'Female', 66);",
        )
        .unwrap();
        drop(conn);

        (dir, path)
    }

    pub fn pipeline(backend: Arc<ScriptedBackend>, db: &Path, config: &PipelineConfig) -> Pipeline {
        Pipeline::new(
            pool_with(backend),
            Arc::new(PromptBuilder::new(STUDENT_SCHEMA)),
            SafetyGate::with_extra(&[]).unwrap(),
            QueryExecutor::new(db, true),
            config,
        )
        .unwrap()
    }

    /// Says YES to language checks and `sql` to everything else.
    pub fn answering(sql: &'static str) -> Arc<ScriptedBackend> {
        ScriptedBackend::new(move |_, prompt| {
            if prompt.contains("YES or NO") {
                Ok("YES".to_string())
            } else {
                Ok(sql.to_string())
            }
        })
    }
}
