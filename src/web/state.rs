use crate::config::AppConfig;
use crate::db::QueryExecutor;
use crate::llm::ModelPool;
use crate::pipeline::assist::Assistant;
use crate::pipeline::prompt::PromptBuilder;
use crate::pipeline::safety::SafetyGate;
use crate::pipeline::schema::STUDENT_SCHEMA;
use crate::pipeline::Pipeline;
use crate::web::session::SessionStore;
use crate::web::templates;
use minijinja::Environment;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub pool: Arc<ModelPool>,
    pub pipeline: Pipeline,
    pub assistant: Assistant,
    pub sessions: SessionStore,
    pub template_env: Environment<'static>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        pool: Arc<ModelPool>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let prompts = Arc::new(PromptBuilder::new(STUDENT_SCHEMA));

        let gate = SafetyGate::with_extra(&config.safety.extra_keywords)?;
        info!("Safety gate denylist: {}", gate.keywords().join(", "));

        let executor = QueryExecutor::new(&config.database.path, config.database.read_only);
        let pipeline = Pipeline::new(
            Arc::clone(&pool),
            Arc::clone(&prompts),
            gate,
            executor,
            &config.pipeline,
        )?;
        let assistant = Assistant::new(Arc::clone(&pool), prompts);

        let sessions = SessionStore::new(
            Duration::from_secs(config.pipeline.session_idle_secs),
            config.pipeline.history_limit,
        );

        Ok(Self {
            template_env: templates::init_templates()?,
            config,
            pool,
            pipeline,
            assistant,
            sessions,
            startup_time: chrono::Utc::now(),
        })
    }
}
