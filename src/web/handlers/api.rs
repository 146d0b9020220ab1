use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::db::bootstrap::LiveColumn;
use crate::llm::LlmError;
use crate::pipeline::context::{ConversationTurn, HistoryEntry, ResultRef};
use crate::pipeline::schema::ColumnDescriptor;
use crate::pipeline::{PipelineError, QueryOutcome};
use crate::web::session::{Session, SESSION_HEADER};
use crate::web::state::AppState;

// Errors

/// JSON error reply: `{kind, message, sql?}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    sql: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sql: Option<&'a str>,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.to_string(),
            sql: None,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let status = match &e {
            PipelineError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::UnsafeStatementRejected { .. } => StatusCode::FORBIDDEN,
            PipelineError::QueryExecution { .. } => StatusCode::BAD_REQUEST,
            PipelineError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            kind: e.kind(),
            message: e.to_string(),
            sql: e.sql().map(str::to_string),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        PipelineError::from(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            kind: self.kind,
            message: &self.message,
            sql: self.sql.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

// Sessions

/// The caller's session, resolved from the `x-session-id` header.
pub struct SessionHandle {
    pub id: String,
    pub session: Arc<Mutex<Session>>,
}

impl SessionHandle {
    /// Attaches the session id to any reply so clients can keep it.
    fn respond(&self, body: impl IntoResponse) -> Response {
        ([(SESSION_HEADER, self.id.clone())], body).into_response()
    }
}

impl FromRequestParts<Arc<AppState>> for SessionHandle {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let requested = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok());
        let (id, session) = state.sessions.checkout(requested).await;
        Ok(Self { id, session })
    }
}

// Query types

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub explain: bool,
    #[serde(default)]
    pub optimize: bool,
    #[serde(default)]
    pub insights: bool,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_from: Option<String>,
    pub translation_degraded: bool,
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<String>,
    /// Assistance that was requested but failed, by feature name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub assist_errors: BTreeMap<&'static str, String>,
}

impl From<QueryOutcome> for QueryResponse {
    fn from(outcome: QueryOutcome) -> Self {
        Self {
            question: outcome.question.text,
            translated_from: outcome.question.translated_from,
            translation_degraded: outcome.question.degraded,
            sql: outcome.sql,
            row_count: outcome.result.row_count(),
            columns: outcome.result.columns,
            rows: outcome.result.rows,
            execution_time_ms: outcome.result.execution_time_ms,
            explanation: None,
            optimization: None,
            insights: None,
            assist_errors: BTreeMap::new(),
        }
    }
}

impl QueryResponse {
    fn attach(&mut self, feature: &'static str, result: Option<Result<String, LlmError>>) {
        let text = match result {
            None => return,
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                warn!("{} assistance failed: {}", feature, e);
                self.assist_errors.insert(feature, e.to_string());
                return;
            }
        };
        match feature {
            "explanation" => self.explanation = Some(text),
            "optimization" => self.optimization = Some(text),
            _ => self.insights = Some(text),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(flatten)]
    pub result: QueryResponse,
    pub turns: usize,
}

#[derive(Debug, Serialize)]
pub struct ChatTranscript {
    pub turns: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntry>,
    pub total: usize,
}

// Assistance types

#[derive(Debug, Deserialize)]
pub struct SqlRequest {
    pub sql: String,
}

#[derive(Debug, Serialize)]
pub struct AssistResponse {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SamplesResponse {
    pub questions: Vec<String>,
}

// Schema and status

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub table: &'static str,
    pub columns: &'static [ColumnDescriptor],
    pub live_columns: Option<Vec<LiveColumn>>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub active_sessions: usize,
    pub models: Vec<String>,
    pub read_only: bool,
    pub translate: bool,
}

// API Implementations

async fn optional<F>(wanted: bool, task: F) -> Option<Result<String, LlmError>>
where
    F: Future<Output = Result<String, LlmError>>,
{
    if wanted { Some(task.await) } else { None }
}

// Single-shot question
pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
    Json(payload): Json<QueryRequest>,
) -> Response {
    let result = run_query(&state, &session, payload).await;
    session.respond(result)
}

async fn run_query(
    state: &AppState,
    session: &SessionHandle,
    payload: QueryRequest,
) -> Result<Json<QueryResponse>, ApiError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(ApiError::bad_request("Question must not be empty"));
    }
    info!("NL-query: {}", question);

    let outcome = state.pipeline.ask(question, None).await?;
    session
        .session
        .lock()
        .await
        .history
        .record(question, &outcome.sql, outcome.result.row_count());

    let assistant = &state.assistant;
    let (explanation, optimization, insights) = tokio::join!(
        optional(payload.explain, assistant.explain_sql(&outcome.sql)),
        optional(payload.optimize, assistant.optimize_sql(&outcome.sql)),
        optional(payload.insights, assistant.insights(&outcome.result)),
    );

    let mut response = QueryResponse::from(outcome);
    response.attach("explanation", explanation);
    response.attach("optimization", optimization);
    response.attach("insights", insights);

    Ok(Json(response))
}

// Conversation
pub async fn chat(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
    Json(payload): Json<ChatRequest>,
) -> Response {
    let result = run_chat(&state, &session, payload).await;
    session.respond(result)
}

async fn run_chat(
    state: &AppState,
    session: &SessionHandle,
    payload: ChatRequest,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(ApiError::bad_request("Message must not be empty"));
    }

    let prior = {
        let mut guard = session.session.lock().await;
        let prior = guard
            .conversation
            .recent(state.config.pipeline.conversation_window)
            .to_vec();
        guard.conversation.append(ConversationTurn::user(message));
        prior
    };
    debug!("Chat turn with {} prior turn(s)", prior.len());

    let outcome = state.pipeline.ask(message, Some(prior.as_slice())).await;

    let mut guard = session.session.lock().await;
    match outcome {
        Ok(outcome) => {
            let row_count = outcome.result.row_count();
            guard.conversation.append(ConversationTurn::assistant(
                format!("SQL: {}", outcome.sql),
                Some(ResultRef {
                    columns: outcome.result.columns.clone(),
                    row_count,
                }),
            ));
            guard.history.record(message, &outcome.sql, row_count);

            Ok(Json(ChatResponse {
                turns: guard.conversation.len(),
                result: QueryResponse::from(outcome),
            }))
        }
        Err(e) => {
            guard
                .conversation
                .append(ConversationTurn::assistant(format!("Error: {}", e), None));
            Err(e.into())
        }
    }
}

pub async fn get_chat(session: SessionHandle) -> Response {
    let turns = session.session.lock().await.conversation.turns().to_vec();
    session.respond(Json(ChatTranscript { turns }))
}

pub async fn reset_chat(session: SessionHandle) -> Response {
    session.session.lock().await.conversation.reset();
    info!("Conversation reset for session {}", session.id);
    session.respond(StatusCode::NO_CONTENT)
}

// History
pub async fn get_history(State(state): State<Arc<AppState>>, session: SessionHandle) -> Response {
    let (entries, total) = {
        let guard = session.session.lock().await;
        (
            guard.history.latest(state.config.pipeline.history_display),
            guard.history.len(),
        )
    };
    session.respond(Json(HistoryResponse { entries, total }))
}

pub async fn clear_history(session: SessionHandle) -> Response {
    session.session.lock().await.history.clear();
    session.respond(StatusCode::NO_CONTENT)
}

// Assistance
pub async fn explain_sql(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SqlRequest>,
) -> Result<Json<AssistResponse>, ApiError> {
    let sql = payload.sql.trim();
    if sql.is_empty() {
        return Err(ApiError::bad_request("SQL must not be empty"));
    }
    let text = state.assistant.explain_sql(sql).await?;
    Ok(Json(AssistResponse { text }))
}

pub async fn optimize_sql(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SqlRequest>,
) -> Result<Json<AssistResponse>, ApiError> {
    let sql = payload.sql.trim();
    if sql.is_empty() {
        return Err(ApiError::bad_request("SQL must not be empty"));
    }
    let text = state.assistant.optimize_sql(sql).await?;
    Ok(Json(AssistResponse { text }))
}

pub async fn sample_questions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SamplesResponse>, ApiError> {
    let questions = state.assistant.sample_questions().await?;
    Ok(Json(SamplesResponse { questions }))
}

// Schema
pub async fn get_schema(State(state): State<Arc<AppState>>) -> Json<SchemaResponse> {
    let schema = state.pipeline.prompts().schema();

    let live_columns = match state.pipeline.executor().describe_table(schema.table).await {
        Ok(columns) => Some(columns),
        Err(e) => {
            warn!("Could not read live columns for {}: {}", schema.table, e);
            None
        }
    };

    Json(SchemaResponse {
        table: schema.table,
        columns: schema.columns,
        live_columns,
    })
}

// System status
pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        active_sessions: state.sessions.len().await,
        models: state.pool.models(),
        read_only: state.config.database.read_only,
        translate: state.config.pipeline.translate,
    })
}

#[cfg(test)]
mod tests {
    use crate::config::AppConfig;
    use crate::llm::pool::testing::{pool_with, ScriptedBackend};
    use crate::llm::LlmError;
    use crate::pipeline::testing::{answering, seeded_db};
    use crate::web::router;
    use crate::web::session::SESSION_HEADER;
    use crate::web::state::AppState;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(backend: Arc<ScriptedBackend>) -> (tempfile::TempDir, Router) {
        let (dir, db) = seeded_db();
        let mut config = AppConfig::default();
        config.database.path = db.to_string_lossy().to_string();

        let state = AppState::new(config, pool_with(backend)).unwrap();
        (dir, router(Arc::new(state)))
    }

    fn post(uri: &str, session: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(id) = session {
            builder = builder.header(SESSION_HEADER, id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(id) = session {
            builder = builder.header(SESSION_HEADER, id);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn query_returns_rows_and_records_history() {
        let (_dir, app) = app(answering("SELECT COUNT(*) FROM STUDENT"));

        let response = app
            .clone()
            .oneshot(post("/api/query", Some("s1"), json!({ "question": "How many students?" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SESSION_HEADER], "s1");
        let body = json_body(response).await;
        assert_eq!(body["sql"], "SELECT COUNT(*) FROM STUDENT;");
        assert_eq!(body["row_count"], 1);
        assert_eq!(body["rows"][0][0], 3);
        assert!(body.get("explanation").is_none());

        let history = app
            .clone()
            .oneshot(get("/api/history", Some("s1")))
            .await
            .unwrap();
        let body = json_body(history).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["entries"][0]["question"], "How many students?");
    }

    #[tokio::test]
    async fn new_callers_get_a_session_id() {
        let (_dir, app) = app(answering("SELECT 1;"));

        let response = app.oneshot(get("/api/history", None)).await.unwrap();

        let id = response.headers()[SESSION_HEADER].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn unsafe_statements_are_forbidden() {
        let (_dir, app) = app(answering("DELETE FROM STUDENT;"));

        let response = app
            .clone()
            .oneshot(post("/api/query", None, json!({ "question": "remove everyone" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["kind"], "unsafe_statement");
        assert_eq!(body["sql"], "DELETE FROM STUDENT;");

        let history = json_body(app.oneshot(get("/api/history", None)).await.unwrap()).await;
        assert_eq!(history["total"], 0);
    }

    #[tokio::test]
    async fn execution_errors_are_bad_requests() {
        let (_dir, app) = app(answering("SELECT * FROM NOWHERE;"));

        let response = app
            .oneshot(post("/api/query", None, json!({ "question": "?" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["kind"], "query_execution");
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let backend = answering("SELECT 1;");
        let (_dir, app) = app(backend.clone());

        let response = app
            .oneshot(post("/api/query", None, json!({ "question": "   " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn exhausted_models_are_unavailable() {
        let (_dir, app) = app(ScriptedBackend::new(|_, _| {
            Err(LlmError::ConnectionError("down".to_string()))
        }));

        let response = app
            .oneshot(post("/api/query", None, json!({ "question": "How many students?" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["kind"], "service_unavailable");
        assert_eq!(body["message"], crate::llm::RETRY_HINT);
    }

    #[tokio::test]
    async fn requested_assistance_is_attached() {
        let backend = ScriptedBackend::new(|_, prompt| {
            if prompt.contains("YES or NO") {
                Ok("YES".to_string())
            } else if prompt.starts_with("Explain this SQL") {
                Ok("Counts students.".to_string())
            } else if prompt.starts_with("Analyze") {
                Err(LlmError::ResponseError("nope".to_string()))
            } else {
                Ok("SELECT COUNT(*) FROM STUDENT;".to_string())
            }
        });
        let (_dir, app) = app(backend);

        let response = app
            .oneshot(post(
                "/api/query",
                None,
                json!({ "question": "How many students?", "explain": true, "insights": true }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["explanation"], "Counts students.");
        assert!(body.get("optimization").is_none());
        assert!(body["assist_errors"]["insights"].is_string());
    }

    #[tokio::test]
    async fn chat_keeps_a_transcript_until_reset() {
        let (_dir, app) = app(answering("SELECT * FROM STUDENT WHERE CLASS='CSE';"));

        for message in ["CSE students", "only section A"] {
            let response = app
                .clone()
                .oneshot(post("/api/chat", Some("chat-1"), json!({ "message": message })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let transcript = json_body(
            app.clone()
                .oneshot(get("/api/chat", Some("chat-1")))
                .await
                .unwrap(),
        )
        .await;
        let turns = transcript["turns"].as_array().unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0]["role"], "user");
        assert_eq!(turns[1]["result"]["row_count"], 2);

        let reset = app
            .clone()
            .oneshot(post("/api/chat/reset", Some("chat-1"), json!({})))
            .await
            .unwrap();
        assert_eq!(reset.status(), StatusCode::NO_CONTENT);

        let transcript = json_body(app.oneshot(get("/api/chat", Some("chat-1"))).await.unwrap()).await;
        assert!(transcript["turns"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn explain_endpoint_validates_input() {
        let (_dir, app) = app(answering("It lists students."));

        let empty = app
            .clone()
            .oneshot(post("/api/explain", None, json!({ "sql": "" })))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post("/api/explain", None, json!({ "sql": "SELECT * FROM STUDENT;" })))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["text"], "It lists students.");
    }

    #[tokio::test]
    async fn schema_reports_live_columns() {
        let (_dir, app) = app(answering("SELECT 1;"));

        let body = json_body(app.oneshot(get("/api/schema", None)).await.unwrap()).await;

        assert_eq!(body["table"], "STUDENT");
        assert_eq!(body["columns"].as_array().unwrap().len(), 5);
        assert_eq!(body["live_columns"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn status_lists_models() {
        let (_dir, app) = app(answering("SELECT 1;"));

        let body = json_body(app.oneshot(get("/api/status", None)).await.unwrap()).await;

        assert_eq!(body["models"], json!(["scripted:test-model"]));
        assert_eq!(body["read_only"], true);
    }

    #[tokio::test]
    async fn index_page_lists_examples() {
        let (_dir, app) = app(answering("SELECT 1;"));

        let response = app.oneshot(get("/", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8_lossy(&bytes);
        assert!(html.contains("How many students?"));
        assert!(html.contains("CSE-AIML"));
    }
}
