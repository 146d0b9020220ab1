use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::static_files::static_handler;
use super::state::AppState;

// UI Routes - web interface
pub fn ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::ui::index_handler))
        .route("/static/{*path}", get(static_handler))
}

// API Routes - REST API for programmatic access
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Question answering
            .route("/query", post(handlers::api::execute_query))
            .route("/chat", post(handlers::api::chat).get(handlers::api::get_chat))
            .route("/chat/reset", post(handlers::api::reset_chat))
            // Per-session history
            .route(
                "/history",
                get(handlers::api::get_history).delete(handlers::api::clear_history),
            )
            // AI assistance
            .route("/explain", post(handlers::api::explain_sql))
            .route("/optimize", post(handlers::api::optimize_sql))
            .route("/samples", get(handlers::api::sample_questions))
            // Schema and system status
            .route("/schema", get(handlers::api::get_schema))
            .route("/status", get(handlers::api::system_status)),
    )
}
