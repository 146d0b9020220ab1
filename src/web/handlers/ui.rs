use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use std::sync::Arc;

use crate::pipeline::prompt::example_questions;
use crate::web::state::AppState;
use crate::web::templates::render_template;

// Main UI entry point
pub async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let schema = state.pipeline.prompts().schema();

    Html(render_template(
        &state.template_env,
        "index.html",
        minijinja::context! {
            table => schema.table,
            columns => schema.columns,
            examples => example_questions().collect::<Vec<_>>(),
            version => env!("CARGO_PKG_VERSION"),
        },
    ))
}
