use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod db;
mod llm;
mod pipeline;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // API keys may live in a local .env file
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let args = CliArgs::parse();

    let config = AppConfig::new(&args).map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config.logging);
    if !dotenv_loaded {
        info!("No .env file found, using process environment");
    }

    if config.database.bootstrap {
        let path = std::path::Path::new(&config.database.path);
        if let Err(e) = db::bootstrap::ensure_schema(path) {
            error!("Failed to prepare database at {}: {}", path.display(), e);
            return Err(e);
        }
    } else if !std::path::Path::new(&config.database.path).exists() {
        warn!(
            "Database {} does not exist and bootstrap is disabled",
            config.database.path
        );
    }

    info!("Initializing model pool");
    let pool = llm::build_pool(&config.llm)?;
    info!("Model fallback order: {}", pool.models().join(", "));

    let web_config = config.web.clone();
    let app_state = Arc::new(AppState::new(config, Arc::new(pool))?);

    info!("Starting IntelliSQL server on {}:{}", web_config.host, web_config.port);
    match web::run_server(web_config, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
