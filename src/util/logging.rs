use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes tracing/logging based on environment variables and the configured format.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false);

    match config.format.as_str() {
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }
}
