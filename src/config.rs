use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    /// Open query connections in read-only mode
    pub read_only: bool,
    /// Create the STUDENT table at startup if it is missing
    pub bootstrap: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub backend: String, // "gemini", "remote", or "ollama"
    pub models: Vec<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Name of an environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
}

impl ProviderConfig {
    /// Explicit key wins over the environment lookup.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok())
                .filter(|key| !key.trim().is_empty())
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub attempts_per_model: usize,
    pub request_timeout_secs: u64,
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub translate: bool,
    pub timeout_secs: u64,
    pub conversation_window: usize,
    pub history_limit: usize,
    pub history_display: usize,
    pub session_idle_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SafetyConfig {
    pub extra_keywords: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: String, // "pretty" or "json"
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub safety: SafetyConfig,
    pub logging: LoggingConfig,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to the DuckDB database file
    #[arg(long)]
    pub database: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/intellisql/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // INTELLISQL__WEB__PORT=8080 style overrides
        config_builder = config_builder.add_source(
            Environment::with_prefix("INTELLISQL")
                .prefix_separator("__")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(database) = &args.database {
            config.database.path = database.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.providers.iter().all(|p| p.models.is_empty()) {
            return Err(ConfigError::Message(
                "at least one LLM model must be configured".to_string(),
            ));
        }
        if self.llm.attempts_per_model == 0 {
            return Err(ConfigError::Message(
                "llm.attempts_per_model must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "student.duckdb".to_string(),
            read_only: true,
            bootstrap: true,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            attempts_per_model: 2,
            request_timeout_secs: 30,
            providers: vec![ProviderConfig {
                backend: "gemini".to_string(),
                models: [
                    "models/gemini-2.0-flash-lite",
                    "models/gemini-2.0-flash-lite-001",
                    "models/gemini-2.0-flash-001",
                    "models/gemini-2.0-flash",
                    "models/gemini-flash-lite-latest",
                    "models/gemini-flash-latest",
                ]
                .iter()
                .map(|m| m.to_string())
                .collect(),
                api_key: None,
                api_key_env: Some("GOOGLE_API_KEY".to_string()),
                api_url: None,
            }],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            translate: true,
            timeout_secs: 120,
            conversation_window: 8,
            history_limit: 50,
            history_display: 5,
            session_idle_secs: 60 * 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_model_pool() {
        let config = AppConfig::default();
        assert_eq!(config.llm.attempts_per_model, 2);
        assert_eq!(config.llm.providers.len(), 1);
        assert_eq!(config.llm.providers[0].models.len(), 6);
        assert_eq!(config.pipeline.conversation_window, 8);
        assert!(config.database.read_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[web]
port = 8088

[database]
path = "other.duckdb"

[[llm.providers]]
backend = "ollama"
models = ["sqlcoder"]
"#,
        )
        .unwrap();

        let args = CliArgs {
            config: Some(path),
            host: Some("0.0.0.0".to_string()),
            ..Default::default()
        };
        let config = AppConfig::new(&args).unwrap();

        assert_eq!(config.web.port, 8088);
        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.database.path, "other.duckdb");
        assert_eq!(config.llm.providers[0].backend, "ollama");
        assert_eq!(config.llm.attempts_per_model, 2);
        assert_eq!(config.pipeline.history_display, 5);
    }

    #[test]
    fn empty_model_list_is_rejected() {
        let mut config = AppConfig::default();
        config.llm.providers[0].models.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_api_key_wins() {
        let provider = ProviderConfig {
            backend: "remote".to_string(),
            models: vec!["gpt-4o-mini".to_string()],
            api_key: Some("inline".to_string()),
            api_key_env: Some("INTELLISQL_TEST_UNSET_KEY".to_string()),
            api_url: None,
        };
        assert_eq!(provider.resolve_api_key().as_deref(), Some("inline"));
    }
}
