//! Configuration loading for the worker daemon and CLI.

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level settings, loaded from `config.toml` (if present) and
/// `ORCHESTRATOR__`-prefixed environment variables, in that precedence
/// order (env overrides file).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub worker: WorkerSettings,
    pub redis_url: Option<String>,
    pub observability: ObservabilitySettings,
}

/// Worker-loop tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSettings {
    pub poll_timeout_seconds: u64,
    pub default_retry_delay_seconds: u64,
    pub one_shot: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilitySettings {
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Settings {
    /// Load configuration from `config.toml` (if present), then the
    /// process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder()
            .set_default("worker.poll_timeout_seconds", 5)?
            .set_default("worker.default_retry_delay_seconds", 2)?
            .set_default("worker.one_shot", false)?
            .set_default("observability.log_level", "info")?
            .set_default("observability.log_format", "compact")?;

        if Path::new("config.toml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(
            Environment::with_prefix("ORCHESTRATOR")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        if settings.redis_url.is_none() {
            settings.redis_url = std::env::var("REDIS_URL").ok();
        }
        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worker: WorkerSettings {
                poll_timeout_seconds: 5,
                default_retry_delay_seconds: 2,
                one_shot: false,
            },
            redis_url: None,
            observability: ObservabilitySettings {
                log_level: "info".to_string(),
                log_format: LogFormat::Compact,
            },
        }
    }
}
