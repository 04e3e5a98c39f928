use crate::proxy::types::{DEFAULT_MAX_REQUEST_SIZE, DEFAULT_REQUEST_TIMEOUT_SECS};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

pub use config::ConfigError;

/// Prefix for environment overrides, e.g. `AUDIT_GATEWAY__UPSTREAM__URL`
pub const ENV_PREFIX: &str = "AUDIT_GATEWAY";

pub const DEFAULT_TELEMETRY_BASE_URL: &str = "https://api.eu-central-1.aws.tinybird.co";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub upstream: UpstreamSettings,
    pub telemetry: TelemetrySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("audit.db"),
            max_connections: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSettings {
    #[serde(default)]
    pub url: Option<String>,
    pub request_timeout_secs: u64,
    pub max_request_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub token: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl TelemetrySettings {
    /// Configured token, ignoring blank values
    pub fn token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl LoggingSettings {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Self::defaults(&environment)?
            // Add configuration file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Built-in defaults every other source layers on top of
    pub fn defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let database = DatabaseSettings::default();

        Config::builder()
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8080)?
            .set_default("application.environment", environment)?
            .set_default("database.path", database.path.to_string_lossy().into_owned())?
            .set_default("database.max_connections", database.max_connections)?
            .set_default("database.busy_timeout_ms", database.busy_timeout_ms)?
            .set_default("upstream.request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS)?
            .set_default("upstream.max_request_size", DEFAULT_MAX_REQUEST_SIZE as u64)?
            .set_default("telemetry.base_url", DEFAULT_TELEMETRY_BASE_URL)?
            .set_default("telemetry.timeout_secs", 5)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }
}
