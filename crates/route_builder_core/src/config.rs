//! Runtime configuration.
//!
//! # Responsibility
//! - Load settings from an optional TOML file.
//! - Apply environment overrides (`RMQ_*`, `ROUTE_BUILDER_*`).
//! - Validate broker settings before any connection attempt.
//!
//! # Invariants
//! - Environment values win over file values, file values win over defaults.
//! - `BrokerConfig::url_redacted` never contains the password.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_QUEUE: &str = "route-builder";
pub const DEFAULT_DB_PATH: &str = "route_builder.sqlite3";

/// Configuration loading/validation error.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    /// Environment variable holds a value of the wrong type.
    InvalidEnv { key: &'static str, value: String },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config {}: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config {}: {source}", path.display())
            }
            Self::InvalidEnv { key, value } => write!(f, "invalid value `{value}` for {key}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Message broker connection and build queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub prefetch_count: u16,
    /// Work queue consumed by the build worker.
    pub queue: String,
    pub url_query_params: String,
    pub reply_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            user: "guest".to_string(),
            password: "guest".to_string(),
            prefetch_count: 10,
            queue: DEFAULT_QUEUE.to_string(),
            url_query_params: String::new(),
            reply_timeout_secs: 30,
        }
    }
}

impl BrokerConfig {
    /// AMQP connection URL.
    pub fn url(&self) -> String {
        self.render_url(&self.password)
    }

    /// Same as [`BrokerConfig::url`] with the password masked.
    pub fn url_redacted(&self) -> String {
        self.render_url("***")
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.trim().is_empty() {
            return Err(ConfigError::Invalid("broker queue must not be empty".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("broker host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("broker port must be non-zero".to_string()));
        }
        if self.reply_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "reply timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    fn render_url(&self, password: &str) -> String {
        format!(
            "amqp://{}:{}@{}:{}/?{}",
            self.user, password, self.host, self.port, self.url_query_params
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Log directory; logging stays disabled when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub log: LogConfig,
    pub broker: BrokerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            log: LogConfig::default(),
            broker: BrokerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads `path` (when given), then applies process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = apply_env_overrides(config, |key| std::env::var(key).ok())?;
        config.broker.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Applies overrides read through `lookup`. Empty values are ignored except
/// for `RMQ_URL_QUERY_PARAMS`, where empty is meaningful.
pub fn apply_env_overrides(
    mut config: AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let text = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(value) = text("RMQ_HOST") {
        config.broker.host = value;
    }
    if let Some(value) = text("RMQ_PORT") {
        config.broker.port = parse_env("RMQ_PORT", value)?;
    }
    if let Some(value) = text("RMQ_USER") {
        config.broker.user = value;
    }
    if let Some(value) = lookup("RMQ_PASSWORD") {
        config.broker.password = value;
    }
    if let Some(value) = text("RMQ_PREFETCH_COUNT") {
        config.broker.prefetch_count = parse_env("RMQ_PREFETCH_COUNT", value)?;
    }
    if let Some(value) = text("RMQ_QUEUE") {
        config.broker.queue = value;
    }
    if let Some(value) = lookup("RMQ_URL_QUERY_PARAMS") {
        config.broker.url_query_params = value;
    }
    if let Some(value) = text("RMQ_REPLY_TIMEOUT_SECS") {
        config.broker.reply_timeout_secs = parse_env("RMQ_REPLY_TIMEOUT_SECS", value)?;
    }
    if let Some(value) = text("ROUTE_BUILDER_DB") {
        config.database_path = PathBuf::from(value);
    }
    if let Some(value) = text("ROUTE_BUILDER_LOG_LEVEL") {
        config.log.level = value;
    }
    if let Some(value) = text("ROUTE_BUILDER_LOG_DIR") {
        config.log.dir = Some(PathBuf::from(value));
    }
    Ok(config)
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}
