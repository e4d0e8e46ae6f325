//! Configuration loading and management.
//!
//! Loads broker configuration from `./config.toml` (or `$EXECBROKER_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level broker configuration loaded from TOML.
///
/// Path: `./config.toml` or `$EXECBROKER_CONFIG_PATH`.
/// Env vars override file values; file values override defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Task queue (scheduler) settings.
    pub task_queue: TaskQueueConfig,
    /// Webhook delivery settings.
    pub webhook: WebhookConfig,
    /// Aggregate statistics rollup settings.
    pub statistics: StatisticsConfig,
    /// Rate limiting middleware settings.
    pub rate_limit: RateLimitConfig,
    /// Server bind address and port.
    pub server: ServerConfig,
    /// Retention period, in days, for terminal task records.
    pub task_retention_days: i64,
    /// Retention period, in days, for inactive sessions.
    pub session_retention_days: i64,
    /// Directory holding `tasks.json`, `sessions.json`, `statistics.json`.
    pub data_dir: PathBuf,
    /// Executor tool binary to invoke (resolved through `$PATH` unless
    /// absolute).
    pub executor_binary: String,
    /// Default model passed to the executor when a request omits one.
    pub default_model: String,
    /// Default working directory for the executor when a request omits
    /// `project_path`.
    pub default_project_path: String,
    /// Log file path, if file logging is enabled (see [`crate::logging`]).
    pub log_file: Option<PathBuf>,
    /// Tracing log level filter.
    pub log_level: String,
    /// Optional PID file written on startup.
    pub pid_file: Option<PathBuf>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            task_queue: TaskQueueConfig::default(),
            webhook: WebhookConfig::default(),
            statistics: StatisticsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            server: ServerConfig::default(),
            task_retention_days: 30,
            session_retention_days: 30,
            data_dir: PathBuf::from("./data"),
            executor_binary: "claude".to_string(),
            default_model: "claude-sonnet-4-5".to_string(),
            default_project_path: ".".to_string(),
            log_file: None,
            log_level: "info".to_string(),
            pid_file: None,
        }
    }
}

impl BrokerConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$EXECBROKER_CONFIG_PATH` or `./config.toml`.
    /// If the file does not exist, returns defaults (backward compatible).
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file only, no env overrides.
    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok())?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: BrokerConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(BrokerConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
        if let Some(p) = env("EXECBROKER_CONFIG_PATH") {
            return Ok(PathBuf::from(p));
        }
        Ok(PathBuf::from("config.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids unsafe `set_var` in
    /// tests).
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("EXECBROKER_CONCURRENCY") {
            match v.parse() {
                Ok(n) => self.task_queue.concurrency = n,
                Err(_) => warn_invalid("EXECBROKER_CONCURRENCY", &v),
            }
        }
        if let Some(v) = env("EXECBROKER_TASK_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.task_queue.default_timeout_secs = n,
                Err(_) => warn_invalid("EXECBROKER_TASK_TIMEOUT_SECS", &v),
            }
        }
        if let Some(v) = env("EXECBROKER_WEBHOOK_URL") {
            self.webhook.default_url = Some(v);
        }
        if let Some(v) = env("EXECBROKER_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env("EXECBROKER_EXECUTOR_BINARY") {
            self.executor_binary = v;
        }
        if let Some(v) = env("EXECBROKER_DEFAULT_MODEL") {
            self.default_model = v;
        }
        if let Some(v) = env("EXECBROKER_DEFAULT_PROJECT_PATH") {
            self.default_project_path = v;
        }
        if let Some(v) = env("EXECBROKER_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = env("EXECBROKER_LOG_FILE") {
            self.log_file = Some(PathBuf::from(v));
        }
        if let Some(v) = env("EXECBROKER_PID_FILE") {
            self.pid_file = Some(PathBuf::from(v));
        }
        if let Some(v) = env("EXECBROKER_PORT") {
            match v.parse() {
                Ok(n) => self.server.port = n,
                Err(_) => warn_invalid("EXECBROKER_PORT", &v),
            }
        }
    }

    /// Reject configuration values that would make the broker unable to run
    /// correctly (rather than failing confusingly deep inside the
    /// scheduler).
    fn validate(&self) -> Result<()> {
        if self.task_queue.default_timeout_secs == 0 {
            anyhow::bail!("task_queue.default_timeout_secs must be greater than zero");
        }
        if self.task_queue.concurrency == 0 {
            anyhow::bail!("task_queue.concurrency must be greater than zero");
        }
        Ok(())
    }

    /// Parse a TOML string into config (for testing).
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: BrokerConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }
}

fn warn_invalid(var: &str, value: &str) {
    tracing::warn!(var, value, "ignoring invalid env override");
}

/// Scheduler settings (`[task_queue]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskQueueConfig {
    /// Maximum simultaneously `processing` tasks.
    pub concurrency: usize,
    /// Per-task wall-clock budget, in seconds, before the executor is
    /// considered timed out. Must be greater than zero.
    pub default_timeout_secs: u64,
    /// Dispatcher tick period, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            default_timeout_secs: 300,
            poll_interval_ms: 200,
        }
    }
}

/// Webhook delivery settings (`[webhook]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Whether webhook delivery is enabled at all.
    pub enabled: bool,
    /// Default delivery URL, used when a task carries no per-delivery
    /// override in its metadata.
    pub default_url: Option<String>,
    /// Per-attempt HTTP timeout, in seconds.
    pub timeout_secs: u64,
    /// Maximum delivery attempts.
    pub retries: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_url: None,
            timeout_secs: 10,
            retries: 3,
        }
    }
}

/// Statistics rollup settings (`[statistics]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Whether request-level stats are recorded.
    pub enabled: bool,
    /// How often, in seconds, a background collector would sample
    /// (unused by the sink-only rollup this crate implements, kept for
    /// forward compatibility with a future scheduled collector).
    pub collection_interval_secs: u64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection_interval_secs: 60,
        }
    }
}

/// Rate limiting middleware settings (`[rate_limit]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether the limiter is active.
    pub enabled: bool,
    /// Fixed window size, in milliseconds.
    pub window_ms: u64,
    /// Maximum requests per remote address per window.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            max_requests: 120,
        }
    }
}

/// HTTP server bind settings (`[server]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
