use crate::health::HealthPolicy;
use crate::utils::paths::default_root;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("health.interval_secs must be greater than 0")]
    ZeroInterval,

    #[error("health.timeout_secs must be greater than 0")]
    ZeroTimeout,

    #[error("health.retries must be at least 1")]
    ZeroRetries,

    #[error("supervisor.entry_point must not be empty")]
    EmptyEntryPoint,

    #[error("api_base_url is not a valid URL: {0}")]
    InvalidApiUrl(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub start_period_secs: u64,
    pub retries: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 10,
            start_period_secs: 5,
            retries: 3,
        }
    }
}

impl HealthCheckConfig {
    pub fn policy(&self) -> HealthPolicy {
        HealthPolicy {
            interval: Duration::from_secs(self.interval_secs),
            timeout: Duration::from_secs(self.timeout_secs),
            start_period: Duration::from_secs(self.start_period_secs),
            retries: self.retries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    pub restart_on_unhealthy: bool,

    /// `None` means restart forever
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,

    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub memory_warning_mb: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            entry_point: None,
            working_dir: None,
            restart_on_unhealthy: true,
            max_restarts: None,
            initial_backoff_ms: 1000,
            max_backoff_secs: 60,
            shutdown_timeout_secs: 10,
            memory_warning_mb: 200,
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_token: Option<String>,

    /// Operator chat that receives supervisor notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<i64>,

    pub api_base_url: String,

    pub data_dir: PathBuf,

    pub status_file: PathBuf,

    /// Declared port; recorded only, never bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    pub health: HealthCheckConfig,

    pub supervisor: SupervisorConfig,
}

// The token never reaches logs or panic messages through `{:?}`
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field(
                "telegram_token",
                &self.telegram_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("api_base_url", &self.api_base_url)
            .field("data_dir", &self.data_dir)
            .field("status_file", &self.status_file)
            .field("port", &self.port)
            .field("health", &self.health)
            .field("supervisor", &self.supervisor)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root().unwrap_or_else(|| PathBuf::from(".botwarden"));
        Self {
            telegram_token: None,
            telegram_chat_id: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            data_dir: root.join("data"),
            status_file: root.join("health.json"),
            port: None,
            health: HealthCheckConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

/// Loggable view of the configuration; never carries secrets
#[derive(Debug, Clone)]
pub struct SafeSummary {
    pub telegram_configured: bool,
    pub notifications_enabled: bool,
    pub entry_point_configured: bool,
    pub api_base_url: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub start_period_secs: u64,
    pub retries: u32,
}

impl Config {
    pub fn get_safe_summary(&self) -> SafeSummary {
        SafeSummary {
            telegram_configured: self
                .telegram_token
                .as_deref()
                .is_some_and(|t| !t.is_empty()),
            notifications_enabled: self.telegram_chat_id.is_some(),
            entry_point_configured: self.supervisor.entry_point.is_some(),
            api_base_url: self.api_base_url.clone(),
            interval_secs: self.health.interval_secs,
            timeout_secs: self.health.timeout_secs,
            start_period_secs: self.health.start_period_secs,
            retries: self.health.retries,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.health.interval_secs == 0 {
            return Err(ValidationError::ZeroInterval);
        }
        if self.health.timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout);
        }
        if self.health.retries == 0 {
            return Err(ValidationError::ZeroRetries);
        }
        if let Some(argv) = &self.supervisor.entry_point {
            if argv.first().is_none_or(|program| program.trim().is_empty()) {
                return Err(ValidationError::EmptyEntryPoint);
            }
        }
        if reqwest::Url::parse(&self.api_base_url).is_err() {
            return Err(ValidationError::InvalidApiUrl(self.api_base_url.clone()));
        }
        Ok(())
    }
}
