use crate::config::schema::{Config, ValidationError};
use crate::utils::paths::default_root;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
pub(crate) static CONFIG_TEST_ENV_LOCK: Mutex<()> = Mutex::new(());

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file contains invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ValidationError),
}

/// Values given on the command line; they win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub entry_point: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}

pub fn load_config(overrides: CliOverrides, cli_config_path: Option<PathBuf>) -> Result<Config> {
    tracing::debug!("Loading configuration");

    let mut config = Config::default();

    // Layer 1: Load from config file (~/.botwarden/config.json)
    let config_file = cli_config_path.clone().or_else(get_default_config_path);

    if let Some(ref path) = config_file {
        if path.exists() {
            tracing::debug!(config_path = %path.display(), "Loading configuration from file");
            config = merge_config_from_file(config, path)?;
        } else {
            tracing::debug!(config_path = %path.display(), "Config file not found, using defaults");
        }
    }

    // Layer 2: Environment variables override
    tracing::debug!("Applying environment variable overrides");
    config = merge_env_variables(config);

    // Layer 3: CLI flags override (highest precedence)
    apply_cli_overrides(&mut config, overrides);

    config.validate().map_err(ConfigError::Invalid)?;

    let summary = config.get_safe_summary();
    tracing::debug!(
        telegram_configured = summary.telegram_configured,
        notifications_enabled = summary.notifications_enabled,
        entry_point_configured = summary.entry_point_configured,
        api_base_url = %summary.api_base_url,
        interval_secs = summary.interval_secs,
        timeout_secs = summary.timeout_secs,
        start_period_secs = summary.start_period_secs,
        retries = summary.retries,
        "Configuration loaded successfully"
    );

    Ok(config)
}

fn apply_cli_overrides(config: &mut Config, overrides: CliOverrides) {
    if let Some(argv) = overrides.entry_point.filter(|argv| !argv.is_empty()) {
        tracing::debug!(program = %argv[0], "Applying CLI entry point override");
        config.supervisor.entry_point = Some(argv);
    }
    if let Some(timeout) = overrides.timeout_secs {
        tracing::debug!(timeout_secs = timeout, "Applying CLI timeout override");
        config.health.timeout_secs = timeout;
    }
}

fn get_default_config_path() -> Option<PathBuf> {
    default_root().map(|root| root.join("config.json"))
}

fn merge_config_from_file(config: Config, path: &Path) -> Result<Config> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(config),
        Err(e) => return Err(e).context("Failed to read metadata for config file"),
    };

    // The file may hold the bot token
    #[cfg(unix)]
    {
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o600 {
            tracing::error!(
                "Config file {:?} has permissions {:o}, expected 0600 - skipping for security",
                path,
                mode
            );
            return Ok(config);
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let file_config: Config = serde_json::from_str(&content).map_err(ConfigError::InvalidJson)?;

    Ok(file_config)
}

/// Reads an env var, treating empty values as unset
fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_value(name)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, "Ignoring unparsable environment value");
            None
        }
    }
}

fn merge_env_variables(mut config: Config) -> Config {
    if let Some(token) = env_value("TELEGRAM_BOT_TOKEN") {
        config.telegram_token = Some(token);
    }
    if let Some(chat_id) = env_parsed::<i64>("TELEGRAM_CHAT_ID") {
        config.telegram_chat_id = Some(chat_id);
    }
    if let Some(url) = env_value("TELEGRAM_API_URL") {
        config.api_base_url = url;
    }
    if let Some(dir) = env_value("BOTWARDEN_DATA_DIR") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(file) = env_value("BOTWARDEN_STATUS_FILE") {
        config.status_file = PathBuf::from(file);
    }
    if let Some(port) = env_parsed::<u16>("BOTWARDEN_PORT") {
        config.port = Some(port);
    }
    if let Some(entry_point) = env_value("BOTWARDEN_ENTRY_POINT") {
        config.supervisor.entry_point =
            Some(entry_point.split_whitespace().map(String::from).collect());
    }

    if let Some(v) = env_parsed("HEALTHCHECK_INTERVAL") {
        config.health.interval_secs = v;
    }
    if let Some(v) = env_parsed("HEALTHCHECK_TIMEOUT") {
        config.health.timeout_secs = v;
    }
    if let Some(v) = env_parsed("HEALTHCHECK_START_PERIOD") {
        config.health.start_period_secs = v;
    }
    if let Some(v) = env_parsed("HEALTHCHECK_RETRIES") {
        config.health.retries = v;
    }

    config
}
