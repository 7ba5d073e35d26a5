//! Centralized error types and conversions for botwarden
//!
//! This module provides structured error types using `thiserror` for library code.
//! CLI/daemon modules should use `anyhow` for easy context.

use crate::probe::TELEGRAM_SERVICE_NAME;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Global error type for botwarden operations
#[derive(Error, Debug)]
pub enum BotwardenError {
    /// IO errors with path context
    #[error("IO error on {}: {source}", BotwardenError::sanitize_path(.path))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Runtime environment could not be prepared (data dir, pid file, first spawn)
    #[error("Environment setup failed: {message}")]
    Environment { message: String },

    /// External service errors (Telegram)
    #[error("External service error ({service}): {message}")]
    ExternalService { service: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl BotwardenError {
    /// Sanitize a path for display (remove sensitive user information)
    fn sanitize_path(path: &Path) -> String {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                return format!("~/{}", stripped.display());
            }
        }
        path.display().to_string()
    }

    /// Create an IO error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment {
            message: message.into(),
        }
    }

    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Returns true if the supervisor can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Status file writes can be retried on the next probe
            BotwardenError::Io { .. } => true,
            // Network issues are handled by the restart policy
            BotwardenError::ExternalService { .. } => true,
            // A snapshot that cannot be encoded will not encode next time either
            BotwardenError::Serialization { .. } => false,
            // Startup errors abort the whole run
            BotwardenError::Config { .. } => false,
            BotwardenError::Environment { .. } => false,
        }
    }

    /// Context-aware hint shown next to fatal errors on the CLI
    pub fn suggestion(&self) -> Option<String> {
        match self {
            BotwardenError::Config { message } => {
                if message.contains("entry point") {
                    Some(
                        "Pass the bot command after '--' (botwarden run -- <cmd>) or set BOTWARDEN_ENTRY_POINT."
                            .to_string(),
                    )
                } else {
                    Some("Check your config.json file or environment variables.".to_string())
                }
            }
            BotwardenError::Environment { .. } => Some(
                "Check that the data directory and pid file locations are writable.".to_string(),
            ),
            BotwardenError::ExternalService { service, .. } if service == TELEGRAM_SERVICE_NAME => {
                Some("Check your TELEGRAM_BOT_TOKEN and network connection.".to_string())
            }
            _ => None,
        }
    }
}

/// Result type alias using BotwardenError
pub type Result<T> = std::result::Result<T, BotwardenError>;

impl From<serde_json::Error> for BotwardenError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
