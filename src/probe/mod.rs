//! Liveness probe against the messaging platform
//!
//! A probe is one identity check bounded by a hard timeout. It mutates no local
//! state; scheduling and threshold logic live in [`crate::health`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use thiserror::Error;

pub mod telegram;

pub use telegram::{TELEGRAM_SERVICE_NAME, TelegramIdentityCheck, is_valid_token_format};

/// Why a single probe reported unhealthy. Messages never contain the token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    #[error("no bot token configured")]
    MissingToken,

    #[error("bot token is malformed (expected <digits>:<secret>)")]
    InvalidTokenFormat,

    #[error("identity check timed out after {}ms", .timeout.as_millis())]
    TimedOut { timeout: Duration },

    #[error("network error: {0}")]
    Network(String),

    #[error("platform rejected the token (HTTP {status}): {description}")]
    Rejected { status: u16, description: String },

    #[error("unexpected response: {0}")]
    MalformedResponse(String),
}

/// Account identity returned by a successful check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy {
        identity: BotIdentity,
        latency: Duration,
    },
    Unhealthy {
        failure: ProbeFailure,
        latency: Duration,
    },
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy { .. })
    }

    pub fn latency(&self) -> Duration {
        match self {
            ProbeOutcome::Healthy { latency, .. } | ProbeOutcome::Unhealthy { latency, .. } => {
                *latency
            }
        }
    }

    pub fn failure(&self) -> Option<&ProbeFailure> {
        match self {
            ProbeOutcome::Healthy { .. } => None,
            ProbeOutcome::Unhealthy { failure, .. } => Some(failure),
        }
    }
}

/// One round-trip to the platform's "who am I" endpoint.
///
/// Implementations should not apply their own scheduling; [`HealthProbe`]
/// bounds each call with the configured timeout.
#[async_trait]
pub trait IdentityCheck: Send + Sync {
    async fn check(&self) -> Result<BotIdentity, ProbeFailure>;
}

/// Runs an [`IdentityCheck`] under a hard timeout.
#[derive(Clone)]
pub struct HealthProbe {
    check: Arc<dyn IdentityCheck>,
    timeout: Duration,
}

impl HealthProbe {
    pub fn new(check: Arc<dyn IdentityCheck>, timeout: Duration) -> Self {
        Self { check, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Performs one probe. Never waits longer than the timeout.
    pub async fn probe(&self) -> ProbeOutcome {
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.check.check()).await;
        let latency = started.elapsed();

        match result {
            Ok(Ok(identity)) => {
                tracing::debug!(
                    bot_id = identity.id,
                    latency_ms = latency.as_millis() as u64,
                    "Identity check succeeded"
                );
                ProbeOutcome::Healthy { identity, latency }
            }
            Ok(Err(failure)) => {
                tracing::debug!(%failure, latency_ms = latency.as_millis() as u64, "Identity check failed");
                ProbeOutcome::Unhealthy { failure, latency }
            }
            Err(_) => {
                tracing::debug!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Identity check timed out"
                );
                ProbeOutcome::Unhealthy {
                    failure: ProbeFailure::TimedOut {
                        timeout: self.timeout,
                    },
                    latency,
                }
            }
        }
    }
}
