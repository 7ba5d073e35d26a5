//! Health state as the supervisor sees it
//!
//! - [`tracker`]: the STARTING / HEALTHY / UNHEALTHY state machine
//! - [`monitor`]: the periodic task that feeds probe results into the tracker
//! - [`state_file`]: JSON snapshot on disk for `botwarden status`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod monitor;
pub mod state_file;
pub mod tracker;

pub use monitor::{HealthControl, HealthMonitor, MonitorHandle};
pub use state_file::{load_snapshot, save_snapshot};
pub use tracker::HealthTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Initial state; failures inside the grace period are not counted
    Starting,
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Starting => "starting",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe scheduling and escalation thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub interval: Duration,
    pub timeout: Duration,
    pub start_period: Duration,
    /// Consecutive counted failures before the instance is unhealthy
    pub retries: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            start_period: Duration::from_secs(5),
            retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthStatus,
    pub to: HealthStatus,
}

/// Point-in-time view published by the monitor and persisted to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub total_probes: u64,
    pub total_failures: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_username: Option<String>,
    #[serde(default)]
    pub restarts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub updated_at: DateTime<Utc>,
}

impl HealthSnapshot {
    pub fn starting() -> Self {
        Self {
            status: HealthStatus::Starting,
            consecutive_failures: 0,
            total_probes: 0,
            total_failures: 0,
            last_check_at: None,
            last_success_at: None,
            last_error: None,
            bot_username: None,
            restarts: 0,
            port: None,
            updated_at: Utc::now(),
        }
    }
}
