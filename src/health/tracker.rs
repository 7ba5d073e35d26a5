//! Consecutive-failure state machine for probe results
//!
//! Same shape as a circuit breaker: a failure counter, a threshold, and a
//! timestamped window. Time is passed in by the caller so transitions are
//! deterministic under test.

use crate::health::{HealthPolicy, HealthStatus, Transition};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct HealthTracker {
    policy: HealthPolicy,
    status: HealthStatus,
    /// Start of the current grace window
    started_at: Instant,
    consecutive_failures: u32,
    total_probes: u64,
    total_failures: u64,
}

impl HealthTracker {
    pub fn new(policy: HealthPolicy, started_at: Instant) -> Self {
        Self {
            policy,
            status: HealthStatus::Starting,
            started_at,
            consecutive_failures: 0,
            total_probes: 0,
            total_failures: 0,
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_probes(&self) -> u64 {
        self.total_probes
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    /// Whether `now` falls inside the grace window opened by `new` or `reset`.
    ///
    /// The window is purely time-based; results observed inside it never
    /// count toward the threshold and never resolve `Starting`.
    pub fn in_grace_period(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) < self.policy.start_period
    }

    /// Feeds one probe result. Returns the transition if the status changed.
    pub fn record(&mut self, healthy: bool, now: Instant) -> Option<Transition> {
        self.total_probes = self.total_probes.saturating_add(1);
        if !healthy {
            self.total_failures = self.total_failures.saturating_add(1);
        }

        if self.in_grace_period(now) {
            debug!(
                healthy,
                elapsed_ms = now.saturating_duration_since(self.started_at).as_millis() as u64,
                "Result inside grace period, not counted"
            );
            return None;
        }

        let from = self.status;
        if healthy {
            self.consecutive_failures = 0;
            self.status = HealthStatus::Healthy;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            if self.consecutive_failures >= self.policy.retries {
                self.status = HealthStatus::Unhealthy;
            } else {
                debug!(
                    failures = self.consecutive_failures,
                    threshold = self.policy.retries,
                    "Probe failure counted"
                );
            }
        }

        if from == self.status {
            return None;
        }

        match self.status {
            HealthStatus::Unhealthy => warn!(
                from = %from,
                failures = self.consecutive_failures,
                threshold = self.policy.retries,
                "Instance marked unhealthy"
            ),
            _ => info!(from = %from, to = %self.status, "Health status changed"),
        }

        Some(Transition {
            from,
            to: self.status,
        })
    }

    /// Re-enters `Starting` with a fresh grace window, e.g. after the entry
    /// point was replaced. Lifetime counters are kept.
    pub fn reset(&mut self, now: Instant) {
        debug!(from = %self.status, "Health tracker reset to starting");
        self.status = HealthStatus::Starting;
        self.started_at = now;
        self.consecutive_failures = 0;
    }
}
