//! Periodic probe task
//!
//! Runs independently of the supervised process: every `interval` it performs
//! one bounded probe, feeds the tracker, publishes a [`HealthSnapshot`] and
//! forwards status transitions to whoever escalates them.

use crate::health::state_file::save_snapshot;
use crate::health::{HealthPolicy, HealthSnapshot, HealthStatus, HealthTracker, Transition};
use crate::probe::{HealthProbe, ProbeOutcome};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

struct Shared {
    tracker: RwLock<HealthTracker>,
    snapshot_tx: watch::Sender<HealthSnapshot>,
    status_file: Option<PathBuf>,
}

impl Shared {
    async fn persist(&self) {
        let Some(path) = &self.status_file else {
            return;
        };
        let snapshot = self.snapshot_tx.borrow().clone();
        if let Err(e) = save_snapshot(path, &snapshot).await {
            if e.is_recoverable() {
                warn!("Failed to write status file, retrying on next probe: {}", e);
            } else {
                error!("Failed to write status file: {}", e);
            }
        }
    }
}

pub struct HealthMonitor {
    probe: HealthProbe,
    policy: HealthPolicy,
    status_file: Option<PathBuf>,
    transitions_tx: Option<mpsc::Sender<Transition>>,
    initial: HealthSnapshot,
}

impl HealthMonitor {
    pub fn new(probe: HealthProbe, policy: HealthPolicy) -> Self {
        Self {
            probe,
            policy,
            status_file: None,
            transitions_tx: None,
            initial: HealthSnapshot::starting(),
        }
    }

    pub fn with_status_file(mut self, path: PathBuf) -> Self {
        self.status_file = Some(path);
        self
    }

    /// Status changes are sent here; a full channel drops nothing, the send waits.
    pub fn with_transition_sender(mut self, tx: mpsc::Sender<Transition>) -> Self {
        self.transitions_tx = Some(tx);
        self
    }

    /// Recorded in every snapshot; the monitor never binds it.
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.initial.port = port;
        self
    }

    /// Spawns the probe loop. The first probe fires one interval after start.
    pub fn start(self) -> MonitorHandle {
        let now = Instant::now();
        let (snapshot_tx, _) = watch::channel(self.initial);
        let shared = Arc::new(Shared {
            tracker: RwLock::new(HealthTracker::new(self.policy, now)),
            snapshot_tx,
            status_file: self.status_file,
        });

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let probe = self.probe;
        let transitions_tx = self.transitions_tx;
        let interval = self.policy.interval;
        let task_shared = Arc::clone(&shared);

        let join = tokio::spawn(async move {
            task_shared.persist().await;

            let mut ticker = tokio::time::interval_at(now + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_secs = interval.as_secs(),
                timeout_secs = probe.timeout().as_secs(),
                "Health monitor started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = probe.probe().await;
                        if let Some(transition) = apply_outcome(&task_shared, &outcome).await {
                            if let Some(tx) = &transitions_tx {
                                if tx.send(transition).await.is_err() {
                                    debug!("Transition receiver dropped");
                                }
                            }
                        }
                        task_shared.persist().await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Health monitor received shutdown signal");
                        break;
                    }
                }
            }

            info!("Health monitor stopped");
        });

        MonitorHandle {
            control: HealthControl { shared },
            shutdown_tx,
            join,
        }
    }
}

async fn apply_outcome(shared: &Shared, outcome: &ProbeOutcome) -> Option<Transition> {
    let now = Instant::now();
    let mut tracker = shared.tracker.write().await;
    let transition = tracker.record(outcome.is_healthy(), now);

    match outcome {
        ProbeOutcome::Healthy { identity, latency } => {
            debug!(
                bot = identity.username.as_deref().unwrap_or(&identity.first_name),
                latency_ms = latency.as_millis() as u64,
                "Probe healthy"
            );
        }
        ProbeOutcome::Unhealthy { failure, latency } => {
            warn!(
                %failure,
                latency_ms = latency.as_millis() as u64,
                consecutive_failures = tracker.consecutive_failures(),
                "Probe unhealthy"
            );
        }
    }

    let checked_at = Utc::now();
    shared.snapshot_tx.send_modify(|snapshot| {
        snapshot.status = tracker.status();
        snapshot.consecutive_failures = tracker.consecutive_failures();
        snapshot.total_probes = tracker.total_probes();
        snapshot.total_failures = tracker.total_failures();
        snapshot.last_check_at = Some(checked_at);
        snapshot.updated_at = checked_at;
        match outcome {
            ProbeOutcome::Healthy { identity, .. } => {
                snapshot.last_success_at = Some(checked_at);
                snapshot.last_error = None;
                snapshot.bot_username = identity.username.clone();
            }
            ProbeOutcome::Unhealthy { failure, .. } => {
                snapshot.last_error = Some(failure.to_string());
            }
        }
    });

    transition
}

/// Cloneable access to the monitor's state for the supervisor and the daemon
#[derive(Clone)]
pub struct HealthControl {
    shared: Arc<Shared>,
}

impl HealthControl {
    pub fn snapshot(&self) -> HealthSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn status(&self) -> HealthStatus {
        self.shared.snapshot_tx.borrow().status
    }

    /// Back to `Starting` with a new grace window; called after the entry
    /// point was replaced.
    pub async fn reset(&self) {
        let mut tracker = self.shared.tracker.write().await;
        tracker.reset(Instant::now());
        self.shared.snapshot_tx.send_modify(|snapshot| {
            snapshot.status = HealthStatus::Starting;
            snapshot.consecutive_failures = 0;
            snapshot.updated_at = Utc::now();
        });
        drop(tracker);
        self.shared.persist().await;
    }

    pub async fn record_restart(&self) {
        self.shared.snapshot_tx.send_modify(|snapshot| {
            snapshot.restarts += 1;
            snapshot.updated_at = Utc::now();
        });
        self.shared.persist().await;
    }
}

pub struct MonitorHandle {
    control: HealthControl,
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn control(&self) -> HealthControl {
        self.control.clone()
    }

    /// Stops the probe loop, writes the final snapshot and returns it.
    pub async fn shutdown(self) -> HealthSnapshot {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            warn!("Health monitor task panicked: {}", e);
        }
        self.control.shared.persist().await;
        self.control.snapshot()
    }
}
