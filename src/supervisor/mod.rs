//! Entry-point supervision
//!
//! Keeps exactly one bot process alive. Crashes are relaunched with
//! exponential backoff; an `Unhealthy` transition from the health monitor
//! replaces the running process.

use crate::config::SupervisorConfig;
use crate::health::{HealthControl, HealthStatus, Transition};
use crate::notify::{Notifier, SupervisorEvent, notify_best_effort};
use crate::utils::error::BotwardenError;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub mod backoff;
pub mod process;

pub use backoff::RestartBackoff;
pub use process::{ChildProcess, ProcessError, describe_exit};

const MEMORY_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Launch(#[from] ProcessError),

    #[error("restart limit reached after {restarts} restarts")]
    RestartLimit { restarts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub entry_point: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub restart_on_unhealthy: bool,
    pub max_restarts: Option<u32>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub shutdown_timeout: Duration,
    pub memory_warning_mb: u64,
}

impl SupervisorOptions {
    pub fn from_config(config: &SupervisorConfig) -> Result<Self, BotwardenError> {
        let entry_point = config
            .entry_point
            .clone()
            .filter(|argv| !argv.is_empty())
            .ok_or_else(|| {
                BotwardenError::config(
                    "no entry point configured (supervisor.entry_point, BOTWARDEN_ENTRY_POINT or `run -- <command>`)",
                )
            })?;

        Ok(Self {
            entry_point,
            working_dir: config.working_dir.clone(),
            restart_on_unhealthy: config.restart_on_unhealthy,
            max_restarts: config.max_restarts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            memory_warning_mb: config.memory_warning_mb,
        })
    }
}

pub struct Supervisor {
    options: SupervisorOptions,
    backoff: RestartBackoff,
    restarts: u32,
    child: Option<ChildProcess>,
    restart_at: Option<Instant>,
    health: Option<HealthControl>,
    transitions: Option<mpsc::Receiver<Transition>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        let backoff = RestartBackoff::new(options.initial_backoff, options.max_backoff);
        Self {
            options,
            backoff,
            restarts: 0,
            child: None,
            restart_at: None,
            health: None,
            transitions: None,
            notifier: None,
        }
    }

    pub fn with_health(
        mut self,
        control: HealthControl,
        transitions: mpsc::Receiver<Transition>,
    ) -> Self {
        self.health = Some(control);
        self.transitions = Some(transitions);
        self
    }

    /// Transitions without a monitor handle; the tracker is then never reset.
    pub fn with_transitions(mut self, transitions: mpsc::Receiver<Transition>) -> Self {
        self.transitions = Some(transitions);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Runs until `shutdown_rx` fires (Ok) or supervision is abandoned (Err).
    ///
    /// A failure to launch the entry point the first time is returned
    /// immediately; later launch failures count as crashes.
    pub async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<(), SupervisorError> {
        self.child = Some(ChildProcess::spawn(
            &self.options.entry_point,
            self.options.working_dir.as_deref(),
        )?);

        let mut memory_ticker = tokio::time::interval_at(
            Instant::now() + MEMORY_CHECK_INTERVAL,
            MEMORY_CHECK_INTERVAL,
        );
        memory_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut system = sysinfo::System::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Supervisor received shutdown signal");
                    break;
                }
                result = wait_child(&mut self.child) => {
                    if let Some(child) = self.child.take() {
                        debug!(uptime_secs = child.uptime().as_secs(), "Entry point ran");
                    }
                    let status = match result {
                        Ok(status) => describe_exit(&status),
                        Err(e) => format!("wait failed: {}", e),
                    };
                    self.handle_crash(status, false).await?;
                }
                _ = sleep_until(self.restart_at) => {
                    self.restart_at = None;
                    self.relaunch(false).await?;
                }
                transition = next_transition(&mut self.transitions) => {
                    match transition {
                        Some(transition) => self.handle_transition(transition).await?,
                        None => {
                            debug!("Transition channel closed");
                            self.transitions = None;
                        }
                    }
                }
                _ = memory_ticker.tick() => {
                    self.sample_memory(&mut system);
                }
            }
        }

        if let Some(mut child) = self.child.take() {
            info!(program = %child.program(), "Stopping entry point...");
            match child.terminate(self.options.shutdown_timeout).await {
                Some(status) => info!(status = %describe_exit(&status), "Entry point stopped"),
                None => error!("Entry point did not exit after kill"),
            }
        }

        info!(restarts = self.restarts, "Supervisor stopped");
        Ok(())
    }

    fn check_restart_limit(&self) -> Result<(), SupervisorError> {
        match self.options.max_restarts {
            Some(max) if self.restarts >= max => Err(SupervisorError::RestartLimit {
                restarts: self.restarts,
            }),
            _ => Ok(()),
        }
    }

    async fn give_up(&self, err: SupervisorError) -> SupervisorError {
        error!(restarts = self.restarts, "Giving up on entry point: {}", err);
        notify_best_effort(
            self.notifier.as_deref(),
            SupervisorEvent::RestartLimitReached {
                restarts: self.restarts,
            },
        )
        .await;
        err
    }

    async fn count_restart(&mut self) {
        self.restarts += 1;
        if let Some(health) = &self.health {
            health.record_restart().await;
        }
    }

    /// The child is gone; schedule the next launch after the backoff delay.
    ///
    /// `already_counted` is set when the launch that just failed was an
    /// unhealthy replacement whose restart has been counted; the retry then
    /// belongs to that same restart.
    async fn handle_crash(
        &mut self,
        status: String,
        already_counted: bool,
    ) -> Result<(), SupervisorError> {
        if !already_counted {
            if let Err(err) = self.check_restart_limit() {
                warn!(%status, "Entry point exited");
                return Err(self.give_up(err).await);
            }
        }

        let delay = self.backoff.next_delay();
        warn!(
            %status,
            restart_in_ms = delay.as_millis() as u64,
            restarts = self.restarts,
            "Entry point exited, scheduling restart"
        );
        if !already_counted {
            self.count_restart().await;
        }
        notify_best_effort(
            self.notifier.as_deref(),
            SupervisorEvent::ChildExited {
                status,
                restart_in_ms: delay.as_millis() as u64,
            },
        )
        .await;
        self.restart_at = Some(Instant::now() + delay);
        Ok(())
    }

    async fn relaunch(&mut self, already_counted: bool) -> Result<(), SupervisorError> {
        match ChildProcess::spawn(
            &self.options.entry_point,
            self.options.working_dir.as_deref(),
        ) {
            Ok(child) => {
                self.child = Some(child);
                if let Some(health) = &self.health {
                    health.reset().await;
                }
                Ok(())
            }
            Err(e) => self.handle_crash(e.to_string(), already_counted).await,
        }
    }

    async fn handle_transition(&mut self, transition: Transition) -> Result<(), SupervisorError> {
        match transition.to {
            HealthStatus::Unhealthy => {
                let last_error = self.health.as_ref().and_then(|h| h.snapshot().last_error);
                notify_best_effort(
                    self.notifier.as_deref(),
                    SupervisorEvent::BecameUnhealthy { last_error },
                )
                .await;

                if !self.options.restart_on_unhealthy {
                    warn!("Entry point is unhealthy; automatic replacement disabled");
                    return Ok(());
                }
                let Some(mut child) = self.child.take() else {
                    debug!("Unhealthy with no running entry point, restart already pending");
                    return Ok(());
                };

                if let Err(err) = self.check_restart_limit() {
                    child.terminate(self.options.shutdown_timeout).await;
                    return Err(self.give_up(err).await);
                }

                warn!(pid = ?child.pid(), "Replacing unhealthy entry point");
                notify_best_effort(self.notifier.as_deref(), SupervisorEvent::RestartingUnhealthy)
                    .await;
                if let Some(status) = child.terminate(self.options.shutdown_timeout).await {
                    debug!(status = %describe_exit(&status), "Unhealthy entry point stopped");
                }
                self.count_restart().await;
                self.relaunch(true).await
            }
            HealthStatus::Healthy => {
                self.backoff.reset();
                if transition.from == HealthStatus::Unhealthy {
                    info!("Entry point recovered");
                    notify_best_effort(self.notifier.as_deref(), SupervisorEvent::Recovered).await;
                } else {
                    info!("Entry point is healthy");
                }
                Ok(())
            }
            HealthStatus::Starting => Ok(()),
        }
    }

    fn sample_memory(&self, system: &mut sysinfo::System) {
        let Some(pid) = self.child.as_ref().and_then(|c| c.pid()) else {
            return;
        };
        let pid = sysinfo::Pid::from_u32(pid);
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
        if let Some(process) = system.process(pid) {
            let memory_mb = process.memory() / (1024 * 1024);
            if memory_mb > self.options.memory_warning_mb {
                warn!(
                    memory_mb,
                    threshold_mb = self.options.memory_warning_mb,
                    "Entry point memory usage exceeds threshold"
                );
            } else {
                debug!(memory_mb, "Entry point memory usage");
            }
        }
    }
}

async fn wait_child(child: &mut Option<ChildProcess>) -> std::io::Result<ExitStatus> {
    match child {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_transition(rx: &mut Option<mpsc::Receiver<Transition>>) -> Option<Transition> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
