//! Long-running `botwarden run` mode
//!
//! Starts the health monitor and the supervisor side by side, wires
//! transitions from one to the other and shuts both down on SIGTERM/SIGINT.

use crate::config::Config;
use crate::health::HealthMonitor;
use crate::notify::{Notifier, TelegramNotifier};
use crate::probe::{HealthProbe, TELEGRAM_SERVICE_NAME, TelegramIdentityCheck};
use crate::supervisor::{Supervisor, SupervisorOptions};
use crate::utils::{BotwardenError, ensure_data_dir, remove_pid_file, write_pid_file};
use anyhow::{Context, Result};
use secrecy::Secret;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub pid_file: Option<PathBuf>,
}

/// Builds the `getMe` probe for `token` using the configured API base and timeout.
pub fn telegram_probe(config: &Config, token: String) -> Result<HealthProbe> {
    let policy = config.health.policy();
    let check = TelegramIdentityCheck::new(Secret::new(token), &config.api_base_url, policy.timeout)?;
    Ok(HealthProbe::new(Arc::new(check), policy.timeout))
}

/// Runs until SIGTERM or SIGINT (Ctrl+C on non-Unix platforms).
pub async fn run_daemon(config: Config, options: RunOptions) -> Result<()> {
    run_daemon_until(config, options, wait_for_signal()).await
}

/// Same as [`run_daemon`] with a caller-supplied shutdown trigger.
///
/// Startup failures (invalid config, missing token, unusable data directory,
/// unwritable pid file, entry point that cannot be launched) are returned
/// before anything is left running.
pub async fn run_daemon_until<F>(config: Config, options: RunOptions, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting botwarden daemon"
    );

    config.validate().context("Invalid configuration")?;
    let token = config
        .telegram_token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            BotwardenError::external_service(TELEGRAM_SERVICE_NAME, "bot token is not configured")
        })?;
    let supervisor_options = SupervisorOptions::from_config(&config.supervisor)?;

    ensure_data_dir(&config.data_dir)
        .await
        .context("Failed to prepare data directory")?;
    info!(data_dir = %config.data_dir.display(), "Data directory ready");

    if let Some(pid_file) = &options.pid_file {
        write_pid_file(pid_file)
            .await
            .context("Failed to write pid file")?;
    }

    if let Some(port) = config.port {
        info!(port, "Declared port recorded in status file (not bound)");
    }

    let result = supervise(&config, token, supervisor_options, shutdown).await;

    if let Some(pid_file) = &options.pid_file {
        if let Err(e) = remove_pid_file(pid_file).await {
            warn!("Failed to remove pid file: {}", e);
        }
    }

    match &result {
        Ok(()) => info!("botwarden daemon stopped gracefully"),
        Err(e) => error!("botwarden daemon stopped: {:#}", e),
    }
    result
}

async fn supervise<F>(
    config: &Config,
    token: String,
    options: SupervisorOptions,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let probe = telegram_probe(config, token.clone())?;

    let (transition_tx, transition_rx) = tokio::sync::mpsc::channel(16);
    let monitor = HealthMonitor::new(probe, config.health.policy())
        .with_status_file(config.status_file.clone())
        .with_transition_sender(transition_tx)
        .with_port(config.port)
        .start();

    let mut supervisor =
        Supervisor::new(options).with_health(monitor.control(), transition_rx);

    if let Some(chat_id) = config.telegram_chat_id {
        match TelegramNotifier::new(token, chat_id).with_api_url(&config.api_base_url) {
            Ok(notifier) => {
                info!(chat_id, "Operator notifications enabled");
                let notifier: Arc<dyn Notifier> = Arc::new(notifier);
                supervisor = supervisor.with_notifier(notifier);
            }
            Err(e) => warn!("Notifications disabled: {:#}", e),
        }
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        shutdown.await;
        let _ = shutdown_tx.send(()).await;
    });

    info!("botwarden is running. Press Ctrl+C to stop.");
    let result = supervisor.run(shutdown_rx).await;

    info!("Stopping health monitor...");
    let snapshot = monitor.shutdown().await;
    info!(
        status = %snapshot.status,
        restarts = snapshot.restarts,
        total_probes = snapshot.total_probes,
        "Final health snapshot written"
    );

    result.context("Supervision failed")
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    std::future::pending::<()>().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown..."),
            Err(e) => {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
