use anyhow::Result;
use async_trait::async_trait;

pub mod telegram;

pub use telegram::TelegramNotifier;

/// Delivers short operator-facing messages about supervisor events.
///
/// Failures are reported to the caller but must never affect supervision;
/// use [`notify_best_effort`] at call sites.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<()>;
}

/// Supervisor events worth telling a human about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    BecameUnhealthy { last_error: Option<String> },
    Recovered,
    ChildExited { status: String, restart_in_ms: u64 },
    RestartingUnhealthy,
    RestartLimitReached { restarts: u32 },
}

impl SupervisorEvent {
    pub fn message(&self) -> String {
        match self {
            SupervisorEvent::BecameUnhealthy { last_error } => match last_error {
                Some(err) => format!("Bot is unhealthy: {}", err),
                None => "Bot is unhealthy".to_string(),
            },
            SupervisorEvent::Recovered => "Bot is healthy again".to_string(),
            SupervisorEvent::ChildExited {
                status,
                restart_in_ms,
            } => format!(
                "Bot process exited ({}), restarting in {}ms",
                status, restart_in_ms
            ),
            SupervisorEvent::RestartingUnhealthy => {
                "Replacing bot process after failed health checks".to_string()
            }
            SupervisorEvent::RestartLimitReached { restarts } => format!(
                "Restart limit reached after {} restarts, giving up",
                restarts
            ),
        }
    }
}

pub async fn notify_best_effort(notifier: Option<&dyn Notifier>, event: SupervisorEvent) {
    let Some(notifier) = notifier else {
        return;
    };
    if let Err(e) = notifier.notify(&event.message()).await {
        tracing::warn!("Failed to deliver notification: {}", e);
    }
}
