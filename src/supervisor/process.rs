//! The supervised entry-point process

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("entry point is empty")]
    EmptyCommand,

    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct ChildProcess {
    child: Child,
    program: String,
    started_at: Instant,
}

impl ChildProcess {
    /// Launches `argv` with inherited environment and stdio.
    pub fn spawn(argv: &[String], working_dir: Option<&Path>) -> Result<Self, ProcessError> {
        let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        info!(program = %program, pid = ?child.id(), "Entry point started");

        Ok(Self {
            child,
            program: program.clone(),
            started_at: Instant::now(),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Waits for the process to exit. Cancel-safe.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Asks the process to stop (SIGTERM on Unix), then kills it if it is still
    /// running after `grace`. Returns the exit status if one was observed.
    pub async fn terminate(&mut self, grace: Duration) -> Option<ExitStatus> {
        if let Ok(Some(status)) = self.child.try_wait() {
            return Some(status);
        }

        if self.send_terminate() {
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(program = %self.program, %status, "Entry point stopped after SIGTERM");
                    return Some(status);
                }
                Ok(Err(e)) => warn!("Failed to wait for entry point: {}", e),
                Err(_) => warn!(
                    program = %self.program,
                    grace_secs = grace.as_secs(),
                    "Entry point ignored SIGTERM, killing"
                ),
            }
        }

        if let Err(e) = self.child.start_kill() {
            warn!("Failed to kill entry point: {}", e);
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            _ => None,
        }
    }

    #[cfg(unix)]
    fn send_terminate(&self) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return false;
        };
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => true,
            Err(e) => {
                warn!(pid, "Failed to send SIGTERM: {}", e);
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn send_terminate(&self) -> bool {
        false
    }
}

/// Short human-readable exit description for logs and notifications
pub fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("killed by signal {}", signal);
        }
    }
    status.to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_spawn_and_wait_exit_code() {
        let mut child = ChildProcess::spawn(&sh("exit 3"), None).unwrap();
        assert!(child.pid().is_some());
        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
        assert_eq!(describe_exit(&status), "exit code 3");
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let argv = vec!["/definitely/not/a/binary".to_string()];
        let err = ChildProcess::spawn(&argv, None).err().unwrap();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert!(err.to_string().contains("/definitely/not/a/binary"));
    }

    #[tokio::test]
    async fn test_empty_argv_rejected() {
        assert!(matches!(
            ChildProcess::spawn(&[], None),
            Err(ProcessError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn test_terminate_long_running() {
        let mut child = ChildProcess::spawn(&sh("sleep 30"), None).unwrap();
        let status = child.terminate(Duration::from_secs(5)).await.unwrap();
        assert!(!status.success());
        assert!(describe_exit(&status).contains("signal 15"));
    }

    #[tokio::test]
    async fn test_terminate_kills_when_sigterm_ignored() {
        let mut child =
            ChildProcess::spawn(&sh("trap '' TERM; while true; do sleep 1; done"), None).unwrap();
        // Give the shell a moment to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = child.terminate(Duration::from_millis(300)).await.unwrap();
        assert!(describe_exit(&status).contains("signal 9"));
    }

    #[tokio::test]
    async fn test_working_dir_applied() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut child =
            ChildProcess::spawn(&sh("touch marker"), Some(temp.path())).unwrap();
        assert!(child.wait().await.unwrap().success());
        assert!(temp.path().join("marker").exists());
    }
}
