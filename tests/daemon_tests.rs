//! End-to-end tests for `botwarden run`
//!
//! Tests cover:
//! - Startup with a fake Bot API and a long-running entry point
//! - Status file reaching `healthy`
//! - SIGTERM handling with PID file cleanup
//! - Crash relaunch and restart limit
#![cfg(unix)]
#![allow(deprecated)]

mod common;

use botwarden::health::{HealthStatus, load_snapshot};
use common::{FakeBotApi, TEST_TOKEN};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::{Child, Command};

fn spawn_daemon(home: &Path, api_url: &str, entry_point: &[&str]) -> Child {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin("botwarden"));
    cmd.current_dir(home)
        .env("HOME", home)
        .env_remove("TELEGRAM_CHAT_ID")
        .env_remove("BOTWARDEN_ENTRY_POINT")
        .env_remove("BOTWARDEN_DATA_DIR")
        .env_remove("BOTWARDEN_STATUS_FILE")
        .env("TELEGRAM_BOT_TOKEN", TEST_TOKEN)
        .env("TELEGRAM_API_URL", api_url)
        .env("NO_PROXY", "127.0.0.1")
        .env("HEALTHCHECK_INTERVAL", "1")
        .env("HEALTHCHECK_TIMEOUT", "1")
        .env("HEALTHCHECK_START_PERIOD", "0")
        .env("HEALTHCHECK_RETRIES", "2")
        .arg("run")
        .arg("--pid-file")
        .arg(home.join("botwarden.pid"))
        .arg("--")
        .args(entry_point)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    cmd.spawn().unwrap()
}

async fn wait_for_status(path: &Path, wanted: HealthStatus) -> bool {
    for _ in 0..100 {
        if let Ok(snapshot) = load_snapshot(path).await {
            if snapshot.status == wanted {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn test_daemon_reports_healthy_and_stops_on_sigterm() {
    let api = FakeBotApi::start().await;
    let home = TempDir::new().unwrap();
    let status_file = home.path().join(".botwarden").join("health.json");
    let pid_file = home.path().join("botwarden.pid");

    let mut daemon = spawn_daemon(home.path(), &api.url, &["sleep", "30"]);

    assert!(wait_for_status(&status_file, HealthStatus::Healthy).await);
    let pid: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(Some(pid), daemon.id());
    assert!(home.path().join(".botwarden").join("data").is_dir());

    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).unwrap();
    let status = tokio::time::timeout(Duration::from_secs(15), daemon.wait())
        .await
        .unwrap()
        .unwrap();

    assert!(status.success());
    assert!(!pid_file.exists());
    let snapshot = load_snapshot(&status_file).await.unwrap();
    assert_eq!(snapshot.bot_username.as_deref(), Some("warden_test_bot"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_daemon_gives_up_after_restart_limit() {
    let api = FakeBotApi::start().await;
    let home = TempDir::new().unwrap();
    let botwarden_dir = home.path().join(".botwarden");
    std::fs::create_dir_all(&botwarden_dir).unwrap();

    let config_path = botwarden_dir.join("config.json");
    std::fs::write(
        &config_path,
        r#"{ "supervisor": { "max_restarts": 2, "initial_backoff_ms": 50 } }"#,
    )
    .unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600)).unwrap();
    }

    let mut daemon = spawn_daemon(home.path(), &api.url, &["sh", "-c", "exit 3"]);
    let status = tokio::time::timeout(Duration::from_secs(15), daemon.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(status.code(), Some(1));
    assert!(!home.path().join("botwarden.pid").exists());
    let snapshot = load_snapshot(&botwarden_dir.join("health.json"))
        .await
        .unwrap();
    assert_eq!(snapshot.restarts, 2);
}
