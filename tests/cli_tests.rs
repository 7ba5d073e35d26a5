#![allow(deprecated)]

mod common;

use assert_cmd::Command;
use botwarden::health::{HealthSnapshot, HealthStatus};
use common::{FakeBotApi, TEST_TOKEN};
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const ISOLATED_VARS: &[&str] = &[
    "TELEGRAM_BOT_TOKEN",
    "TELEGRAM_CHAT_ID",
    "TELEGRAM_API_URL",
    "BOTWARDEN_DATA_DIR",
    "BOTWARDEN_STATUS_FILE",
    "BOTWARDEN_PORT",
    "BOTWARDEN_ENTRY_POINT",
    "HEALTHCHECK_INTERVAL",
    "HEALTHCHECK_TIMEOUT",
    "HEALTHCHECK_START_PERIOD",
    "HEALTHCHECK_RETRIES",
    "RUST_LOG",
];

/// The binary with a private HOME and working directory and no inherited config
fn botwarden(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("botwarden").unwrap();
    cmd.current_dir(home).env("HOME", home);
    for var in ISOLATED_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_version_command() {
    let home = TempDir::new().unwrap();
    botwarden(home.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "botwarden {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    botwarden(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_no_args_prints_help() {
    let home = TempDir::new().unwrap();
    botwarden(home.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_unknown_command_exits_one() {
    let home = TempDir::new().unwrap();
    botwarden(home.path())
        .arg("frobnicate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: unknown command: frobnicate"));
}

#[test]
fn test_invalid_flag_exits_two() {
    let home = TempDir::new().unwrap();
    botwarden(home.path())
        .args(["check", "--no-such-flag"])
        .assert()
        .code(2);
}

#[test]
fn test_verbose_logs_to_stderr() {
    let home = TempDir::new().unwrap();
    botwarden(home.path())
        .args(["--verbose", "version"])
        .assert()
        .success()
        .stdout(predicate::str::contains("botwarden"))
        .stdout(predicate::str::contains("DEBUG").not())
        .stderr(predicate::str::contains("DEBUG"));
}

#[test]
fn test_check_without_token_is_unhealthy() {
    let home = TempDir::new().unwrap();
    botwarden(home.path())
        .arg("check")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("unhealthy: no bot token configured"));
}

#[test]
fn test_check_malformed_token_never_printed() {
    let home = TempDir::new().unwrap();
    botwarden(home.path())
        .args(["check", "--json"])
        .env("TELEGRAM_BOT_TOKEN", "very-secret-value")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"status\": \"unhealthy\""))
        .stdout(predicate::str::contains("very-secret-value").not())
        .stderr(predicate::str::contains("very-secret-value").not());
}

#[test]
fn test_invalid_env_config_is_rejected() {
    let home = TempDir::new().unwrap();
    botwarden(home.path())
        .arg("check")
        .env("TELEGRAM_API_URL", "not a url")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_against_live_endpoint() {
    let api = FakeBotApi::start().await;
    let home = TempDir::new().unwrap();
    let home_path = home.path().to_path_buf();
    let url = api.url.clone();

    let output = tokio::task::spawn_blocking(move || {
        botwarden(&home_path)
            .args(["check", "--json", "--timeout", "5"])
            .env("TELEGRAM_BOT_TOKEN", TEST_TOKEN)
            .env("TELEGRAM_API_URL", url)
            .env("NO_PROXY", "127.0.0.1")
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(0), "stdout: {}", stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["bot_username"], "warden_test_bot");
    assert_eq!(api.requests(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_revoked_token_exits_one() {
    let api = FakeBotApi::start().await;
    api.set_revoked(true);
    let home = TempDir::new().unwrap();
    let home_path = home.path().to_path_buf();
    let url = api.url.clone();

    let output = tokio::task::spawn_blocking(move || {
        botwarden(&home_path)
            .arg("check")
            .env("TELEGRAM_BOT_TOKEN", TEST_TOKEN)
            .env("TELEGRAM_API_URL", url)
            .env("NO_PROXY", "127.0.0.1")
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("HTTP 401"));
    assert!(!stdout.contains(TEST_TOKEN));
}

#[test]
fn test_status_without_snapshot_exits_one() {
    let home = TempDir::new().unwrap();
    botwarden(home.path())
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No health status recorded"));
}

fn write_snapshot(path: &Path, status: HealthStatus) {
    let mut snapshot = HealthSnapshot::starting();
    snapshot.status = status;
    snapshot.total_probes = 7;
    snapshot.bot_username = Some("warden_test_bot".to_string());
    std::fs::write(path, serde_json::to_string(&snapshot).unwrap()).unwrap();
}

#[test]
fn test_status_healthy_snapshot() {
    let home = TempDir::new().unwrap();
    let status_file = home.path().join("health.json");
    write_snapshot(&status_file, HealthStatus::Healthy);

    botwarden(home.path())
        .arg("status")
        .env("BOTWARDEN_STATUS_FILE", &status_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("healthy"))
        .stdout(predicate::str::contains("@warden_test_bot"))
        .stdout(predicate::str::contains("Stale:").not());
}

#[test]
fn test_status_unhealthy_snapshot_json() {
    let home = TempDir::new().unwrap();
    let status_file = home.path().join("health.json");
    write_snapshot(&status_file, HealthStatus::Unhealthy);

    botwarden(home.path())
        .args(["status", "--json"])
        .env("BOTWARDEN_STATUS_FILE", &status_file)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"status\": \"unhealthy\""))
        .stdout(predicate::str::contains("\"total_probes\": 7"));
}

#[test]
fn test_status_stale_healthy_snapshot_exits_one() {
    let home = TempDir::new().unwrap();
    let status_file = home.path().join("health.json");
    let mut snapshot = HealthSnapshot::starting();
    snapshot.status = HealthStatus::Healthy;
    snapshot.updated_at = chrono::Utc::now() - chrono::Duration::hours(1);
    std::fs::write(&status_file, serde_json::to_string(&snapshot).unwrap()).unwrap();

    botwarden(home.path())
        .arg("status")
        .env("BOTWARDEN_STATUS_FILE", &status_file)
        .env("HEALTHCHECK_INTERVAL", "5")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Stale:"));

    botwarden(home.path())
        .args(["status", "--json"])
        .env("BOTWARDEN_STATUS_FILE", &status_file)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"stale\": true"));
}

#[test]
fn test_run_without_token_fails_fast() {
    let home = TempDir::new().unwrap();
    botwarden(home.path())
        .args(["run", "--", "sleep", "30"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("bot token is not configured"))
        .stderr(predicate::str::contains("TELEGRAM_BOT_TOKEN"));
}

#[test]
fn test_run_without_entry_point_fails_fast() {
    let home = TempDir::new().unwrap();
    botwarden(home.path())
        .arg("run")
        .env("TELEGRAM_BOT_TOKEN", TEST_TOKEN)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("entry point"));
}
