use crate::config::{CliOverrides, load_config};
use crate::daemon::{RunOptions, run_daemon, telegram_probe};
use crate::health::{HealthPolicy, HealthSnapshot, load_snapshot};
use crate::probe::ProbeOutcome;
use crate::utils::BotwardenError;
use crate::utils::fs::file_exists;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXIT_HEALTHY: i32 = 0;
pub const EXIT_UNHEALTHY: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "botwarden")]
#[command(about = "botwarden - health probe and supervisor for Telegram bots")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config.json (default: ~/.botwarden/config.json)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Supervise the bot process and probe its health until stopped
    Run {
        /// Write the daemon PID to this file
        #[arg(long, value_name = "PATH")]
        pid_file: Option<PathBuf>,

        /// Command that starts the bot, e.g. `-- python bot.py`
        #[arg(last = true, value_name = "ENTRY_POINT")]
        entry_point: Vec<String>,
    },

    /// Probe the Bot API once; exit 0 if healthy, 1 otherwise
    Check {
        /// Per-attempt timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the last recorded health snapshot; exit 0 if healthy, 1 otherwise
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display version information
    Version,
}

/// Executes the parsed command and returns the process exit code.
pub fn run(cli: Cli) -> i32 {
    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        println!();
        return EXIT_HEALTHY;
    };

    let result = match command {
        Commands::Version => {
            print_version();
            Ok(EXIT_HEALTHY)
        }
        Commands::Run {
            pid_file,
            entry_point,
        } => handle_run(cli.config, pid_file, entry_point),
        Commands::Check { timeout, json } => handle_check(cli.config, timeout, json),
        Commands::Status { json } => handle_status(cli.config, json),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            EXIT_UNHEALTHY
        }
    }
}

fn print_version() {
    println!("botwarden {}", env!("CARGO_PKG_VERSION"));
}

fn report_error(err: &anyhow::Error) {
    eprintln!("Error: {:#}", err);
    if let Some(suggestion) = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<BotwardenError>())
        .and_then(BotwardenError::suggestion)
    {
        eprintln!("Hint: {}", suggestion);
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

fn handle_run(
    config_path: Option<PathBuf>,
    pid_file: Option<PathBuf>,
    entry_point: Vec<String>,
) -> Result<i32> {
    let overrides = CliOverrides {
        entry_point: Some(entry_point).filter(|argv| !argv.is_empty()),
        ..CliOverrides::default()
    };
    let config = load_config(overrides, config_path).context("Failed to load configuration")?;

    runtime()?.block_on(run_daemon(config, RunOptions { pid_file }))?;
    Ok(EXIT_HEALTHY)
}

fn handle_check(config_path: Option<PathBuf>, timeout: Option<u64>, json: bool) -> Result<i32> {
    let overrides = CliOverrides {
        timeout_secs: timeout,
        ..CliOverrides::default()
    };
    let config = load_config(overrides, config_path).context("Failed to load configuration")?;

    // A missing token is reported as an unhealthy probe, not a usage error
    let token = config.telegram_token.clone().unwrap_or_default();
    let probe = telegram_probe(&config, token)?;
    let outcome = runtime()?.block_on(probe.probe());

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);
    } else {
        println!("{}", outcome_line(&outcome));
    }

    Ok(if outcome.is_healthy() {
        EXIT_HEALTHY
    } else {
        EXIT_UNHEALTHY
    })
}

fn outcome_json(outcome: &ProbeOutcome) -> serde_json::Value {
    let latency_ms = outcome.latency().as_millis() as u64;
    match outcome {
        ProbeOutcome::Healthy { identity, .. } => serde_json::json!({
            "status": "healthy",
            "latency_ms": latency_ms,
            "bot_id": identity.id,
            "bot_username": identity.username,
        }),
        ProbeOutcome::Unhealthy { failure, .. } => serde_json::json!({
            "status": "unhealthy",
            "latency_ms": latency_ms,
            "error": failure.to_string(),
        }),
    }
}

fn outcome_line(outcome: &ProbeOutcome) -> String {
    let latency_ms = outcome.latency().as_millis();
    match outcome {
        ProbeOutcome::Healthy { identity, .. } => {
            let name = identity
                .username
                .as_deref()
                .map(|u| format!("@{}", u))
                .unwrap_or_else(|| identity.first_name.clone());
            format!("healthy: {} ({}ms)", name, latency_ms)
        }
        ProbeOutcome::Unhealthy { failure, .. } => {
            format!("unhealthy: {} ({}ms)", failure, latency_ms)
        }
    }
}

fn handle_status(config_path: Option<PathBuf>, json: bool) -> Result<i32> {
    let config = load_config(CliOverrides::default(), config_path)
        .context("Failed to load configuration")?;

    let Some(snapshot) = runtime()?.block_on(read_status(&config.status_file))? else {
        eprintln!(
            "No health status recorded at {} (is `botwarden run` active?)",
            config.status_file.display()
        );
        return Ok(EXIT_UNHEALTHY);
    };

    let max_age = max_snapshot_age(&config.health.policy());
    let stale = is_stale(&snapshot, max_age, Utc::now());

    if json {
        let mut value = serde_json::to_value(&snapshot)?;
        value["stale"] = serde_json::Value::Bool(stale);
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", format_snapshot(&snapshot));
        if stale {
            println!(
                "Stale:                no update for over {}s (is `botwarden run` still active?)",
                max_age.as_secs()
            );
        }
    }

    Ok(if snapshot.status.is_healthy() && !stale {
        EXIT_HEALTHY
    } else {
        EXIT_UNHEALTHY
    })
}

async fn read_status(path: &Path) -> Result<Option<HealthSnapshot>> {
    if !file_exists(path).await.unwrap_or(false) {
        return Ok(None);
    }
    Ok(Some(load_snapshot(path).await?))
}

/// The monitor rewrites the snapshot after every check; anything older than
/// a few missed intervals was left behind by a daemon that is gone.
fn max_snapshot_age(policy: &HealthPolicy) -> Duration {
    policy
        .interval
        .saturating_mul(3)
        .saturating_add(policy.timeout)
}

fn is_stale(snapshot: &HealthSnapshot, max_age: Duration, now: DateTime<Utc>) -> bool {
    // A timestamp in the future (clock skew) is not treated as stale
    now.signed_duration_since(snapshot.updated_at)
        .to_std()
        .is_ok_and(|age| age > max_age)
}

fn format_snapshot(snapshot: &HealthSnapshot) -> String {
    let mut out = format!("Status:               {}\n", snapshot.status);
    out.push_str(&format!(
        "Consecutive failures: {}\n",
        snapshot.consecutive_failures
    ));
    out.push_str(&format!(
        "Probes:               {} ({} failed)\n",
        snapshot.total_probes, snapshot.total_failures
    ));
    out.push_str(&format!("Restarts:             {}\n", snapshot.restarts));
    if let Some(username) = &snapshot.bot_username {
        out.push_str(&format!("Bot:                  @{}\n", username));
    }
    if let Some(at) = snapshot.last_check_at {
        out.push_str(&format!("Last check:           {}\n", at.to_rfc3339()));
    }
    if let Some(at) = snapshot.last_success_at {
        out.push_str(&format!("Last success:         {}\n", at.to_rfc3339()));
    }
    if let Some(err) = &snapshot.last_error {
        out.push_str(&format!("Last error:           {}\n", err));
    }
    if let Some(port) = snapshot.port {
        out.push_str(&format!("Port:                 {}\n", port));
    }
    out.push_str(&format!(
        "Updated:              {}\n",
        snapshot.updated_at.to_rfc3339()
    ));
    out
}

/// Pulls the command name out of clap's "unrecognized subcommand 'x'" message.
pub fn extract_command_from_error(error_msg: &str) -> String {
    if let Some(start) = error_msg.find('\'') {
        if let Some(end) = error_msg[start + 1..].find('\'') {
            return error_msg[start + 1..start + 1 + end].to_string();
        }
    }
    "unknown".to_string()
}
