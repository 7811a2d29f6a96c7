//! wardend — the routewarden daemon.
//!
//! Assembles the supervisory core from a TOML config file and serves the
//! reporting API:
//! - builds one target per `[[targets]]` entry (TCP or exec probed)
//! - registers them with the watchdog and starts supervision
//! - serves `/livez`, `/readyz`, and `/api/v1/targets` over HTTP
//! - on Ctrl-C, stops every supervision loop before exiting
//!
//! A target configured with `action = "fail"` only ever *marks* itself
//! failed; wardend is the external supervisor that observes the terminal
//! state and exits the process with the configured code.
//!
//! # Usage
//!
//! ```text
//! wardend run --config /etc/routewarden/wardend.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use routewarden_core::{FailureAction, TargetState, Watchdog};
use wardend::config::DaemonConfig;
use wardend::targets;

#[derive(Parser)]
#[command(name = "wardend", about = "Routewarden daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Supervise the configured targets and serve the reporting API.
    Run {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,

        /// Listen address for the reporting API; overrides the config file.
        #[arg(long)]
        listen: Option<String>,
    },
    /// Parse and validate the configuration file, then exit.
    CheckConfig {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wardend=debug,routewarden=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, listen } => run(config, listen).await,
        Command::CheckConfig { config } => {
            let parsed = DaemonConfig::load(&config)?;
            info!(targets = parsed.targets.len(), "configuration is valid");
            Ok(())
        }
    }
}

async fn run(config_path: PathBuf, listen_override: Option<String>) -> anyhow::Result<()> {
    let config = DaemonConfig::load(&config_path)?;
    info!(path = %config_path.display(), targets = config.targets.len(), "configuration loaded");

    let watchdog = Arc::new(Watchdog::new());

    // Remember which targets asked for process escalation so the poll below
    // knows what exit code a Failed state carries.
    let mut escalations: Vec<(String, i32)> = Vec::new();

    for target_config in &config.targets {
        let runner_config = config.runner_config(target_config)?;
        if runner_config.action == FailureAction::Fail {
            escalations.push((target_config.name.clone(), runner_config.exit_code));
        }
        let target = targets::build_target(target_config)?;
        watchdog.register(target, runner_config).await?;
    }

    watchdog.start()?;

    let listen = listen_override.unwrap_or_else(|| config.listen.clone());
    let router = routewarden_api::build_router(watchdog.clone());
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!(%listen, "reporting API listening");

    let escalation_watchdog = watchdog.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.expect("failed to install CTRL+C handler");
                info!("shutdown signal received");
            }
            code = watch_for_escalation(escalation_watchdog, escalations) => {
                error!(exit_code = code, "escalated target failed, shutting down");
                EXIT_CODE.store(code, std::sync::atomic::Ordering::SeqCst);
            }
        }
    });

    server.await?;
    watchdog.stop().await;
    info!("wardend stopped");

    let code = EXIT_CODE.load(std::sync::atomic::Ordering::SeqCst);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

static EXIT_CODE: std::sync::atomic::AtomicI32 = std::sync::atomic::AtomicI32::new(0);

/// Resolve once any escalated target reaches the terminal `Failed` state,
/// yielding its configured exit code. Pends forever when no target uses the
/// `fail` action.
async fn watch_for_escalation(watchdog: Arc<Watchdog>, escalations: Vec<(String, i32)>) -> i32 {
    if escalations.is_empty() {
        std::future::pending::<()>().await;
    }
    loop {
        for (name, exit_code) in &escalations {
            if watchdog.state(name).map(|s| s.state) == Some(TargetState::Failed) {
                return *exit_code;
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
