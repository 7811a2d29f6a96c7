//! Concrete target implementations wired up from the daemon config.
//!
//! These are the "external collaborators" of the supervisory core: the core
//! only sees the [`Target`] contract. Two kinds are built in — TCP-probed
//! backends (a routing daemon's VTY port, a forwarding engine's control
//! socket) and exec-probed backends (anything a shell one-liner can check).

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use routewarden_core::{HealthResult, Target};

use crate::config::{TargetConfig, TargetKind};

/// Build a target from its configuration entry.
pub fn build_target(config: &TargetConfig) -> anyhow::Result<Arc<dyn Target>> {
    match config.kind {
        TargetKind::Tcp => {
            let address = config
                .address
                .clone()
                .context("tcp target without address")?;
            Ok(Arc::new(TcpTarget {
                name: config.name.clone(),
                critical: config.critical,
                address,
                restart_cmd: config.restart_cmd.clone(),
            }))
        }
        TargetKind::Exec => {
            let check_cmd = config
                .check_cmd
                .clone()
                .context("exec target without check_cmd")?;
            Ok(Arc::new(ExecTarget {
                name: config.name.clone(),
                critical: config.critical,
                check_cmd,
                restart_cmd: config.restart_cmd.clone(),
            }))
        }
    }
}

/// A backend probed by opening a TCP connection to its control endpoint.
pub struct TcpTarget {
    name: String,
    critical: bool,
    address: String,
    restart_cmd: Option<Vec<String>>,
}

#[async_trait]
impl Target for TcpTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn critical(&self) -> bool {
        self.critical
    }

    async fn check(&self, timeout: Duration) -> HealthResult {
        let started = Instant::now();
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&self.address)).await {
            Ok(Ok(_stream)) => HealthResult::healthy(started.elapsed()),
            Ok(Err(e)) => HealthResult::unhealthy(
                format!("connect {}: {e}", self.address),
                started.elapsed(),
            ),
            Err(_) => HealthResult::unhealthy(
                format!("connect {} timed out", self.address),
                started.elapsed(),
            ),
        }
    }

    async fn connect(&self) -> anyhow::Result<()> {
        tokio::net::TcpStream::connect(&self.address)
            .await
            .with_context(|| format!("connecting to {}", self.address))?;
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        // Probe connections are dropped as they go; nothing to tear down.
        Ok(())
    }

    async fn restart(&self) -> anyhow::Result<()> {
        match &self.restart_cmd {
            Some(cmd) => run_command(cmd).await,
            None => bail!("target `{}` has no restart command", self.name),
        }
    }

    async fn recover(&self) -> anyhow::Result<()> {
        // Reachability is the whole contract for a plain TCP backend.
        Ok(())
    }
}

/// A backend probed by running a command and inspecting its exit status.
pub struct ExecTarget {
    name: String,
    critical: bool,
    check_cmd: Vec<String>,
    restart_cmd: Option<Vec<String>>,
}

#[async_trait]
impl Target for ExecTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn critical(&self) -> bool {
        self.critical
    }

    async fn check(&self, timeout: Duration) -> HealthResult {
        let started = Instant::now();
        match tokio::time::timeout(timeout, run_command(&self.check_cmd)).await {
            Ok(Ok(())) => HealthResult::healthy(started.elapsed()),
            Ok(Err(e)) => HealthResult::unhealthy(e.to_string(), started.elapsed()),
            Err(_) => {
                HealthResult::unhealthy("check command timed out", started.elapsed())
            }
        }
    }

    async fn connect(&self) -> anyhow::Result<()> {
        run_command(&self.check_cmd).await
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn restart(&self) -> anyhow::Result<()> {
        match &self.restart_cmd {
            Some(cmd) => run_command(cmd).await,
            None => bail!("target `{}` has no restart command", self.name),
        }
    }

    async fn recover(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Run a command to completion, requiring exit status zero.
async fn run_command(cmd: &[String]) -> anyhow::Result<()> {
    let (program, args) = cmd.split_first().context("empty command")?;
    debug!(%program, "running command");
    let status = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .with_context(|| format!("spawning `{program}`"))?;
    if !status.success() {
        bail!("`{program}` exited with {status}");
    }
    Ok(())
}
