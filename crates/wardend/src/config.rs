//! Daemon configuration — TOML file describing the supervised targets.
//!
//! ```toml
//! listen = "0.0.0.0:9100"
//!
//! [defaults]
//! interval = "10s"
//! timeout = "5s"
//! failure_threshold = 3
//!
//! [[targets]]
//! name = "bgpd"
//! kind = "tcp"
//! address = "127.0.0.1:2605"
//! critical = true
//! action = "restart"
//! restart_cmd = ["systemctl", "restart", "bgpd"]
//! ```
//!
//! Durations are strings like "5s", "500ms", "2m". Any runner tunable can be
//! set in `[defaults]` and overridden per target.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

use routewarden_core::{FailureAction, RunnerConfig};

/// Top-level daemon configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Listen address for the reporting API.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Runner tunables applied to every target unless overridden.
    #[serde(default)]
    pub defaults: RunnerTunables,
    /// The supervised targets.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

fn default_listen() -> String {
    "127.0.0.1:9100".to_string()
}

/// Runner tunables, all optional so they can layer: per-target over
/// `[defaults]` over the core's built-in defaults.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RunnerTunables {
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub failure_threshold: Option<u32>,
    pub action: Option<FailureAction>,
    pub min_restart_interval: Option<String>,
    pub backoff_base: Option<String>,
    pub backoff_cap: Option<String>,
    pub max_retries: Option<u32>,
    pub exit_code: Option<i32>,
    pub exit_delay: Option<String>,
}

/// Backend kind for a configured target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Probe by opening a TCP connection to `address`.
    Tcp,
    /// Probe by running `check_cmd` and inspecting its exit status.
    Exec,
}

/// One supervised target.
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub kind: TargetKind,
    /// TCP endpoint, required for `kind = "tcp"`.
    pub address: Option<String>,
    /// Probe command, required for `kind = "exec"`.
    pub check_cmd: Option<Vec<String>>,
    /// Restart command; without one the `restart` action degrades to the
    /// reconnect path.
    pub restart_cmd: Option<Vec<String>>,
    #[serde(default)]
    pub critical: bool,
    /// Per-target overrides of `[defaults]`.
    #[serde(flatten)]
    pub tunables: RunnerTunables,
}

impl DaemonConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: DaemonConfig =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.name.as_str()) {
                bail!("duplicate target name `{}`", target.name);
            }
            match target.kind {
                TargetKind::Tcp if target.address.is_none() => {
                    bail!("target `{}`: kind = \"tcp\" requires `address`", target.name)
                }
                TargetKind::Exec if target.check_cmd.as_ref().is_none_or(|c| c.is_empty()) => {
                    bail!(
                        "target `{}`: kind = \"exec\" requires a non-empty `check_cmd`",
                        target.name
                    )
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Resolve the effective runner configuration for one target.
    pub fn runner_config(&self, target: &TargetConfig) -> anyhow::Result<RunnerConfig> {
        let mut config = RunnerConfig::default();
        for layer in [&self.defaults, &target.tunables] {
            apply_layer(&mut config, layer)
                .with_context(|| format!("target `{}`", target.name))?;
        }
        Ok(config)
    }
}

fn apply_layer(config: &mut RunnerConfig, layer: &RunnerTunables) -> anyhow::Result<()> {
    if let Some(s) = &layer.interval {
        config.interval = parse_duration(s)?;
    }
    if let Some(s) = &layer.timeout {
        config.timeout = parse_duration(s)?;
    }
    if let Some(n) = layer.failure_threshold {
        config.failure_threshold = n;
    }
    if let Some(action) = layer.action {
        config.action = action;
    }
    if let Some(s) = &layer.min_restart_interval {
        config.min_restart_interval = parse_duration(s)?;
    }
    if let Some(s) = &layer.backoff_base {
        config.backoff_base = parse_duration(s)?;
    }
    if let Some(s) = &layer.backoff_cap {
        config.backoff_cap = parse_duration(s)?;
    }
    if let Some(n) = layer.max_retries {
        config.max_retries = n;
    }
    if let Some(code) = layer.exit_code {
        config.exit_code = code;
    }
    if let Some(s) = &layer.exit_delay {
        config.exit_delay = Some(parse_duration(s)?);
    }
    Ok(())
}

/// Parse a duration string like "5s", "500ms", "2m".
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let parsed = if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    };
    match parsed {
        Some(d) => Ok(d),
        None => bail!("invalid duration `{s}`"),
    }
}
