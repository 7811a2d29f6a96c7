//! Per-runner tunable configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the runner does when a target crosses its failure threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureAction {
    /// Reconnect with exponential backoff, then run the target's recovery
    /// reconciliation.
    Recover,
    /// Restart the backend (rate limited), then fall through to the
    /// reconnect/recover path.
    Restart,
    /// Log only; the target stays down until it comes back on its own.
    Warn,
    /// Mark the target terminally failed and log the requested exit code.
    /// The core never terminates the process itself; an external supervisor
    /// observes the `Failed` state and applies its own exit policy.
    Fail,
}

/// Immutable per-target tunables, supplied at registration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Spacing between periodic probes.
    pub interval: Duration,
    /// Upper bound on a single probe.
    pub timeout: Duration,
    /// Consecutive failed probes before the target is declared down.
    pub failure_threshold: u32,
    /// Recovery behavior once the threshold is crossed.
    pub action: FailureAction,
    /// Minimum spacing between two restart attempts.
    pub min_restart_interval: Duration,
    /// Base delay for reconnect backoff.
    pub backoff_base: Duration,
    /// Ceiling for reconnect backoff.
    pub backoff_cap: Duration,
    /// Maximum reconnect attempts per down episode; 0 means unbounded.
    pub max_retries: u32,
    /// Exit code hint for the `fail` action.
    pub exit_code: i32,
    /// Optional delay between marking `Failed` and returning, for the
    /// `fail` action.
    pub exit_delay: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            failure_threshold: 3,
            action: FailureAction::Recover,
            min_restart_interval: Duration::from_secs(60),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            max_retries: 0,
            exit_code: 1,
            exit_delay: None,
        }
    }
}
