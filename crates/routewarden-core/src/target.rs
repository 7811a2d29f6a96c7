//! The target contract — what a monitored backend must provide.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;

/// Result of a single health probe.
///
/// Immutable once produced; the owning runner swaps complete values into its
/// shared slot and snapshot consumers read whole copies.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResult {
    /// Whether the probe found the target healthy.
    pub healthy: bool,
    /// Failure detail when unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Probe round-trip time.
    #[serde(rename = "latency_ms", serialize_with = "ser_millis")]
    pub latency: Duration,
    /// Wall-clock completion time.
    #[serde(rename = "timestamp_ms", serialize_with = "ser_epoch_millis")]
    pub timestamp: SystemTime,
}

impl HealthResult {
    /// A healthy result with the given probe latency.
    pub fn healthy(latency: Duration) -> Self {
        Self {
            healthy: true,
            error: None,
            latency,
            timestamp: SystemTime::now(),
        }
    }

    /// An unhealthy result carrying a failure detail.
    pub fn unhealthy(error: impl Into<String>, latency: Duration) -> Self {
        Self {
            healthy: false,
            error: Some(error.into()),
            latency,
            timestamp: SystemTime::now(),
        }
    }
}

fn ser_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn ser_epoch_millis<S: serde::Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    let ms = t
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    s.serialize_u64(ms)
}

/// Operational state of a supervised target.
///
/// Transitions are driven solely by the target's own supervision task; other
/// tasks only ever read the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TargetState {
    /// Registered, no probe has succeeded yet.
    Init = 0,
    /// Most recent probe (or completed recovery) found the target healthy.
    Up = 1,
    /// Consecutive failures crossed the threshold.
    Down = 2,
    /// A recovery sequence is trying to re-establish connectivity.
    Reconnecting = 3,
    /// Connectivity restored, running target-specific reconciliation.
    Recovering = 4,
    /// Terminal: retry budget exhausted or escalation requested.
    Failed = 5,
}

impl TargetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetState::Init => "init",
            TargetState::Up => "up",
            TargetState::Down => "down",
            TargetState::Reconnecting => "reconnecting",
            TargetState::Recovering => "recovering",
            TargetState::Failed => "failed",
        }
    }

    pub(crate) fn from_u8(v: u8) -> TargetState {
        match v {
            1 => TargetState::Up,
            2 => TargetState::Down,
            3 => TargetState::Reconnecting,
            4 => TargetState::Recovering,
            5 => TargetState::Failed,
            _ => TargetState::Init,
        }
    }
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored backend component.
///
/// Implementations live outside this crate (the daemon wires up TCP- and
/// exec-backed targets); the supervisory core only consumes this contract.
///
/// `check` is raced against the configured probe timeout and the probe future
/// is dropped when the deadline wins. An implementation that wraps a truly
/// non-cancellable blocking call (e.g. via `spawn_blocking`) may keep running
/// after abandonment; such targets should enforce the passed timeout
/// internally as well.
#[async_trait]
pub trait Target: Send + Sync {
    /// Unique name of this target.
    fn name(&self) -> &str;

    /// Whether global readiness depends on this target being up.
    ///
    /// Fixed at construction; the watchdog reads it once at registration.
    fn critical(&self) -> bool;

    /// Run one bounded health probe.
    async fn check(&self, timeout: Duration) -> HealthResult;

    /// Attempt to (re)establish reachability.
    async fn connect(&self) -> anyhow::Result<()>;

    /// Tear down any connection state.
    async fn disconnect(&self) -> anyhow::Result<()>;

    /// Trigger the external restart mechanism (process manager, direct
    /// process control). May be unsupported and return an error.
    async fn restart(&self) -> anyhow::Result<()>;

    /// Target-specific reconciliation after reconnecting.
    async fn recover(&self) -> anyhow::Result<()>;

    /// Fired exactly once per transition into `Up`.
    async fn on_up(&self) {}

    /// Fired exactly once per transition into `Down`.
    async fn on_down(&self) {}
}
