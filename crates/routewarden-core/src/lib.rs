//! routewarden-core — health supervision and automated recovery for router
//! control-plane backends.
//!
//! Continuously probes a set of named backend processes (a routing daemon, a
//! packet-forwarding engine, ...), classifies each one's operational state,
//! and drives a recovery protocol when a target degrades. Aggregate
//! liveness/readiness queries let an orchestrator gate traffic admission on
//! the health of critical targets.
//!
//! # Architecture
//!
//! ```text
//! Watchdog
//!   ├── Per-target supervision task (TargetRunner)
//!   │   ├── periodic bounded probe → HealthResult
//!   │   ├── state machine: Init/Up/Down/Reconnecting/Recovering/Failed
//!   │   └── recovery: reconnect w/ backoff, restart w/ rate limit
//!   └── Snapshot queries: state() / all_states() / is_ready()
//! ```
//!
//! Each registered target gets its own supervision task so that one stalled
//! recovery loop never delays probing of any other target. Runner state is
//! kept in independently atomic fields; snapshot readers never take a lock
//! the probing hot path contends on.
//!
//! # Recovery
//!
//! When consecutive probe failures cross the configured threshold the target
//! is marked `Down` and the configured [`FailureAction`] runs: reconnect with
//! exponential backoff, restart with rate limiting, warn-only, or terminal
//! escalation. All failures inside recovery are absorbed and logged — the
//! observable state is the only failure signal that crosses this crate's
//! boundary.

pub mod config;
pub mod error;
pub mod runner;
pub mod target;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{FailureAction, RunnerConfig};
pub use error::WatchdogError;
pub use runner::TargetSnapshot;
pub use target::{HealthResult, Target, TargetState};
pub use watchdog::Watchdog;
