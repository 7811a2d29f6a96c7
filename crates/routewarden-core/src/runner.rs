//! Per-target supervision — probing loop, state machine, recovery.
//!
//! One `TargetRunner` per registered target. The runner's own task is the
//! only writer of its mutable state; snapshot readers see independently
//! atomic fields, so a consistent-enough view is available without taking
//! any lock the probing hot path holds for more than a pointer swap.

use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{FailureAction, RunnerConfig};
use crate::target::{HealthResult, Target, TargetState};

/// Poll spacing while waiting for a restarted backend to accept connections.
const RESTART_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Ceiling on the post-restart reachability poll.
const RESTART_POLL_CEILING: Duration = Duration::from_secs(60);

/// Point-in-time copy of a runner's observable state.
///
/// Safe to read, serialize, and hold without synchronizing with the probing
/// loop. Fields are read individually from atomics, so a snapshot may pair an
/// updated state with a slightly stale timestamp; acceptable for a monitoring
/// surface.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSnapshot {
    pub name: String,
    pub state: TargetState,
    pub critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<HealthResult>,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_recoveries: u64,
    pub total_restarts: u64,
    /// Epoch millis of the last state transition; 0 if none yet.
    pub last_transition_ms: u64,
    /// Human-readable uptime, present only while the target is up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
}

/// The mutable block shared between a runner's task and snapshot readers.
///
/// Written only by the owning supervision task. Every field is independently
/// atomic; the latest probe result is swapped in whole behind a lock held
/// only for the swap or the copy out. There is no cross-field atomicity.
pub(crate) struct RunnerShared {
    name: String,
    critical: bool,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    total_failures: AtomicU64,
    total_recoveries: AtomicU64,
    total_restarts: AtomicU64,
    /// Epoch millis of the last state change; 0 until the first transition.
    last_transition_ms: AtomicU64,
    /// Epoch millis the target entered `Up`; 0 while not up.
    up_since_ms: AtomicU64,
    last_result: RwLock<Option<HealthResult>>,
}

impl RunnerShared {
    pub(crate) fn new(name: &str, critical: bool) -> Self {
        Self {
            name: name.to_string(),
            critical,
            state: AtomicU8::new(TargetState::Init as u8),
            consecutive_failures: AtomicU32::new(0),
            total_failures: AtomicU64::new(0),
            total_recoveries: AtomicU64::new(0),
            total_restarts: AtomicU64::new(0),
            last_transition_ms: AtomicU64::new(0),
            up_since_ms: AtomicU64::new(0),
            last_result: RwLock::new(None),
        }
    }

    pub(crate) fn state(&self) -> TargetState {
        TargetState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn critical(&self) -> bool {
        self.critical
    }

    /// Transition to `new`, recording the transition time and clearing the
    /// up-since mark when leaving `Up`. No-op when the state is unchanged.
    fn set_state(&self, new: TargetState) {
        let old = self.state.swap(new as u8, Ordering::AcqRel);
        if old == new as u8 {
            return;
        }
        self.last_transition_ms
            .store(epoch_millis(), Ordering::Release);
        if new != TargetState::Up {
            self.up_since_ms.store(0, Ordering::Release);
        }
    }

    fn mark_up(&self) {
        self.set_state(TargetState::Up);
        self.up_since_ms.store(epoch_millis(), Ordering::Release);
    }

    fn store_result(&self, result: HealthResult) {
        // Held only for the swap; readers copy the value out.
        *self.last_result.write().unwrap() = Some(result);
    }

    pub(crate) fn snapshot(&self) -> TargetSnapshot {
        let state = self.state();
        let up_since = self.up_since_ms.load(Ordering::Acquire);
        let uptime = if state == TargetState::Up && up_since > 0 {
            Some(format_uptime(Duration::from_millis(
                epoch_millis().saturating_sub(up_since),
            )))
        } else {
            None
        };
        TargetSnapshot {
            name: self.name.clone(),
            state,
            critical: self.critical,
            last_result: self.last_result.read().unwrap().clone(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
            total_failures: self.total_failures.load(Ordering::Acquire),
            total_recoveries: self.total_recoveries.load(Ordering::Acquire),
            total_restarts: self.total_restarts.load(Ordering::Acquire),
            last_transition_ms: self.last_transition_ms.load(Ordering::Acquire),
            uptime,
        }
    }
}

/// Supervises a single target: periodic probing, failure counting, and the
/// configured recovery protocol.
pub(crate) struct TargetRunner {
    target: Arc<dyn Target>,
    config: RunnerConfig,
    shared: Arc<RunnerShared>,
}

impl TargetRunner {
    pub(crate) fn new(
        target: Arc<dyn Target>,
        config: RunnerConfig,
        shared: Arc<RunnerShared>,
    ) -> Self {
        Self {
            target,
            config,
            shared,
        }
    }

    /// The supervision loop: immediate first probe, then one probe per tick,
    /// until shutdown is signalled or the target reaches `Failed`.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(name = %self.shared.name, "supervision loop starting");

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Time of the last restart attempt, for rate limiting. Only this
        // task touches it, so it stays a plain local.
        let mut last_restart: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_once(&mut shutdown, &mut last_restart).await;
                }
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            if self.shared.state() == TargetState::Failed {
                // Terminal until external re-registration.
                info!(name = %self.shared.name, "supervision ended in failed state");
                break;
            }
        }

        debug!(name = %self.shared.name, "supervision loop stopped");
    }

    async fn probe_once(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        last_restart: &mut Option<Instant>,
    ) {
        let started = Instant::now();
        let result = tokio::select! {
            probe = tokio::time::timeout(
                self.config.timeout,
                self.target.check(self.config.timeout),
            ) => match probe {
                Ok(result) => result,
                // The probe future is dropped here; a target wrapping a
                // non-cancellable blocking call may keep running detached.
                Err(_) => HealthResult::unhealthy(
                    format!("probe timed out after {:?}", self.config.timeout),
                    started.elapsed(),
                ),
            },
            // An in-flight probe must not delay shutdown by its timeout.
            _ = shutdown.changed() => return,
        };

        let healthy = result.healthy;
        self.shared.store_result(result);

        if healthy {
            self.handle_success().await;
        } else {
            self.handle_failure(shutdown, last_restart).await;
        }
    }

    async fn handle_success(&self) {
        self.shared.consecutive_failures.store(0, Ordering::Release);
        if self.shared.state() != TargetState::Up {
            self.shared.mark_up();
            info!(name = %self.shared.name, "target is up");
            self.target.on_up().await;
        }
    }

    async fn handle_failure(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        last_restart: &mut Option<Instant>,
    ) {
        let failures = self
            .shared
            .consecutive_failures
            .fetch_add(1, Ordering::AcqRel)
            + 1;
        self.shared.total_failures.fetch_add(1, Ordering::AcqRel);

        if failures < self.config.failure_threshold {
            warn!(
                name = %self.shared.name,
                failures,
                threshold = self.config.failure_threshold,
                "probe failed"
            );
            return;
        }

        match self.shared.state() {
            TargetState::Up | TargetState::Init => {
                error!(name = %self.shared.name, failures, "target is down");
                self.shared.set_state(TargetState::Down);
                self.target.on_down().await;
                self.dispatch_action(shutdown, last_restart).await;
            }
            // Already down (warn action): keep counting, fire nothing twice.
            _ => {
                warn!(name = %self.shared.name, failures, "target still down");
            }
        }
    }

    async fn dispatch_action(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        last_restart: &mut Option<Instant>,
    ) {
        match self.config.action {
            FailureAction::Warn => {
                warn!(
                    name = %self.shared.name,
                    "no recovery configured, leaving target down"
                );
            }
            FailureAction::Recover => self.run_recovery(shutdown).await,
            FailureAction::Restart => self.run_restart(shutdown, last_restart).await,
            FailureAction::Fail => {
                error!(
                    name = %self.shared.name,
                    exit_code = self.config.exit_code,
                    "target failed, escalation requested"
                );
                // Grace period first: the terminal state is the signal an
                // external supervisor acts on, so it must not surface until
                // the configured delay has fully elapsed.
                if let Some(delay) = self.config.exit_delay {
                    if !sleep_or_shutdown(delay, shutdown).await {
                        return;
                    }
                }
                self.shared.set_state(TargetState::Failed);
            }
        }
    }

    /// The reconnect/recover loop: `connect` with exponential backoff, then
    /// the target's own reconciliation. Returns once the target is up, the
    /// retry budget is exhausted, or shutdown is signalled.
    async fn run_recovery(&self, shutdown: &mut watch::Receiver<bool>) {
        // Two recovery sequences must never run for the same target; with a
        // single supervision task this check is all that is needed.
        if matches!(
            self.shared.state(),
            TargetState::Reconnecting | TargetState::Recovering
        ) {
            return;
        }
        self.shared.set_state(TargetState::Reconnecting);

        // Drop any stale connection state before dialing again.
        if let Err(e) = self.target.disconnect().await {
            debug!(name = %self.shared.name, error = %e, "disconnect failed");
        }

        // Attempt counter is fresh per down episode.
        let mut attempt: u32 = 0;
        loop {
            match self.target.connect().await {
                Ok(()) => {
                    self.shared.set_state(TargetState::Recovering);
                    match self.target.recover().await {
                        Ok(()) => {
                            self.shared.consecutive_failures.store(0, Ordering::Release);
                            self.shared.total_recoveries.fetch_add(1, Ordering::AcqRel);
                            self.shared.mark_up();
                            info!(name = %self.shared.name, attempt, "target recovered");
                            self.target.on_up().await;
                            return;
                        }
                        Err(e) => {
                            warn!(
                                name = %self.shared.name,
                                error = %e,
                                "recovery step failed"
                            );
                            self.shared.set_state(TargetState::Down);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        name = %self.shared.name,
                        error = %e,
                        attempt,
                        "reconnect failed"
                    );
                }
            }

            attempt += 1;
            if self.config.max_retries > 0 && attempt >= self.config.max_retries {
                error!(
                    name = %self.shared.name,
                    attempts = attempt,
                    "reconnect attempts exhausted"
                );
                self.shared.set_state(TargetState::Failed);
                return;
            }

            let delay =
                backoff_delay(self.config.backoff_base, self.config.backoff_cap, attempt - 1);
            debug!(name = %self.shared.name, ?delay, "waiting before next reconnect");
            if !sleep_or_shutdown(delay, shutdown).await {
                return;
            }
            if self.shared.state() == TargetState::Down {
                // A failed recovery step dropped us back; re-enter reconnect.
                self.shared.set_state(TargetState::Reconnecting);
            }
        }
    }

    /// The restart protocol: skip the restart if the backend is already
    /// reachable again, otherwise restart it (rate limited), poll for
    /// reachability, and fall through to the recover path regardless.
    async fn run_restart(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        last_restart: &mut Option<Instant>,
    ) {
        if matches!(
            self.shared.state(),
            TargetState::Reconnecting | TargetState::Recovering
        ) {
            return;
        }

        // The backend may have recovered on its own.
        if self.target.connect().await.is_ok() {
            debug!(name = %self.shared.name, "target reachable, skipping restart");
            self.run_recovery(shutdown).await;
            return;
        }

        if let Some(prev) = *last_restart {
            let since = prev.elapsed();
            if since < self.config.min_restart_interval {
                let wait = self.config.min_restart_interval - since;
                info!(name = %self.shared.name, ?wait, "restart rate limited");
                if !sleep_or_shutdown(wait, shutdown).await {
                    return;
                }
            }
        }
        *last_restart = Some(Instant::now());
        self.shared.total_restarts.fetch_add(1, Ordering::AcqRel);

        info!(name = %self.shared.name, "restarting target");
        if let Err(e) = self.target.restart().await {
            // Not fatal: the reachability poll and recovery attempt that
            // follow are still meaningful.
            warn!(name = %self.shared.name, error = %e, "restart failed");
        }

        let poll_deadline = Instant::now() + RESTART_POLL_CEILING;
        loop {
            if self.target.connect().await.is_ok() {
                debug!(name = %self.shared.name, "target reachable after restart");
                break;
            }
            if Instant::now() >= poll_deadline {
                warn!(name = %self.shared.name, "target not reachable after restart");
                break;
            }
            if !sleep_or_shutdown(RESTART_POLL_INTERVAL, shutdown).await {
                return;
            }
        }

        // Regardless of the poll outcome: the recover path does its own
        // connect and is the final arbiter of reachability.
        self.run_recovery(shutdown).await;
    }
}

/// Sleep for `dur`, racing the shutdown signal. Returns `false` when
/// shutdown won the race.
async fn sleep_or_shutdown(dur: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(dur) => true,
        _ = shutdown.changed() => false,
    }
}

/// Exponential backoff: `min(base * 2^attempt, cap)`.
pub(crate) fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(cap, |d| d.min(cap))
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Render a duration as a compact human-readable uptime, e.g. "2d 3h 4m 5s".
fn format_uptime(d: Duration) -> String {
    let total = d.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}d "));
    }
    if hours > 0 || days > 0 {
        out.push_str(&format!("{hours}h "));
    }
    if minutes > 0 || hours > 0 || days > 0 {
        out.push_str(&format!("{minutes}m "));
    }
    out.push_str(&format!("{seconds}s"));
    out
}
