//! Watchdog — the aggregate registry of supervised targets.
//!
//! Owns every [`TargetRunner`], starts and stops them under one shared
//! lifecycle, and answers aggregate queries (per-target snapshot, all
//! snapshots, global readiness). The name→runner map sits behind a
//! reader/writer lock; registration is rare next to the high-frequency
//! per-runner state updates, which use their own atomics and never touch
//! this lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::error::WatchdogError;
use crate::runner::{RunnerShared, TargetRunner, TargetSnapshot};
use crate::target::{Target, TargetState};

struct RunnerSlot {
    shared: Arc<RunnerShared>,
    shutdown_tx: watch::Sender<bool>,
    /// Runner waiting to be spawned; taken by `start` (or immediately at
    /// registration when the watchdog is already running).
    pending: Option<(TargetRunner, watch::Receiver<bool>)>,
    handle: Option<JoinHandle<()>>,
}

/// Registry of supervised targets with one shared lifecycle.
pub struct Watchdog {
    slots: RwLock<HashMap<String, RunnerSlot>>,
    /// Serializes registrations so two calls for one name can never both
    /// claim, and then orphan, the same previous runner.
    registration: Mutex<()>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            registration: Mutex::new(()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Register a target for supervision.
    ///
    /// Re-registering a name stops the previous runner's loop (and waits for
    /// it to exit) before installing the replacement, so two supervision
    /// tasks never run for the same name. If the watchdog is already
    /// started, the new runner's loop is spawned immediately. A registration
    /// that races `stop` is refused rather than left running unjoined.
    pub async fn register(
        &self,
        target: Arc<dyn Target>,
        config: RunnerConfig,
    ) -> Result<(), WatchdogError> {
        let _registration = self.registration.lock().await;
        if self.stopped.load(Ordering::SeqCst) {
            return Err(WatchdogError::Stopped);
        }
        let name = target.name().to_string();

        let old = self.slots.write().unwrap().remove(&name);
        if let Some(mut slot) = old {
            warn!(name = %name, "replacing existing runner");
            let _ = slot.shutdown_tx.send(true);
            if let Some(handle) = slot.handle.take() {
                if let Err(e) = handle.await {
                    warn!(name = %name, error = %e, "old runner did not exit cleanly");
                }
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(RunnerShared::new(&name, target.critical()));
        let runner = TargetRunner::new(target, config, shared.clone());

        let mut slot = RunnerSlot {
            shared,
            shutdown_tx,
            pending: Some((runner, shutdown_rx)),
            handle: None,
        };
        {
            let mut slots = self.slots.write().unwrap();
            // stop() may have drained the map while the old runner was being
            // awaited; spawning and inserting now would leave a loop that no
            // one ever signals or joins.
            if self.stopped.load(Ordering::SeqCst) {
                return Err(WatchdogError::Stopped);
            }
            if self.started.load(Ordering::SeqCst) {
                let (runner, rx) = slot.pending.take().unwrap();
                debug!(name = %name, "starting supervision loop");
                slot.handle = Some(tokio::spawn(runner.run(rx)));
            }
            slots.insert(name.clone(), slot);
        }
        info!(name = %name, "target registered");
        Ok(())
    }

    /// Spawn the supervision loop of every registered runner.
    ///
    /// Must be called from within a tokio runtime; valid once per watchdog
    /// lifetime.
    pub fn start(&self) -> Result<(), WatchdogError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(WatchdogError::Stopped);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(WatchdogError::AlreadyStarted);
        }

        let mut slots = self.slots.write().unwrap();
        for (name, slot) in slots.iter_mut() {
            if let Some((runner, rx)) = slot.pending.take() {
                debug!(name = %name, "starting supervision loop");
                slot.handle = Some(tokio::spawn(runner.run(rx)));
            }
        }
        info!(targets = slots.len(), "watchdog started");
        Ok(())
    }

    /// Signal every runner to stop and wait for every loop to fully exit.
    ///
    /// Idempotent; safe to call before `start`. After `stop` returns no
    /// runner is mid-probe.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);

        let handles: Vec<(String, JoinHandle<()>)> = {
            let mut slots = self.slots.write().unwrap();
            slots
                .iter_mut()
                .filter_map(|(name, slot)| {
                    let _ = slot.shutdown_tx.send(true);
                    slot.handle.take().map(|h| (name.clone(), h))
                })
                .collect()
        };

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                warn!(name = %name, error = %e, "runner did not exit cleanly");
            }
        }
        info!("watchdog stopped");
    }

    /// Snapshot of one target, if registered.
    pub fn state(&self, name: &str) -> Option<TargetSnapshot> {
        self.slots
            .read()
            .unwrap()
            .get(name)
            .map(|slot| slot.shared.snapshot())
    }

    /// Snapshots of every registered target, ordered by name.
    pub fn all_states(&self) -> Vec<TargetSnapshot> {
        let slots = self.slots.read().unwrap();
        let mut snapshots: Vec<TargetSnapshot> =
            slots.values().map(|slot| slot.shared.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// True iff every critical target is currently up. Non-critical targets
    /// never affect readiness.
    pub fn is_ready(&self) -> bool {
        self.slots
            .read()
            .unwrap()
            .values()
            .all(|slot| !slot.shared.critical() || slot.shared.state() == TargetState::Up)
    }

    /// Whether a target name is currently registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.slots.read().unwrap().contains_key(name)
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}
