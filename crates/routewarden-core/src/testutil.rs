//! Scripted target implementation for tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;

use crate::target::{HealthResult, Target};

/// Replays a fixed script of outcomes, repeating the last entry once the
/// script is exhausted. An empty script always succeeds.
struct Script {
    outcomes: Vec<bool>,
    next: AtomicUsize,
}

impl Script {
    fn new(outcomes: &[bool]) -> Self {
        Self {
            outcomes: outcomes.to_vec(),
            next: AtomicUsize::new(0),
        }
    }

    fn take(&self) -> bool {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.get(i) {
            Some(v) => *v,
            None => self.outcomes.last().copied().unwrap_or(true),
        }
    }

    fn calls(&self) -> u32 {
        self.next.load(Ordering::SeqCst) as u32
    }
}

/// A programmable [`Target`] with per-operation outcome scripts and call
/// counters.
pub(crate) struct MockTarget {
    name: String,
    critical: bool,
    probe_hangs: bool,
    probes: Script,
    connects: Script,
    recovers: Script,
    restarts: AtomicU32,
    restart_times: Mutex<Vec<tokio::time::Instant>>,
    on_up: AtomicU32,
    on_down: AtomicU32,
}

impl MockTarget {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            critical: true,
            probe_hangs: false,
            probes: Script::new(&[]),
            connects: Script::new(&[]),
            recovers: Script::new(&[]),
            restarts: AtomicU32::new(0),
            restart_times: Mutex::new(Vec::new()),
            on_up: AtomicU32::new(0),
            on_down: AtomicU32::new(0),
        }
    }

    pub(crate) fn not_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    pub(crate) fn always_unhealthy(mut self) -> Self {
        self.probes = Script::new(&[false]);
        self
    }

    pub(crate) fn probe_script(mut self, outcomes: &[bool]) -> Self {
        self.probes = Script::new(outcomes);
        self
    }

    pub(crate) fn probe_hangs(mut self) -> Self {
        self.probe_hangs = true;
        self
    }

    pub(crate) fn connect_script(mut self, outcomes: &[bool]) -> Self {
        self.connects = Script::new(outcomes);
        self
    }

    pub(crate) fn recover_script(mut self, outcomes: &[bool]) -> Self {
        self.recovers = Script::new(outcomes);
        self
    }

    pub(crate) fn probe_calls(&self) -> u32 {
        self.probes.calls()
    }

    pub(crate) fn connect_calls(&self) -> u32 {
        self.connects.calls()
    }

    pub(crate) fn recover_calls(&self) -> u32 {
        self.recovers.calls()
    }

    pub(crate) fn restart_calls(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    pub(crate) fn restart_times(&self) -> Vec<tokio::time::Instant> {
        self.restart_times.lock().unwrap().clone()
    }

    pub(crate) fn on_up_calls(&self) -> u32 {
        self.on_up.load(Ordering::SeqCst)
    }

    pub(crate) fn on_down_calls(&self) -> u32 {
        self.on_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Target for MockTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn critical(&self) -> bool {
        self.critical
    }

    async fn check(&self, _timeout: Duration) -> HealthResult {
        if self.probe_hangs {
            std::future::pending::<()>().await;
        }
        if self.probes.take() {
            HealthResult::healthy(Duration::from_millis(1))
        } else {
            HealthResult::unhealthy("scripted failure", Duration::from_millis(1))
        }
    }

    async fn connect(&self) -> anyhow::Result<()> {
        if self.connects.take() {
            Ok(())
        } else {
            bail!("scripted connect failure")
        }
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn restart(&self) -> anyhow::Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        self.restart_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        Ok(())
    }

    async fn recover(&self) -> anyhow::Result<()> {
        if self.recovers.take() {
            Ok(())
        } else {
            bail!("scripted recover failure")
        }
    }

    async fn on_up(&self) {
        self.on_up.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_down(&self) {
        self.on_down.fetch_add(1, Ordering::SeqCst);
    }
}
