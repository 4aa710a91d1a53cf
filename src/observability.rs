//! Observability: lifecycle hooks, counters and tracing setup

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

use crate::entry::LedgerEntry;
use crate::executor::ExecutionFailure;

/// Observer notified at each lifecycle step of an entry
///
/// Hooks have no control-flow effect; every method defaults to a no-op.
pub trait LifecycleHooks: Send + Sync {
    /// Entry durably persisted for later replay
    fn on_persist(&self, _entry: &LedgerEntry) {}

    /// Replay attempt starting (entry already marked `processing`)
    fn on_replay_start(&self, _entry: &LedgerEntry) {}

    /// Replay succeeded and the entry was removed
    fn on_replay_success(&self, _entry: &LedgerEntry) {}

    /// Replay failed; `entry` reflects the state after the transition
    fn on_replay_failure(&self, _entry: &LedgerEntry, _failure: &ExecutionFailure) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    entries_persisted: AtomicU64,
    replays_started: AtomicU64,
    replays_succeeded: AtomicU64,
    replays_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            entries_persisted: self.entries_persisted.load(Ordering::Relaxed),
            replays_started: self.replays_started.load(Ordering::Relaxed),
            replays_succeeded: self.replays_succeeded.load(Ordering::Relaxed),
            replays_failed: self.replays_failed.load(Ordering::Relaxed),
        }
    }
}

impl LifecycleHooks for Metrics {
    fn on_persist(&self, entry: &LedgerEntry) {
        self.entries_persisted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "entries_persisted", entry_id = %entry.id, "Metric incremented");
    }

    fn on_replay_start(&self, entry: &LedgerEntry) {
        self.replays_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "replays_started", entry_id = %entry.id, "Metric incremented");
    }

    fn on_replay_success(&self, entry: &LedgerEntry) {
        self.replays_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "replays_succeeded", entry_id = %entry.id, "Metric incremented");
    }

    fn on_replay_failure(&self, entry: &LedgerEntry, failure: &ExecutionFailure) {
        self.replays_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            counter = "replays_failed",
            entry_id = %entry.id,
            kind = %failure.kind,
            "Metric incremented"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub entries_persisted: u64,
    pub replays_started: u64,
    pub replays_succeeded: u64,
    pub replays_failed: u64,
}

/// Install the global fmt subscriber, honoring `RUST_LOG` (default `info`)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
