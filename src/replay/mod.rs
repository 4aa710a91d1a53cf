//! Replay engine: drains persisted entries through the executor
//!
//! ## Drain loop
//!
//! Only one loop runs per engine. A second `process` call while a loop is
//! active returns [`ProcessOutcome::AlreadyRunning`] straight away; it does not
//! queue, recover or attempt anything.
//!
//! 1. Recover: every `processing` entry goes back to `pending`. A
//!    `processing` status is never trusted across a restart.
//! 2. While not paused:
//!    - wait for connectivity (poll every `offline_poll_interval`)
//!    - pick the oldest `concurrency` pending entries
//!    - run them concurrently, apply each transition, fire callbacks
//!    - with `stop_on_error`, a batch containing any failure is the last one
//! 3. Release the single-loop flag on every exit path.
//!
//! A failing batch member does not cancel its siblings: they finish and have
//! their transitions applied; only later batches are skipped.
//!
//! ## Pause
//!
//! `pause` raises a cancellation signal. In-flight attempts are dropped and
//! their entries stay `processing` until the next recovery pass. A backoff
//! sleep cut short by pause still re-arms its entry.

mod attempt;
pub mod error;

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::entry::{EntryPatch, EntryStatus, LedgerEntry};
use crate::executor::{ExecutionFailure, RequestExecutor};
use crate::observability::LifecycleHooks;
use crate::probe::OnlineProbe;
use crate::retry::RetryStrategy;
use crate::store::EntryStore;

use attempt::{Attempt, AttemptReport, cancelled};
pub use error::{ReplayError, Result};

pub type SuccessCallback = Box<dyn Fn(&LedgerEntry) + Send + Sync>;
pub type FailureCallback = Box<dyn Fn(&LedgerEntry, &ExecutionFailure) + Send + Sync>;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum attempts in flight per batch
    pub concurrency: usize,
    /// End the loop after the first batch containing a failure
    pub stop_on_error: bool,
    /// Sleep between connectivity checks while offline
    pub offline_poll_interval: Duration,
    pub retry: RetryStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            stop_on_error: false,
            offline_poll_interval: Duration::from_secs(1),
            retry: RetryStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Pending,
    Processing,
    Paused,
    Error,
}

/// Per-invocation options for [`ReplayEngine::process`]
#[derive(Default)]
pub struct ProcessOptions {
    pub on_success: Option<SuccessCallback>,
    pub on_failure: Option<FailureCallback>,
    /// Overrides [`EngineConfig::concurrency`]
    pub concurrency: Option<usize>,
    /// Overrides [`EngineConfig::stop_on_error`]
    pub stop_on_error: Option<bool>,
}

impl ProcessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&LedgerEntry) + Send + Sync + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(&LedgerEntry, &ExecutionFailure) + Send + Sync + 'static,
    {
        self.on_failure = Some(Box::new(callback));
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = Some(stop);
        self
    }
}

/// Counters for one drain loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    /// Entries reset from `processing` to `pending` at loop start
    pub recovered: usize,
    pub batches: usize,
    pub succeeded: usize,
    /// Retryable failures sent back to `pending`
    pub rearmed: usize,
    pub failed: usize,
    /// Attempts cancelled by pause
    pub abandoned: usize,
    pub stopped_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Another loop was active; nothing was done
    AlreadyRunning,
    Completed(ProcessSummary),
}

/// Clears the single-loop flag when dropped
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { running })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

pub struct ReplayEngine {
    store: Arc<dyn EntryStore>,
    executor: Arc<dyn RequestExecutor>,
    probe: Arc<dyn OnlineProbe>,
    hooks: Arc<dyn LifecycleHooks>,
    config: EngineConfig,
    running: AtomicBool,
    paused: AtomicBool,
    last_run_failed: AtomicBool,
    cancel: watch::Sender<bool>,
}

impl ReplayEngine {
    pub fn new(
        store: Arc<dyn EntryStore>,
        executor: Arc<dyn RequestExecutor>,
        probe: Arc<dyn OnlineProbe>,
        hooks: Arc<dyn LifecycleHooks>,
        config: EngineConfig,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            store,
            executor,
            probe,
            hooks,
            config,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            last_run_failed: AtomicBool::new(false),
            cancel,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Halt the loop and signal in-flight attempts to stop
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        self.cancel.send_replace(true);
        info!("Replay paused");
    }

    /// Lift the pause; does not start a loop by itself
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.cancel.send_replace(false);
        info!("Replay resumed");
    }

    /// Engine state given whether pending entries exist
    pub fn state_with(&self, has_pending: bool) -> EngineState {
        if self.is_paused() {
            EngineState::Paused
        } else if self.is_running() {
            EngineState::Processing
        } else if self.last_run_failed.load(Ordering::Acquire) {
            EngineState::Error
        } else if has_pending {
            EngineState::Pending
        } else {
            EngineState::Idle
        }
    }

    pub async fn state(&self) -> Result<EngineState> {
        let has_pending = self
            .store
            .get_all()
            .await?
            .iter()
            .any(|e| e.status == EntryStatus::Pending);
        Ok(self.state_with(has_pending))
    }

    /// Force every `processing` entry back to `pending`
    pub async fn recover(&self) -> Result<usize> {
        let mut recovered = 0;
        for entry in self.store.get_all().await? {
            if entry.status == EntryStatus::Processing {
                self.store
                    .update(&entry.id, EntryPatch::status(EntryStatus::Pending))
                    .await?;
                debug!(entry_id = %entry.id, "Recovered stale processing entry");
                recovered += 1;
            }
        }

        if recovered > 0 {
            info!(recovered, "Recovered stale entries");
        }
        Ok(recovered)
    }

    /// Run the drain loop, or return immediately if one is already active
    pub async fn process(&self, options: ProcessOptions) -> Result<ProcessOutcome> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            debug!("Drain loop already active, ignoring process call");
            return Ok(ProcessOutcome::AlreadyRunning);
        };

        let result = self.drain(&options).await;

        let failed = match &result {
            Ok(summary) => summary.stopped_on_error,
            Err(e) => {
                error!(error = %e, "Drain loop aborted");
                true
            }
        };
        self.last_run_failed.store(failed, Ordering::Release);

        result.map(ProcessOutcome::Completed)
    }

    async fn drain(&self, options: &ProcessOptions) -> Result<ProcessSummary> {
        let concurrency = options
            .concurrency
            .unwrap_or(self.config.concurrency)
            .max(1);
        let stop_on_error = options.stop_on_error.unwrap_or(self.config.stop_on_error);

        let mut summary = ProcessSummary {
            recovered: self.recover().await?,
            ..Default::default()
        };

        info!(concurrency, stop_on_error, "Drain loop started");

        while !self.is_paused() {
            if !self.probe.is_online().await {
                warn!(
                    poll_ms = self.config.offline_poll_interval.as_millis() as u64,
                    "Offline, waiting for connectivity"
                );
                if self.sleep_unless_cancelled(self.config.offline_poll_interval).await {
                    break;
                }
                continue;
            }

            let batch: Vec<LedgerEntry> = self
                .store
                .get_all()
                .await?
                .into_iter()
                .filter(|e| e.status == EntryStatus::Pending)
                .take(concurrency)
                .collect();

            if batch.is_empty() {
                break;
            }

            summary.batches += 1;
            let batch_failed = self.run_batch(batch, options, &mut summary).await?;

            if batch_failed && stop_on_error {
                info!(batch = summary.batches, "Stopping after failed batch");
                summary.stopped_on_error = true;
                break;
            }
        }

        info!(
            batches = summary.batches,
            succeeded = summary.succeeded,
            failed = summary.failed,
            rearmed = summary.rearmed,
            abandoned = summary.abandoned,
            "Drain loop finished"
        );
        Ok(summary)
    }

    /// Execute one batch; returns whether any member failed
    async fn run_batch(
        &self,
        batch: Vec<LedgerEntry>,
        options: &ProcessOptions,
        summary: &mut ProcessSummary,
    ) -> Result<bool> {
        debug!(batch_size = batch.len(), "Running batch");

        let mut join_set = JoinSet::new();
        for entry in batch {
            let attempt = Attempt {
                store: self.store.clone(),
                executor: self.executor.clone(),
                hooks: self.hooks.clone(),
                retry: self.config.retry.clone(),
                cancel: self.cancel.subscribe(),
            };
            join_set.spawn(attempt.run(entry));
        }

        let mut any_failed = false;
        let mut fatal: Option<ReplayError> = None;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(AttemptReport::Succeeded { entry, .. })) => {
                    summary.succeeded += 1;
                    if let Some(callback) = &options.on_success {
                        callback(&entry);
                    }
                }
                Ok(Ok(AttemptReport::Rearmed { entry, failure })) => {
                    summary.rearmed += 1;
                    any_failed = true;
                    if let Some(callback) = &options.on_failure {
                        callback(&entry, &failure);
                    }
                }
                Ok(Ok(AttemptReport::Failed { entry, failure })) => {
                    summary.failed += 1;
                    any_failed = true;
                    if let Some(callback) = &options.on_failure {
                        callback(&entry, &failure);
                    }
                }
                Ok(Ok(AttemptReport::Abandoned { .. })) => {
                    summary.abandoned += 1;
                }
                // Entry removed by an operator while its attempt was in flight
                Ok(Err(ReplayError::Store(e))) if !e.is_persistence() => {
                    warn!(error = %e, "Entry vanished during replay, skipping");
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Status update failed during replay");
                    any_failed = true;
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "Attempt task did not complete");
                    any_failed = true;
                    fatal.get_or_insert(ReplayError::Task(e.to_string()));
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(any_failed),
        }
    }

    /// Sleep for `duration`; returns true if pause cut it short
    async fn sleep_unless_cancelled(&self, duration: Duration) -> bool {
        let mut rx = self.cancel.subscribe();
        if *rx.borrow() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = cancelled(&mut rx) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutionOutcome, ExecutionResponse};
    use crate::entry::RequestSnapshot;
    use crate::observability::NoopHooks;
    use crate::probe::ManualProbe;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Executor replaying scripted outcomes per URL; defaults to success
    #[derive(Default)]
    struct ScriptedExecutor {
        scripts: Mutex<HashMap<String, VecDeque<ExecutionOutcome>>>,
        calls: Mutex<Vec<String>>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn script(&self, url: &str, outcomes: Vec<ExecutionOutcome>) {
            self.scripts
                .lock()
                .unwrap()
                .insert(url.to_string(), outcomes.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RequestExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            request: &RequestSnapshot,
            _idempotency_key: Option<&str>,
        ) -> ExecutionOutcome {
            self.calls.lock().unwrap().push(request.url.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.scripts
                .lock()
                .unwrap()
                .get_mut(&request.url)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(ok)
        }
    }

    fn ok() -> ExecutionOutcome {
        ExecutionOutcome::Success(ExecutionResponse {
            status: 200,
            headers: Default::default(),
            body: Bytes::new(),
        })
    }

    fn server_error() -> ExecutionOutcome {
        ExecutionOutcome::Retryable(ExecutionFailure::status(503, "unavailable"))
    }

    fn client_error() -> ExecutionOutcome {
        ExecutionOutcome::Terminal(ExecutionFailure::status(400, "bad request"))
    }

    fn entry(id: &str, created_at: i64) -> LedgerEntry {
        LedgerEntry::new(id, RequestSnapshot::new("POST", format!("https://api.test/{}", id)), created_at)
    }

    fn fast_retry(max_attempts: u32) -> RetryStrategy {
        RetryStrategy::Fixed {
            delay_ms: 1,
            max_attempts,
        }
    }

    fn engine(
        store: Arc<MemoryStore>,
        executor: Arc<ScriptedExecutor>,
        config: EngineConfig,
    ) -> ReplayEngine {
        ReplayEngine::new(
            store,
            executor,
            Arc::new(ManualProbe::online()),
            Arc::new(NoopHooks),
            config,
        )
    }

    fn summary(outcome: ProcessOutcome) -> ProcessSummary {
        match outcome {
            ProcessOutcome::Completed(summary) => summary,
            ProcessOutcome::AlreadyRunning => panic!("expected a completed loop"),
        }
    }

    #[tokio::test]
    async fn test_drains_in_created_at_order() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("c", 3000)).await.unwrap();
        store.put(entry("a", 1000)).await.unwrap();
        store.put(entry("b", 2000)).await.unwrap();

        let executor = Arc::new(ScriptedExecutor::default());
        let engine = engine(store.clone(), executor.clone(), EngineConfig::default());

        let result = summary(engine.process(ProcessOptions::new()).await.unwrap());
        assert_eq!(result.succeeded, 3);
        assert_eq!(
            executor.calls(),
            vec!["https://api.test/a", "https://api.test/b", "https://api.test/c"]
        );
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(engine.state().await.unwrap(), EngineState::Idle);
    }

    #[tokio::test]
    async fn test_terminal_failure_skips_remaining_budget() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("a", 1000)).await.unwrap();

        let executor = Arc::new(ScriptedExecutor::default());
        executor.script("https://api.test/a", vec![client_error()]);

        let config = EngineConfig {
            retry: fast_retry(5),
            ..Default::default()
        };
        let engine = engine(store.clone(), executor.clone(), config);
        let result = summary(engine.process(ProcessOptions::new()).await.unwrap());

        assert_eq!(result.failed, 1);
        assert_eq!(executor.calls().len(), 1);

        let stored = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.status, EntryStatus::Failed);
        assert_eq!(stored.attempt_count, 1);
        assert_eq!(stored.error.unwrap().code.as_deref(), Some("HTTP_400"));
    }

    #[tokio::test]
    async fn test_retryable_failure_rearms_until_success() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("a", 1000)).await.unwrap();

        let executor = Arc::new(ScriptedExecutor::default());
        executor.script("https://api.test/a", vec![server_error(), server_error(), ok()]);

        let config = EngineConfig {
            retry: fast_retry(5),
            ..Default::default()
        };
        let engine = engine(store.clone(), executor.clone(), config);
        let result = summary(engine.process(ProcessOptions::new()).await.unwrap());

        assert_eq!(result.rearmed, 2);
        assert_eq!(result.succeeded, 1);
        assert_eq!(executor.calls().len(), 3);
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retryable_failure_with_exhausted_budget_fails() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("a", 1000)).await.unwrap();

        let executor = Arc::new(ScriptedExecutor::default());
        executor.script(
            "https://api.test/a",
            vec![server_error(), server_error(), server_error(), server_error()],
        );

        let config = EngineConfig {
            retry: fast_retry(3),
            ..Default::default()
        };
        let engine = engine(store.clone(), executor.clone(), config);
        let result = summary(engine.process(ProcessOptions::new()).await.unwrap());

        // max_attempts bounds total attempts: 3 calls, then failed
        assert_eq!(executor.calls().len(), 3);
        assert_eq!(result.rearmed, 2);
        assert_eq!(result.failed, 1);

        let stored = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.status, EntryStatus::Failed);
        assert_eq!(stored.attempt_count, 3);
        assert!(stored.last_attempt_at.is_some());
    }

    #[tokio::test]
    async fn test_manual_strategy_fails_on_first_retryable_error() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("a", 1000)).await.unwrap();

        let executor = Arc::new(ScriptedExecutor::default());
        executor.script("https://api.test/a", vec![server_error()]);

        let config = EngineConfig {
            retry: RetryStrategy::Manual,
            ..Default::default()
        };
        let engine = engine(store.clone(), executor.clone(), config);
        summary(engine.process(ProcessOptions::new()).await.unwrap());

        assert_eq!(store.get("a").await.unwrap().unwrap().status, EntryStatus::Failed);
    }

    #[tokio::test]
    async fn test_recovery_resets_processing_entries() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("stuck", 1000)).await.unwrap();
        store
            .update("stuck", EntryPatch::attempt_started(1, 1500))
            .await
            .unwrap();

        let executor = Arc::new(ScriptedExecutor::default());
        let engine = engine(store.clone(), executor.clone(), EngineConfig::default());

        let result = summary(engine.process(ProcessOptions::new()).await.unwrap());
        assert_eq!(result.recovered, 1);
        assert_eq!(result.succeeded, 1);
        assert_eq!(executor.calls(), vec!["https://api.test/stuck"]);
    }

    #[tokio::test]
    async fn test_concurrency_bounds_batch_size() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..7 {
            store.put(entry(&format!("e{}", i), 1000 + i)).await.unwrap();
        }

        let executor = Arc::new(ScriptedExecutor {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let config = EngineConfig {
            concurrency: 3,
            ..Default::default()
        };
        let engine = engine(store.clone(), executor.clone(), config);
        let result = summary(engine.process(ProcessOptions::new()).await.unwrap());

        assert_eq!(result.succeeded, 7);
        assert_eq!(result.batches, 3);
        assert!(executor.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_stop_on_error_lets_siblings_finish() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("a", 1000)).await.unwrap();
        store.put(entry("b", 2000)).await.unwrap();
        store.put(entry("c", 3000)).await.unwrap();

        let executor = Arc::new(ScriptedExecutor::default());
        executor.script("https://api.test/a", vec![client_error()]);

        let config = EngineConfig {
            concurrency: 2,
            stop_on_error: true,
            ..Default::default()
        };
        let engine = engine(store.clone(), executor.clone(), config);
        let result = summary(engine.process(ProcessOptions::new()).await.unwrap());

        // The sibling in the failing batch completed; the next batch never ran
        assert!(result.stopped_on_error);
        assert_eq!(result.batches, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.succeeded, 1);
        assert!(store.get("b").await.unwrap().is_none());
        assert_eq!(store.get("c").await.unwrap().unwrap().status, EntryStatus::Pending);
        assert_eq!(engine.state().await.unwrap(), EngineState::Error);
    }

    #[tokio::test]
    async fn test_second_process_call_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("a", 1000)).await.unwrap();

        let executor = Arc::new(ScriptedExecutor {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let engine = engine(store.clone(), executor.clone(), EngineConfig::default());

        let (first, second) = tokio::join!(
            engine.process(ProcessOptions::new()),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                engine.process(ProcessOptions::new()).await
            }
        );

        assert!(matches!(first.unwrap(), ProcessOutcome::Completed(s) if s.succeeded == 1));
        assert_eq!(second.unwrap(), ProcessOutcome::AlreadyRunning);
        assert_eq!(executor.calls().len(), 1);
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_pause_abandons_in_flight_attempt() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("slow", 1000)).await.unwrap();

        let executor = Arc::new(ScriptedExecutor {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let engine = engine(store.clone(), executor.clone(), EngineConfig::default());

        let (outcome, _) = tokio::join!(engine.process(ProcessOptions::new()), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            engine.pause();
        });

        let result = summary(outcome.unwrap());
        assert_eq!(result.abandoned, 1);
        assert_eq!(engine.state().await.unwrap(), EngineState::Paused);

        // Pause does not revert the in-flight entry
        let stored = store.get("slow").await.unwrap().unwrap();
        assert_eq!(stored.status, EntryStatus::Processing);

        // Resume alone starts nothing; the next loop recovers the entry
        engine.resume();
        assert_eq!(store.get("slow").await.unwrap().unwrap().status, EntryStatus::Processing);
        assert_eq!(engine.recover().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_offline_wait_ends_on_pause() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("a", 1000)).await.unwrap();

        let executor = Arc::new(ScriptedExecutor::default());
        let engine = ReplayEngine::new(
            store.clone(),
            executor.clone(),
            Arc::new(ManualProbe::offline()),
            Arc::new(NoopHooks),
            EngineConfig {
                offline_poll_interval: Duration::from_millis(10),
                ..Default::default()
            },
        );

        let (outcome, _) = tokio::join!(engine.process(ProcessOptions::new()), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            engine.pause();
        });

        assert_eq!(summary(outcome.unwrap()).batches, 0);
        assert!(executor.calls().is_empty());
        assert_eq!(store.get("a").await.unwrap().unwrap().status, EntryStatus::Pending);
    }

    #[tokio::test]
    async fn test_offline_wait_resumes_when_back_online() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("a", 1000)).await.unwrap();

        let executor = Arc::new(ScriptedExecutor::default());
        let probe = Arc::new(ManualProbe::offline());
        let engine = ReplayEngine::new(
            store.clone(),
            executor.clone(),
            probe.clone(),
            Arc::new(NoopHooks),
            EngineConfig {
                offline_poll_interval: Duration::from_millis(10),
                ..Default::default()
            },
        );

        let (outcome, _) = tokio::join!(engine.process(ProcessOptions::new()), async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            probe.set_online(true);
        });

        assert_eq!(summary(outcome.unwrap()).succeeded, 1);
    }

    #[tokio::test]
    async fn test_callbacks_receive_post_update_entries() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("ok", 1000)).await.unwrap();
        store.put(entry("bad", 2000)).await.unwrap();

        let executor = Arc::new(ScriptedExecutor::default());
        executor.script("https://api.test/bad", vec![client_error()]);
        let engine = engine(store.clone(), executor.clone(), EngineConfig::default());

        let successes = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(Vec::new()));
        let s = successes.clone();
        let f = failures.clone();

        engine
            .process(
                ProcessOptions::new()
                    .on_success(move |entry| s.lock().unwrap().push((entry.id.clone(), entry.status)))
                    .on_failure(move |entry, failure| {
                        f.lock().unwrap().push((entry.id.clone(), entry.status, failure.code.clone()))
                    }),
            )
            .await
            .unwrap();

        assert_eq!(
            *successes.lock().unwrap(),
            vec![("ok".to_string(), EntryStatus::Completed)]
        );
        assert_eq!(
            *failures.lock().unwrap(),
            vec![(
                "bad".to_string(),
                EntryStatus::Failed,
                Some("HTTP_400".to_string())
            )]
        );
    }

    #[test]
    fn test_state_precedence() {
        let engine = engine(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedExecutor::default()),
            EngineConfig::default(),
        );
        assert_eq!(engine.state_with(false), EngineState::Idle);
        assert_eq!(engine.state_with(true), EngineState::Pending);

        engine.pause();
        assert_eq!(engine.state_with(true), EngineState::Paused);
        engine.resume();
        assert_eq!(engine.state_with(true), EngineState::Pending);
    }

    /// MemoryStore whose writes to `failed` hit a broken medium
    struct BrokenFailedWrites {
        inner: MemoryStore,
    }

    #[async_trait]
    impl EntryStore for BrokenFailedWrites {
        async fn put(&self, entry: LedgerEntry) -> crate::store::Result<()> {
            self.inner.put(entry).await
        }

        async fn get_all(&self) -> crate::store::Result<Vec<LedgerEntry>> {
            self.inner.get_all().await
        }

        async fn get(&self, id: &str) -> crate::store::Result<Option<LedgerEntry>> {
            self.inner.get(id).await
        }

        async fn update(&self, id: &str, patch: EntryPatch) -> crate::store::Result<LedgerEntry> {
            if patch.status == Some(EntryStatus::Failed) {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.inner.update(id, patch).await
        }

        async fn remove(&self, id: &str) -> crate::store::Result<()> {
            self.inner.remove(id).await
        }

        async fn clear(&self) -> crate::store::Result<()> {
            self.inner.clear().await
        }

        async fn count(&self) -> crate::store::Result<usize> {
            self.inner.count().await
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_on_status_update_ends_loop() {
        let store = Arc::new(BrokenFailedWrites {
            inner: MemoryStore::new(),
        });
        store.put(entry("a", 1000)).await.unwrap();
        store.put(entry("b", 2000)).await.unwrap();

        let executor = Arc::new(ScriptedExecutor::default());
        executor.script("https://api.test/a", vec![client_error()]);

        let engine = ReplayEngine::new(
            store.clone(),
            executor.clone(),
            Arc::new(ManualProbe::online()),
            Arc::new(NoopHooks),
            EngineConfig {
                retry: fast_retry(3),
                ..Default::default()
            },
        );

        let err = engine.process(ProcessOptions::new()).await.unwrap_err();
        assert!(matches!(err, ReplayError::Store(StoreError::Unavailable(_))));

        // No batch after the fatal one
        assert_eq!(executor.calls(), vec!["https://api.test/a"]);
        assert_eq!(store.get("b").await.unwrap().unwrap().status, EntryStatus::Pending);
        assert_eq!(engine.state().await.unwrap(), EngineState::Error);
        assert!(!engine.is_running());
    }
}
