//! Ledger facade: the public operation surface
//!
//! Wires a store, an executor and a probe into a [`ReplayEngine`] and exposes
//! enqueue-or-execute, inspection, manual retry, pause/resume and destroy.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use replaybox::executor::{HttpConfig, HttpExecutor};
//! # use replaybox::ledger::{Ledger, RequestOptions};
//! # use replaybox::entry::RequestSnapshot;
//! # use replaybox::store::MemoryStore;
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Ledger::builder(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(HttpExecutor::new(HttpConfig::default())?),
//! )
//! .build();
//!
//! let snapshot = RequestSnapshot::new("POST", "https://api.example.com/orders")
//!     .with_body(r#"{"sku":"A-1"}"#);
//! ledger.request(RequestOptions::new(snapshot)).await?;
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entry::{EntryPatch, EntryStatus, LedgerEntry, RequestSnapshot, now_ms};
use crate::executor::{ExecutionFailure, ExecutionOutcome, ExecutionResponse, RequestExecutor};
use crate::observability::{LifecycleHooks, NoopHooks};
use crate::probe::{ManualProbe, OnlineProbe};
use crate::replay::{
    EngineConfig, EngineState, ProcessOptions, ProcessOutcome, ReplayEngine, ReplayError,
};
use crate::store::{EntryStore, StoreError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger has been destroyed")]
    Destroyed,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("Entry {id} is {actual}, expected {expected}")]
    InvalidState {
        id: String,
        actual: EntryStatus,
        expected: EntryStatus,
    },

    #[error("Request failed: {0}")]
    Request(ExecutionFailure),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// A write-intent request plus its caller data
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub request: RequestSnapshot,
    /// Entry id; a UUIDv7 is generated when absent
    pub id: Option<String>,
    pub idempotency_key: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl RequestOptions {
    pub fn new(request: RequestSnapshot) -> Self {
        Self {
            request,
            id: None,
            idempotency_key: None,
            metadata: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "result", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Executed immediately
    Completed(ExecutionResponse),
    /// Persisted for replay
    Queued(LedgerEntry),
}

/// Engine state plus per-status entry counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerState {
    pub state: EngineState,
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
    pub running: bool,
    pub paused: bool,
}

pub struct LedgerBuilder {
    store: Arc<dyn EntryStore>,
    executor: Arc<dyn RequestExecutor>,
    probe: Option<Arc<dyn OnlineProbe>>,
    hooks: Option<Arc<dyn LifecycleHooks>>,
    config: EngineConfig,
}

impl LedgerBuilder {
    /// Defaults to an always-online [`ManualProbe`]
    pub fn probe(mut self, probe: Arc<dyn OnlineProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Ledger {
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(ManualProbe::online()));
        let hooks = self.hooks.unwrap_or_else(|| Arc::new(NoopHooks));

        let engine = Arc::new(ReplayEngine::new(
            self.store.clone(),
            self.executor.clone(),
            probe.clone(),
            hooks.clone(),
            self.config,
        ));

        Ledger {
            inner: Arc::new(LedgerInner {
                store: self.store,
                executor: self.executor,
                probe,
                hooks,
                engine,
                destroyed: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }
}

struct LedgerInner {
    store: Arc<dyn EntryStore>,
    executor: Arc<dyn RequestExecutor>,
    probe: Arc<dyn OnlineProbe>,
    hooks: Arc<dyn LifecycleHooks>,
    engine: Arc<ReplayEngine>,
    destroyed: AtomicBool,
    /// Connectivity listeners and background drains, aborted on destroy
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Cheaply cloneable handle to one ledger
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<LedgerInner>,
}

impl Ledger {
    pub fn builder(
        store: Arc<dyn EntryStore>,
        executor: Arc<dyn RequestExecutor>,
    ) -> LedgerBuilder {
        LedgerBuilder {
            store,
            executor,
            probe: None,
            hooks: None,
            config: EngineConfig::default(),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.inner.destroyed.load(Ordering::Acquire) {
            return Err(LedgerError::Destroyed);
        }
        Ok(())
    }

    pub fn engine(&self) -> &ReplayEngine {
        &self.inner.engine
    }

    /// Execute now when online, otherwise persist for replay
    ///
    /// Network-classified failures of the immediate attempt are swallowed and
    /// the request is queued. Any other failure is returned as
    /// [`LedgerError::Request`] and nothing is persisted.
    pub async fn request(&self, options: RequestOptions) -> Result<RequestOutcome> {
        self.ensure_live()?;

        if self.inner.probe.is_online().await {
            let outcome = self
                .inner
                .executor
                .execute(&options.request, options.idempotency_key.as_deref())
                .await;

            match outcome {
                ExecutionOutcome::Success(response) => {
                    debug!(url = %options.request.url, status = response.status, "Request completed immediately");
                    return Ok(RequestOutcome::Completed(response));
                }
                ExecutionOutcome::Retryable(failure) | ExecutionOutcome::Terminal(failure)
                    if failure.is_network() =>
                {
                    warn!(url = %options.request.url, error = %failure, "Network failure, queueing request");
                }
                ExecutionOutcome::Retryable(failure) | ExecutionOutcome::Terminal(failure) => {
                    return Err(LedgerError::Request(failure));
                }
            }
        } else {
            debug!(url = %options.request.url, "Offline, queueing request without attempting");
        }

        self.persist(options).await.map(RequestOutcome::Queued)
    }

    /// Persist without attempting
    pub async fn enqueue(&self, options: RequestOptions) -> Result<LedgerEntry> {
        self.ensure_live()?;
        self.persist(options).await
    }

    async fn persist(&self, options: RequestOptions) -> Result<LedgerEntry> {
        let id = options
            .id
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        let mut entry = LedgerEntry::new(id, options.request, now_ms());
        entry.idempotency_key = options.idempotency_key;
        entry.metadata = options.metadata;

        self.inner.store.put(entry.clone()).await?;
        self.inner.hooks.on_persist(&entry);
        info!(entry_id = %entry.id, method = %entry.request.method, url = %entry.request.url, "Entry persisted");

        Ok(entry)
    }

    pub async fn process(&self, options: ProcessOptions) -> Result<ProcessOutcome> {
        self.ensure_live()?;
        Ok(self.inner.engine.process(options).await?)
    }

    /// Re-arm a `failed` entry; its attempt count is kept
    pub async fn retry(&self, id: &str) -> Result<LedgerEntry> {
        self.ensure_live()?;

        let entry = self
            .inner
            .store
            .get(id)
            .await?
            .ok_or_else(|| StoreError::EntryNotFound(id.to_string()))?;

        if entry.status != EntryStatus::Failed {
            return Err(LedgerError::InvalidState {
                id: id.to_string(),
                actual: entry.status,
                expected: EntryStatus::Failed,
            });
        }

        let retry = &self.inner.engine.config().retry;
        if !retry.is_retry_eligible(entry.attempt_count) {
            warn!(
                entry_id = %id,
                attempts = entry.attempt_count,
                "Re-armed entry has no automatic retries left"
            );
        }

        let entry = self.inner.store.update(id, EntryPatch::rearm()).await?;
        info!(entry_id = %id, "Entry re-armed for replay");
        Ok(entry)
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        self.ensure_live()?;
        self.inner.store.remove(id).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.ensure_live()?;
        self.inner.store.clear().await?;
        info!("Ledger cleared");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<LedgerEntry>> {
        self.ensure_live()?;
        Ok(self.inner.store.get_all().await?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<LedgerEntry>> {
        self.ensure_live()?;
        Ok(self.inner.store.get(id).await?)
    }

    pub async fn state(&self) -> Result<LedgerState> {
        self.ensure_live()?;

        let entries = self.inner.store.get_all().await?;
        let count = |status: EntryStatus| entries.iter().filter(|e| e.status == status).count();
        let pending = count(EntryStatus::Pending);
        let engine = &self.inner.engine;

        Ok(LedgerState {
            state: engine.state_with(pending > 0),
            total: entries.len(),
            pending,
            processing: count(EntryStatus::Processing),
            failed: count(EntryStatus::Failed),
            running: engine.is_running(),
            paused: engine.is_paused(),
        })
    }

    pub fn pause(&self) -> Result<()> {
        self.ensure_live()?;
        self.inner.engine.pause();
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.ensure_live()?;
        self.inner.engine.resume();
        Ok(())
    }

    /// Start a drain in the background; a no-op if one is already running
    pub fn notify_online(&self) -> Result<()> {
        self.ensure_live()?;

        let engine = self.inner.engine.clone();
        let handle = tokio::spawn(async move {
            drain_in_background(&engine).await;
        });
        self.track(handle);
        Ok(())
    }

    /// Drain on every offline -> online transition of `online`
    pub fn attach_connectivity(&self, mut online: watch::Receiver<bool>) -> Result<()> {
        self.ensure_live()?;

        let engine = self.inner.engine.clone();
        let handle = tokio::spawn(async move {
            let mut was_online = *online.borrow_and_update();
            while online.changed().await.is_ok() {
                let now_online = *online.borrow_and_update();
                if now_online && !was_online {
                    info!("Connectivity restored, draining ledger");
                    drain_in_background(&engine).await;
                }
                was_online = now_online;
            }
            debug!("Connectivity source closed, listener exiting");
        });
        self.track(handle);
        Ok(())
    }

    fn track(&self, handle: JoinHandle<()>) {
        match self.inner.tasks.lock() {
            Ok(mut tasks) => {
                tasks.retain(|task| !task.is_finished());
                tasks.push(handle);
            }
            Err(_) => {
                error!("Task list poisoned, aborting untracked task");
                handle.abort();
            }
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Halt replay and detach listeners; later calls fail with `Destroyed`
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.engine.pause();
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        info!("Ledger destroyed");
    }
}

async fn drain_in_background(engine: &ReplayEngine) {
    match engine.process(ProcessOptions::new()).await {
        Ok(ProcessOutcome::AlreadyRunning) => debug!("Drain already active"),
        Ok(ProcessOutcome::Completed(summary)) => {
            debug!(succeeded = summary.succeeded, failed = summary.failed, "Background drain finished")
        }
        Err(e) => error!(error = %e, "Background drain failed"),
    }
}
