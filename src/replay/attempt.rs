//! One replay attempt for one entry, including its state transition

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::Result;
use crate::entry::{EntryPatch, EntryStatus, LedgerEntry, now_ms};
use crate::executor::{ExecutionFailure, ExecutionOutcome, ExecutionResponse, RequestExecutor};
use crate::observability::LifecycleHooks;
use crate::retry::{RetryDecision, RetryStrategy};
use crate::store::EntryStore;

/// Result of an attempt after its store mutation has been applied
#[derive(Debug)]
pub(crate) enum AttemptReport {
    /// Entry deleted; `entry` carries status `completed`
    Succeeded {
        entry: LedgerEntry,
        response: ExecutionResponse,
    },
    /// Retryable failure with budget left; entry back to `pending`
    Rearmed {
        entry: LedgerEntry,
        failure: ExecutionFailure,
    },
    /// Terminal failure or budget exhausted; entry `failed`
    Failed {
        entry: LedgerEntry,
        failure: ExecutionFailure,
    },
    /// Cancelled mid-flight; entry left `processing` for recovery
    Abandoned { entry: LedgerEntry },
}

/// Everything a spawned attempt needs, detached from the engine
pub(crate) struct Attempt {
    pub store: Arc<dyn EntryStore>,
    pub executor: Arc<dyn RequestExecutor>,
    pub hooks: Arc<dyn LifecycleHooks>,
    pub retry: RetryStrategy,
    pub cancel: watch::Receiver<bool>,
}

impl Attempt {
    pub async fn run(self, entry: LedgerEntry) -> Result<AttemptReport> {
        let Attempt {
            store,
            executor,
            hooks,
            retry,
            mut cancel,
        } = self;

        let attempt = entry.attempt_count.saturating_add(1);
        let entry = store
            .update(&entry.id, EntryPatch::attempt_started(attempt, now_ms()))
            .await?;
        hooks.on_replay_start(&entry);
        debug!(entry_id = %entry.id, attempt, "Replay attempt started");

        let outcome = tokio::select! {
            outcome = executor.execute(&entry.request, entry.idempotency_key.as_deref()) => outcome,
            _ = cancelled(&mut cancel) => {
                info!(entry_id = %entry.id, attempt, "Attempt abandoned, entry left processing");
                return Ok(AttemptReport::Abandoned { entry });
            }
        };

        match outcome {
            ExecutionOutcome::Success(response) => {
                store.remove(&entry.id).await?;
                let mut entry = entry;
                entry.status = EntryStatus::Completed;
                hooks.on_replay_success(&entry);
                debug!(entry_id = %entry.id, status = response.status, "Replay succeeded");
                Ok(AttemptReport::Succeeded { entry, response })
            }
            ExecutionOutcome::Retryable(failure) => match retry.next_delay(entry.attempt_count) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        entry_id = %entry.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Retryable failure, backing off"
                    );
                    // The slot stays occupied for the whole backoff
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancelled(&mut cancel) => {
                            debug!(entry_id = %entry.id, "Backoff interrupted");
                        }
                    }

                    let entry = store.update(&entry.id, EntryPatch::rearm()).await?;
                    hooks.on_replay_failure(&entry, &failure);
                    Ok(AttemptReport::Rearmed { entry, failure })
                }
                RetryDecision::Stop => {
                    warn!(entry_id = %entry.id, attempt, error = %failure, "Retry budget exhausted");
                    mark_failed(store.as_ref(), hooks.as_ref(), entry, failure).await
                }
            },
            ExecutionOutcome::Terminal(failure) => {
                warn!(entry_id = %entry.id, attempt, error = %failure, "Terminal failure");
                mark_failed(store.as_ref(), hooks.as_ref(), entry, failure).await
            }
        }
    }
}

async fn mark_failed(
    store: &dyn EntryStore,
    hooks: &dyn LifecycleHooks,
    entry: LedgerEntry,
    failure: ExecutionFailure,
) -> Result<AttemptReport> {
    let entry = store
        .update(&entry.id, EntryPatch::failed(failure.to_entry_error()))
        .await?;
    hooks.on_replay_failure(&entry, &failure);
    Ok(AttemptReport::Failed { entry, failure })
}

/// Resolves once the cancellation flag is raised
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|cancel| *cancel).await;
}
