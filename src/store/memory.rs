//! In-process entry store
//!
//! Honors the full [`EntryStore`] contract but keeps nothing across restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::error::{Result, StoreError};
use super::{DEFAULT_CAPACITY, EntryStore, OrderKey, check_id, select_evictions};
use crate::entry::{EntryPatch, LedgerEntry};

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, (u64, LedgerEntry)>,
    next_seq: u64,
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn put(&self, entry: LedgerEntry) -> Result<()> {
        check_id(&entry.id)?;
        let mut state = self.state.lock().await;

        if state.entries.contains_key(&entry.id) {
            return Err(StoreError::DuplicateEntry(entry.id));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let id = entry.id.clone();
        state.entries.insert(id.clone(), (seq, entry));

        let candidates = state
            .entries
            .iter()
            .map(|(id, (seq, entry))| {
                (
                    OrderKey {
                        created_at: entry.created_at,
                        seq: *seq,
                    },
                    id.clone(),
                )
            })
            .collect();

        for evicted in select_evictions(candidates, self.capacity, &id) {
            state.entries.remove(&evicted);
            debug!(entry_id = %evicted, "Evicted entry over capacity");
        }

        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<LedgerEntry>> {
        let state = self.state.lock().await;

        let mut entries: Vec<(u64, LedgerEntry)> = state.entries.values().cloned().collect();
        entries.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at.cmp(&b.created_at).then(seq_a.cmp(seq_b))
        });

        Ok(entries.into_iter().map(|(_, entry)| entry).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state.entries.get(id).map(|(_, entry)| entry.clone()))
    }

    async fn update(&self, id: &str, patch: EntryPatch) -> Result<LedgerEntry> {
        let mut state = self.state.lock().await;

        let (_, entry) = state
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::EntryNotFound(id.to_string()))?;
        entry.apply(&patch);

        Ok(entry.clone())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.state.lock().await.entries.remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.state.lock().await.entries.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.lock().await.entries.len())
    }
}
