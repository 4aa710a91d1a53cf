//! Durable entry store contract and its implementations
//!
//! The replay engine only ever talks to [`EntryStore`]. Any medium that honors
//! the contract below is pluggable:
//!
//! - `put` rejects an empty id or one longer than [`MAX_ID_LEN`] bytes with
//!   [`StoreError::InvalidId`]
//! - `put` rejects a colliding id with [`StoreError::DuplicateEntry`], persists
//!   atomically and then evicts the oldest entries (by `created_at`) when the
//!   capacity is exceeded, never the entry being inserted
//! - `get_all` lists entries by `created_at` ascending, ties broken by
//!   insertion order
//! - `get` never fails for a missing id
//! - `update` fails with [`StoreError::EntryNotFound`] for a missing id
//! - `remove` is idempotent
//!
//! Every operation is atomic with respect to the others.
//!
//! Two implementations ship with the crate:
//!
//! - [`FjallStore`] - embedded LSM store, survives restarts
//! - [`MemoryStore`] - in-process, for tests and ephemeral deployments

pub mod disk;
pub mod error;
pub mod keys;
pub mod memory;

use async_trait::async_trait;

use crate::entry::{EntryPatch, LedgerEntry};

pub use disk::FjallStore;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;

/// Default upper bound on stored entries
pub const DEFAULT_CAPACITY: usize = 1000;

/// Longest accepted entry id, in bytes
pub const MAX_ID_LEN: usize = 1024;

pub(crate) fn check_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(StoreError::InvalidId("id must not be empty".to_string()));
    }
    if id.len() > MAX_ID_LEN {
        return Err(StoreError::InvalidId(format!(
            "id is {} bytes, limit is {}",
            id.len(),
            MAX_ID_LEN
        )));
    }
    Ok(())
}

#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Insert a new entry, evicting the oldest ones if over capacity
    async fn put(&self, entry: LedgerEntry) -> Result<()>;

    /// All entries ordered by `created_at` ascending
    async fn get_all(&self) -> Result<Vec<LedgerEntry>>;

    async fn get(&self, id: &str) -> Result<Option<LedgerEntry>>;

    /// Apply a partial update and return the updated entry
    async fn update(&self, id: &str, patch: EntryPatch) -> Result<LedgerEntry>;

    async fn remove(&self, id: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

/// Ordering key shared by the implementations: creation time, then insertion sequence
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct OrderKey {
    pub created_at: i64,
    pub seq: u64,
}

/// Pick the ids to evict so that at most `capacity` entries remain
///
/// `candidates` must already include the entry just inserted; that entry is
/// never selected.
pub(crate) fn select_evictions(
    mut candidates: Vec<(OrderKey, String)>,
    capacity: usize,
    inserted_id: &str,
) -> Vec<String> {
    if candidates.len() <= capacity {
        return Vec::new();
    }

    let excess = candidates.len() - capacity;
    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    candidates
        .into_iter()
        .filter(|(_, id)| id != inserted_id)
        .take(excess)
        .map(|(_, id)| id)
        .collect()
}
