use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::{Result, StoreError};
use super::keys::{META_NEXT_SEQ, decode_entry_key, encode_entry_key, encode_meta_key};
use super::{DEFAULT_CAPACITY, EntryStore, MAX_ID_LEN, OrderKey, check_id, select_evictions};
use crate::entry::{EntryPatch, LedgerEntry};

/// On-disk record: the entry plus its insertion sequence
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    seq: u64,
    entry: LedgerEntry,
}

/// FjallStore persists ledger entries in an embedded Fjall keyspace
///
/// Architecture:
/// - `entries` partition: entry:{id} → StoredEntry (JSON)
/// - `metadata` partition: meta:next_seq → u64 (big-endian insertion counter)
///
/// Inserts write the entry, the bumped counter and any evictions in a single
/// batch, so a crash leaves either the old or the new state. Every mutation
/// reaches OS buffers before it returns, which survives the process dying;
/// [`FjallStore::flush`] adds an fsync. Read-modify-write operations are
/// serialized through `write_lock`.
pub struct FjallStore {
    keyspace: Keyspace,
    entries: PartitionHandle,
    metadata: PartitionHandle,
    seq_counter: AtomicU64,
    write_lock: Mutex<()>,
    capacity: usize,
}

impl FjallStore {
    /// Open or create a store at the given path with the default capacity
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_capacity(path, DEFAULT_CAPACITY)
    }

    pub fn open_with_capacity<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening FjallStore at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let entries = keyspace.open_partition("entries", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let next_seq = match metadata.get(encode_meta_key(META_NEXT_SEQ))? {
            Some(bytes) => decode_seq(&bytes)?,
            None => 0,
        };

        info!(next_seq, capacity, "FjallStore opened");

        Ok(Self {
            keyspace,
            entries,
            metadata,
            seq_counter: AtomicU64::new(next_seq),
            write_lock: Mutex::new(()),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Flush all writes to disk
    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Hand the journal to the OS so an application crash cannot lose it
    fn persist_buffered(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::Buffer)?;
        Ok(())
    }

    /// Health check - verify the keyspace is readable
    pub fn health_check(&self) -> Result<()> {
        let _ = self.metadata.get(encode_meta_key(META_NEXT_SEQ))?;
        Ok(())
    }

    fn read_stored(&self, id: &str) -> Result<Option<StoredEntry>> {
        // Such an id could never have been stored
        if id.len() > MAX_ID_LEN {
            return Ok(None);
        }
        match self.entries.get(encode_entry_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan(&self) -> Result<Vec<StoredEntry>> {
        let mut stored = Vec::new();
        for item in self.entries.iter() {
            let (key, value) = item?;
            let record = serde_json::from_slice::<StoredEntry>(&value)?;
            if decode_entry_key(&key).as_deref() != Some(record.entry.id.as_str()) {
                return Err(StoreError::Integrity(format!(
                    "key {} holds entry {}",
                    String::from_utf8_lossy(&key),
                    record.entry.id
                )));
            }
            stored.push(record);
        }
        Ok(stored)
    }
}

fn decode_seq(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        StoreError::Integrity(format!(
            "{} is {} bytes, expected 8",
            META_NEXT_SEQ,
            bytes.len()
        ))
    })?;
    Ok(u64::from_be_bytes(raw))
}

#[async_trait]
impl EntryStore for FjallStore {
    async fn put(&self, entry: LedgerEntry) -> Result<()> {
        check_id(&entry.id)?;
        let _guard = self.write_lock.lock().await;

        let key = encode_entry_key(&entry.id);
        if self.entries.contains_key(&key)? {
            return Err(StoreError::DuplicateEntry(entry.id));
        }

        let seq = self.seq_counter.load(Ordering::SeqCst);
        let mut candidates: Vec<(OrderKey, String)> = self
            .scan()?
            .into_iter()
            .map(|s| {
                (
                    OrderKey {
                        created_at: s.entry.created_at,
                        seq: s.seq,
                    },
                    s.entry.id,
                )
            })
            .collect();
        candidates.push((
            OrderKey {
                created_at: entry.created_at,
                seq,
            },
            entry.id.clone(),
        ));
        let evictions = select_evictions(candidates, self.capacity, &entry.id);

        let id = entry.id.clone();
        let value = serde_json::to_vec(&StoredEntry { seq, entry })?;

        let mut batch = self.keyspace.batch();
        batch.insert(&self.entries, key, value);
        batch.insert(
            &self.metadata,
            encode_meta_key(META_NEXT_SEQ),
            (seq + 1).to_be_bytes().to_vec(),
        );
        for evicted in &evictions {
            batch.remove(&self.entries, encode_entry_key(evicted));
        }
        batch.commit()?;
        self.persist_buffered()?;

        // Only advance once the batch is durable
        self.seq_counter.store(seq + 1, Ordering::SeqCst);

        debug!(entry_id = %id, seq, evicted = evictions.len(), "Entry persisted");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<LedgerEntry>> {
        let mut stored = self.scan()?;
        stored.sort_by(|a, b| {
            a.entry
                .created_at
                .cmp(&b.entry.created_at)
                .then(a.seq.cmp(&b.seq))
        });
        Ok(stored.into_iter().map(|s| s.entry).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<LedgerEntry>> {
        Ok(self.read_stored(id)?.map(|s| s.entry))
    }

    async fn update(&self, id: &str, patch: EntryPatch) -> Result<LedgerEntry> {
        let _guard = self.write_lock.lock().await;

        let mut stored = self
            .read_stored(id)?
            .ok_or_else(|| StoreError::EntryNotFound(id.to_string()))?;
        stored.entry.apply(&patch);

        self.entries
            .insert(encode_entry_key(id), serde_json::to_vec(&stored)?)?;
        self.persist_buffered()?;

        debug!(entry_id = %id, status = %stored.entry.status, "Entry updated");
        Ok(stored.entry)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        if id.len() > MAX_ID_LEN {
            warn!(len = id.len(), "Ignoring remove of an oversized id");
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        self.entries.remove(encode_entry_key(id))?;
        self.persist_buffered()?;
        debug!(entry_id = %id, "Entry removed");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut batch = self.keyspace.batch();
        let mut removed = 0usize;
        for item in self.entries.keys() {
            let key = item?;
            batch.remove(&self.entries, key);
            removed += 1;
        }
        batch.commit()?;
        self.persist_buffered()?;

        info!(removed, "Store cleared");
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let mut count = 0;
        for item in self.entries.keys() {
            item?;
            count += 1;
        }
        Ok(count)
    }
}
