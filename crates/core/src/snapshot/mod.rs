//! Persisted raw snapshots and freshness tokens per data source.
//!
//! Storage is a plain string key-value store (for example local settings storage
//! or the SQLite store in `tablesync-storage-sqlite`). Reads and writes are
//! treated as non-suspending.

mod memory;

pub use memory::MemoryKeyValueStore;

use std::sync::Arc;

use log::debug;

use crate::errors::Result;
use crate::sync::{FreshnessToken, TableSnapshot};

/// Durable string key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Storage key of the raw payload for a database.
pub fn snapshot_value_key(database_id: &str) -> String {
    format!("cached_{}_value", database_id)
}

/// Storage key of the freshness token for a database.
pub fn snapshot_token_key(database_id: &str) -> String {
    format!("cached_{}_code", database_id)
}

/// Raw payload + freshness token store keyed by data source.
#[derive(Clone)]
pub struct PersistentSnapshotStore {
    store: Arc<dyn KeyValueStore>,
}

impl PersistentSnapshotStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Snapshot store backed by process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()))
    }

    pub fn save_snapshot(&self, database_id: &str, payload: &str) -> Result<()> {
        debug!(
            "[SnapshotStore] Saving snapshot for {} ({} bytes)",
            database_id,
            payload.len()
        );
        self.store.set(&snapshot_value_key(database_id), payload)
    }

    pub fn load_snapshot(&self, database_id: &str) -> Result<Option<String>> {
        self.store.get(&snapshot_value_key(database_id))
    }

    pub fn save_freshness_token(&self, database_id: &str, token: &FreshnessToken) -> Result<()> {
        self.store
            .set(&snapshot_token_key(database_id), token.as_str())
    }

    pub fn load_freshness_token(&self, database_id: &str) -> Result<Option<FreshnessToken>> {
        Ok(self
            .store
            .get(&snapshot_token_key(database_id))?
            .map(FreshnessToken::new))
    }

    /// Payload and token together, or `None` when no payload was ever saved.
    pub fn load(&self, database_id: &str) -> Result<Option<TableSnapshot>> {
        let Some(payload) = self.load_snapshot(database_id)? else {
            return Ok(None);
        };
        Ok(Some(TableSnapshot {
            payload,
            token: self.load_freshness_token(database_id)?,
        }))
    }

    /// Persist a freshly downloaded payload, then the token it was observed under.
    ///
    /// The payload is written first so a reader never sees a new token paired with
    /// an old payload.
    pub fn commit(&self, database_id: &str, payload: &str, token: &FreshnessToken) -> Result<()> {
        self.save_snapshot(database_id, payload)?;
        self.save_freshness_token(database_id, token)
    }
}

impl std::fmt::Debug for PersistentSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentSnapshotStore").finish_non_exhaustive()
    }
}
