//! Cached record store.
//!
//! Owns the in-memory copy of one collection and serializes every mutation
//! through a fair `RwLock`: mutations hold the write lock across the whole
//! read-modify-persist sequence, reads hold the read lock. Waiters are admitted
//! in FIFO order, so mutations apply in submission order and a read never
//! observes a mutation that has not been persisted.
//!
//! Mutations are applied to a copy of the collection and swapped into the
//! cache only after the document store has written it, so a failed write
//! leaves the cache matching the file.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::backup::BackupConfig;
use super::document::DocumentStore;
use super::error::{StoreError, StoreResult};
use super::record::{Fields, Record};
use crate::id::generate_record_id;

/// Number of records returned by [`RecordStore::get_all`] when no limit is given.
pub const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Debug, Default)]
struct Cache {
    records: Vec<Record>,
    initialized: bool,
}

/// Record CRUD over a single [`DocumentStore`].
pub struct RecordStore {
    documents: DocumentStore<Record>,
    cache: RwLock<Cache>,
    queue_timeout: Option<Duration>,
}

impl RecordStore {
    pub fn new(documents: DocumentStore<Record>) -> Self {
        Self {
            documents,
            cache: RwLock::new(Cache::default()),
            queue_timeout: None,
        }
    }

    /// Open a store over the document at `path`.
    pub fn open(path: impl Into<PathBuf>, backups: BackupConfig) -> Self {
        Self::new(DocumentStore::new(path, backups))
    }

    /// Bound the wait for queue admission. `None` waits indefinitely.
    pub fn with_queue_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.documents = self.documents.with_queue_timeout(timeout);
        self.queue_timeout = timeout;
        self
    }

    pub fn documents(&self) -> &DocumentStore<Record> {
        &self.documents
    }

    /// Create a record from `fields` and persist it.
    pub async fn save(&self, fields: Fields) -> StoreResult<Record> {
        let mut cache = self.exclusive().await?;

        let record = Record::new(generate_record_id(), fields, Utc::now());
        let mut next = cache.records.clone();
        next.push(record.clone());
        self.commit(&mut cache, next).await?;

        debug!(id = %record.id, "Record saved");
        Ok(record)
    }

    /// Look up a record by id.
    pub async fn get(&self, id: &str) -> StoreResult<Record> {
        let cache = self.shared().await?;
        cache
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))
    }

    /// The first `limit` records in collection order ([`DEFAULT_LIST_LIMIT`] if `None`).
    pub async fn get_all(&self, limit: Option<usize>) -> StoreResult<Vec<Record>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let cache = self.shared().await?;
        Ok(cache.records.iter().take(limit).cloned().collect())
    }

    /// Replace the fields of an existing record, keeping its position.
    pub async fn update(&self, id: &str, fields: Fields) -> StoreResult<Record> {
        let mut cache = self.exclusive().await?;

        let index = cache
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))?;
        let replacement = cache.records[index].replaced(fields, Utc::now());

        let mut next = cache.records.clone();
        next[index] = replacement.clone();
        self.commit(&mut cache, next).await?;

        debug!(id = %id, "Record updated");
        Ok(replacement)
    }

    /// Remove a record. Returns `false`, without writing, if it does not exist.
    pub async fn delete(&self, id: &str) -> StoreResult<bool> {
        let mut cache = self.exclusive().await?;

        let Some(index) = cache.records.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        let mut next = cache.records.clone();
        next.remove(index);
        self.commit(&mut cache, next).await?;

        debug!(id = %id, "Record deleted");
        Ok(true)
    }

    /// Drop the cache; the next operation reloads from disk.
    pub async fn invalidate_cache(&self) -> StoreResult<()> {
        let mut cache = self.write_lock().await?;
        *cache = Cache::default();
        debug!(path = %self.documents.path().display(), "Cache invalidated");
        Ok(())
    }

    /// Restore the named snapshot and load it into the cache.
    pub async fn restore_backup(&self, name: &str) -> StoreResult<Vec<Record>> {
        let mut cache = self.write_lock().await?;
        let restored = self.documents.restore_backup(name).await?;
        cache.records = restored.clone();
        cache.initialized = true;
        Ok(restored)
    }

    pub async fn list_backups(&self) -> StoreResult<Vec<String>> {
        self.documents.list_backups().await
    }

    // ========================================================================
    // Private helpers
    // ========================================================================

    async fn commit(&self, cache: &mut Cache, next: Vec<Record>) -> StoreResult<()> {
        self.documents.write(&next).await?;
        cache.records = next;
        Ok(())
    }

    /// Write lock with the cache loaded.
    async fn exclusive(&self) -> StoreResult<RwLockWriteGuard<'_, Cache>> {
        let mut cache = self.write_lock().await?;
        self.ensure_loaded(&mut cache).await?;
        Ok(cache)
    }

    /// Read lock with the cache loaded.
    async fn shared(&self) -> StoreResult<RwLockReadGuard<'_, Cache>> {
        {
            let cache = self.read_lock().await?;
            if cache.initialized {
                return Ok(cache);
            }
        }
        let mut cache = self.write_lock().await?;
        self.ensure_loaded(&mut cache).await?;
        Ok(cache.downgrade())
    }

    async fn ensure_loaded(&self, cache: &mut Cache) -> StoreResult<()> {
        if !cache.initialized {
            cache.records = self.documents.read().await?;
            cache.initialized = true;
            debug!(
                path = %self.documents.path().display(),
                records = cache.records.len(),
                "Cache loaded"
            );
        }
        Ok(())
    }

    async fn read_lock(&self) -> StoreResult<RwLockReadGuard<'_, Cache>> {
        match self.queue_timeout {
            None => Ok(self.cache.read().await),
            Some(limit) => tokio::time::timeout(limit, self.cache.read())
                .await
                .map_err(|_| StoreError::Busy(limit)),
        }
    }

    async fn write_lock(&self) -> StoreResult<RwLockWriteGuard<'_, Cache>> {
        match self.queue_timeout {
            None => Ok(self.cache.write().await),
            Some(limit) => tokio::time::timeout(limit, self.cache.write())
                .await
                .map_err(|_| StoreError::Busy(limit)),
        }
    }
}
