//! Single-file JSON document store.
//!
//! Persists one collection as a JSON array at a fixed path. Every change to the
//! live file goes through a staging file in the same directory followed by a
//! rename, so readers never observe a partially written document.
//!
//! Layout for a live file `data/products.json`:
//!
//! ```text
//! data/products.json                       live document
//! data/temp_products.json                  staging file (transient)
//! data/backups/products/20260314090507.json snapshot
//! ```

use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::backup::{self, BackupConfig, SNAPSHOT_EXT};
use super::error::{StoreError, StoreResult};

const STAGING_PREFIX: &str = "temp_";
const BACKUPS_DIR: &str = "backups";

/// Durable storage for one collection of `T`.
///
/// File operations are serialized through an internal FIFO lock, so the store
/// is safe to share between tasks on its own.
pub struct DocumentStore<T> {
    path: PathBuf,
    staging_path: PathBuf,
    backup_dir: PathBuf,
    backups: BackupConfig,
    queue: Mutex<()>,
    queue_timeout: Option<Duration>,
    _record: PhantomData<fn() -> T>,
}

impl<T> DocumentStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>, backups: BackupConfig) -> Self {
        let path = path.into();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.json")
            .to_string();
        let stem = file_name
            .strip_suffix(SNAPSHOT_EXT)
            .unwrap_or(&file_name)
            .to_string();

        Self {
            staging_path: dir.join(format!("{STAGING_PREFIX}{file_name}")),
            backup_dir: dir.join(BACKUPS_DIR).join(stem),
            path,
            backups,
            queue: Mutex::new(()),
            queue_timeout: None,
            _record: PhantomData,
        }
    }

    /// Bound the wait for the internal queue. `None` waits indefinitely.
    pub fn with_queue_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.queue_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn backup_config(&self) -> BackupConfig {
        self.backups
    }

    /// Read the collection. A missing or empty file is an empty collection.
    pub async fn read(&self) -> StoreResult<Vec<T>> {
        let _guard = self.admit().await?;
        Ok(read_collection(&self.path).await?.unwrap_or_default())
    }

    /// Atomically replace the live file with `collection`, then snapshot it.
    ///
    /// Snapshot failures are logged and do not fail the write.
    pub async fn write(&self, collection: &[T]) -> StoreResult<()> {
        let data = serde_json::to_vec_pretty(collection)?;
        let _guard = self.admit().await?;

        atomic_write_file(&self.staging_path, &self.path, &data).await?;
        debug!(path = %self.path.display(), records = collection.len(), "Document written");

        if self.backups.enabled
            && let Err(e) = self.create_backup_unlocked(&data).await
        {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to create backup"
            );
        }
        Ok(())
    }

    /// Write `collection` as a new snapshot and rotate old ones. Returns the snapshot name.
    pub async fn create_backup(&self, collection: &[T]) -> StoreResult<String> {
        let data = serde_json::to_vec_pretty(collection)?;
        let _guard = self.admit().await?;
        self.create_backup_unlocked(&data).await
    }

    /// Delete the oldest snapshots until at most `max_backups` remain.
    ///
    /// Returns the names of the deleted snapshots.
    pub async fn rotate_backups(&self) -> StoreResult<Vec<String>> {
        let _guard = self.admit().await?;
        self.rotate_backups_unlocked().await
    }

    /// Snapshot names in creation order. Empty if no backup was ever taken.
    pub async fn list_backups(&self) -> StoreResult<Vec<String>> {
        let _guard = self.admit().await?;
        self.list_backups_unlocked().await
    }

    /// Replace the live file with the named snapshot and return its contents.
    ///
    /// Restoring does not itself produce a snapshot.
    pub async fn restore_backup(&self, name: &str) -> StoreResult<Vec<T>> {
        let file_name = backup::snapshot_file_name(name)
            .ok_or_else(|| StoreError::BackupNotFound(name.to_string()))?;
        let snapshot_path = self.backup_dir.join(&file_name);

        let _guard = self.admit().await?;
        let collection = read_collection(&snapshot_path)
            .await?
            .ok_or_else(|| StoreError::BackupNotFound(name.to_string()))?;

        let data = serde_json::to_vec_pretty(&collection)?;
        atomic_write_file(&self.staging_path, &self.path, &data).await?;
        info!(
            path = %self.path.display(),
            snapshot = %file_name,
            "Restored document from backup"
        );
        Ok(collection)
    }

    // ========================================================================
    // Private helpers (caller holds the queue)
    // ========================================================================

    async fn admit(&self) -> StoreResult<MutexGuard<'_, ()>> {
        match self.queue_timeout {
            None => Ok(self.queue.lock().await),
            Some(limit) => tokio::time::timeout(limit, self.queue.lock())
                .await
                .map_err(|_| StoreError::Busy(limit)),
        }
    }

    async fn create_backup_unlocked(&self, data: &[u8]) -> StoreResult<String> {
        fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|e| StoreError::file_io(&self.backup_dir, e))?;

        let existing = self.list_backups_unlocked().await?;
        let name = backup::next_snapshot_name(Utc::now(), &existing);
        let snapshot_path = self.backup_dir.join(&name);
        fs::write(&snapshot_path, data)
            .await
            .map_err(|e| StoreError::file_io(&snapshot_path, e))?;
        debug!(snapshot = %snapshot_path.display(), "Backup created");

        self.rotate_backups_unlocked().await?;
        Ok(name)
    }

    async fn rotate_backups_unlocked(&self) -> StoreResult<Vec<String>> {
        let names = self.list_backups_unlocked().await?;
        let excess = names.len().saturating_sub(self.backups.max_backups);

        let mut removed = Vec::with_capacity(excess);
        for name in names.into_iter().take(excess) {
            let path = self.backup_dir.join(&name);
            fs::remove_file(&path)
                .await
                .map_err(|e| StoreError::file_io(&path, e))?;
            debug!(snapshot = %path.display(), "Backup rotated out");
            removed.push(name);
        }
        Ok(removed)
    }

    async fn list_backups_unlocked(&self) -> StoreResult<Vec<String>> {
        let mut dir = match fs::read_dir(&self.backup_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::file_io(&self.backup_dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::file_io(&self.backup_dir, e))?
        {
            if let Some(name) = entry.file_name().to_str()
                && backup::is_snapshot(name)
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Read and decode a collection file. `Ok(None)` if the file does not exist.
async fn read_collection<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<Vec<T>>> {
    let contents = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::file_io(path, e)),
    };
    if contents.trim().is_empty() {
        return Ok(Some(Vec::new()));
    }
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| StoreError::malformed(path, e))
}

/// Write data to the staging file, fsync it, then atomically rename to the final path.
///
/// The staging file must live in the same directory as `final_path` so the
/// rename never crosses a filesystem boundary.
async fn atomic_write_file(staging_path: &Path, final_path: &Path, data: &[u8]) -> StoreResult<()> {
    if let Some(dir) = final_path.parent() {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::file_io(dir, e))?;
    }

    let mut file = fs::File::create(staging_path)
        .await
        .map_err(|e| StoreError::file_io(staging_path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| StoreError::file_io(staging_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StoreError::file_io(staging_path, e))?;
    fs::rename(staging_path, final_path)
        .await
        .map_err(|e| StoreError::file_io(final_path, e))?;
    Ok(())
}
