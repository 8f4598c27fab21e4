//! Store registry.
//!
//! Maps validated database names to their [`RecordStore`], one instance per
//! name for the life of the registry. Each store keeps its own cache, so two
//! instances over the same file would silently overwrite each other; routing
//! every lookup through the registry prevents that.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::store::{BackupConfig, RecordStore};

/// Errors returned by registry lookups.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Name is empty or contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid database name: {0:?}")]
    InvalidName(String),
}

/// Lazily constructed record stores keyed by database name.
#[derive(Clone)]
pub struct StoreRegistry {
    data_dir: PathBuf,
    backups: BackupConfig,
    queue_timeout: Option<Duration>,
    stores: Arc<DashMap<String, Arc<RecordStore>>>,
}

impl StoreRegistry {
    pub fn new(data_dir: impl Into<PathBuf>, backups: BackupConfig) -> Self {
        Self {
            data_dir: data_dir.into(),
            backups,
            queue_timeout: None,
            stores: Arc::new(DashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.data_dir.clone(), config.backups).with_queue_timeout(config.queue_timeout())
    }

    /// Queue admission timeout applied to every store opened afterwards.
    pub fn with_queue_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.queue_timeout = timeout;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the store for `name`, opening it on first use.
    pub fn get(&self, name: &str) -> Result<Arc<RecordStore>, RegistryError> {
        if !is_valid_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }

        let entry = self.stores.entry(name.to_string()).or_insert_with(|| {
            let path = self.data_dir.join(format!("{name}.json"));
            info!(name = %name, path = %path.display(), "Opened record store");
            Arc::new(RecordStore::open(path, self.backups).with_queue_timeout(self.queue_timeout))
        });
        Ok(entry.value().clone())
    }

    /// Whether a store for `name` has been opened.
    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// Names of all opened stores, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Drop the registry's handle to a store. Returns it if it was open.
    ///
    /// The caller must ensure no other handle is still in use before a new
    /// instance is opened for the same name.
    pub fn remove(&self, name: &str) -> Option<Arc<RecordStore>> {
        self.stores.remove(name).map(|(_, store)| store)
    }
}

/// Database names map directly to file names, so only `[A-Za-z0-9_-]+` is allowed.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn name_validation() {
        assert!(is_valid_name("DMSRL"));
        assert!(is_valid_name("products_2026-q1"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("../etc"));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name("name.json"));
    }

    #[test]
    fn invalid_name_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let registry = StoreRegistry::new(tmp.path(), BackupConfig::default());
        let err = registry.get("../escape").err().unwrap();
        assert!(matches!(err, RegistryError::InvalidName(_)));
        assert!(registry.names().is_empty());
    }

    #[test]
    fn same_name_yields_same_instance() {
        let tmp = TempDir::new().unwrap();
        let registry = StoreRegistry::new(tmp.path(), BackupConfig::default());

        let a = registry.get("products").unwrap();
        let b = registry.clone().get("products").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.documents().path(), tmp.path().join("products.json"));
        assert_eq!(registry.names(), vec!["products".to_string()]);
    }

    #[tokio::test]
    async fn stores_are_isolated_by_name() {
        let tmp = TempDir::new().unwrap();
        let registry = StoreRegistry::new(tmp.path(), BackupConfig::disabled());

        let fields = json!({"name": "P1"}).as_object().cloned().unwrap();
        registry.get("alpha").unwrap().save(fields).await.unwrap();

        assert_eq!(registry.get("alpha").unwrap().get_all(None).await.unwrap().len(), 1);
        assert!(registry.get("beta").unwrap().get_all(None).await.unwrap().is_empty());
        assert_eq!(registry.names(), vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn remove_is_explicit() {
        let tmp = TempDir::new().unwrap();
        let registry = StoreRegistry::new(tmp.path(), BackupConfig::default());
        registry.get("products").unwrap();

        assert!(registry.contains("products"));
        assert!(registry.remove("products").is_some());
        assert!(!registry.contains("products"));
        assert!(registry.remove("products").is_none());
    }

    #[test]
    fn from_config_uses_config_values() {
        let config = Config {
            data_dir: PathBuf::from("/srv/shelf"),
            backups: BackupConfig::disabled(),
            queue_timeout_ms: Some(100),
        };
        let registry = StoreRegistry::from_config(&config);
        assert_eq!(registry.data_dir(), Path::new("/srv/shelf"));

        let store = registry.get("products").unwrap();
        assert!(!store.documents().backup_config().enabled);
    }
}
