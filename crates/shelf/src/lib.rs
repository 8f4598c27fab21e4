//! Shelf - an embedded JSON record store with crash-safe writes and rotating backups.

pub mod config;
pub mod id;
pub mod registry;
pub mod store;

pub use registry::{RegistryError, StoreRegistry};
pub use store::{BackupConfig, Fields, Record, RecordStore, StoreError, StoreResult};
