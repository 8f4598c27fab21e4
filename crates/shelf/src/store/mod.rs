//! Embedded persistence: a JSON document store with atomic writes and
//! rotating backups, and a cached record store layered on top of it.
//!
//! ```text
//! caller ──▶ RecordStore (cache, ids, timestamps, mutation queue)
//!                 │
//!                 ▼
//!            DocumentStore (staging + rename, snapshots, restore)
//!                 │
//!                 ▼
//!            file system
//! ```

pub mod backup;
pub mod document;
pub mod error;
pub mod record;
pub mod records;

pub use backup::BackupConfig;
pub use document::DocumentStore;
pub use error::{StoreError, StoreResult};
pub use record::{Fields, Record, RecordDecodeError};
pub use records::{DEFAULT_LIST_LIMIT, RecordStore};
