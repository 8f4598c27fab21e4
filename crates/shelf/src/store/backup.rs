//! Backup configuration and snapshot naming.
//!
//! Snapshots are named `YYYYMMDDHHMMSS.json` after the UTC second they were
//! taken in. Further snapshots within the same second get a fixed-width
//! `_NNNNNN` suffix (`YYYYMMDDHHMMSS_000001.json`, ...). Both forms sort
//! lexicographically in creation order: `.` sorts before `_`, suffixes never
//! change width, and any name from a later second sorts after every name from
//! an earlier one.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// File extension shared by live documents and snapshots.
pub const SNAPSHOT_EXT: &str = ".json";

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const STAMP_LEN: usize = 14;
const SUFFIX_WIDTH: usize = 6;
const MAX_SUFFIX: u32 = 999_999;

/// Backup behaviour for one document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BackupConfig {
    /// Whether snapshots are created after each write.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Number of snapshots kept after rotation.
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_backups: default_max_backups(),
        }
    }
}

impl BackupConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_backups() -> usize {
    5
}

/// Whether a directory entry is a snapshot file (`YYYYMMDDHHMMSS[_NNNNNN].json`).
pub fn is_snapshot(file_name: &str) -> bool {
    let Some(base) = file_name.strip_suffix(SNAPSHOT_EXT) else {
        return false;
    };
    if base.len() < STAMP_LEN || !base.is_char_boundary(STAMP_LEN) {
        return false;
    }
    let (stamp, rest) = base.split_at(STAMP_LEN);
    all_digits(stamp)
        && (rest.is_empty()
            || rest
                .strip_prefix('_')
                .is_some_and(|n| n.len() == SUFFIX_WIDTH && all_digits(n)))
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// Choose the name for a snapshot taken at `now`, given the names already present.
///
/// Once a second has used every suffix up to `999999`, further snapshots in
/// that second reuse the last name.
pub fn next_snapshot_name(now: DateTime<Utc>, existing: &[String]) -> String {
    let stamp = now.format(STAMP_FORMAT).to_string();
    let highest = existing
        .iter()
        .filter_map(|name| same_second_suffix(&stamp, name))
        .max();

    match highest {
        None => format!("{stamp}{SNAPSHOT_EXT}"),
        Some(n) => format!(
            "{stamp}_{:0width$}{SNAPSHOT_EXT}",
            n.saturating_add(1).min(MAX_SUFFIX),
            width = SUFFIX_WIDTH
        ),
    }
}

/// Suffix of `name` if it was taken in the second `stamp`; the bare name counts as 0.
fn same_second_suffix(stamp: &str, name: &str) -> Option<u32> {
    let rest = name.strip_prefix(stamp)?.strip_suffix(SNAPSHOT_EXT)?;
    if rest.is_empty() {
        return Some(0);
    }
    let suffix = rest.strip_prefix('_')?;
    if suffix.len() != SUFFIX_WIDTH {
        return None;
    }
    suffix.parse().ok()
}

/// Resolve a caller-supplied snapshot identifier to a file name in the backup directory.
///
/// The extension is optional. Returns `None` for names that cannot refer to a
/// file directly inside the backup directory.
pub fn snapshot_file_name(name: &str) -> Option<String> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return None;
    }
    if is_snapshot(name) {
        Some(name.to_string())
    } else {
        Some(format!("{name}{SNAPSHOT_EXT}"))
    }
}
