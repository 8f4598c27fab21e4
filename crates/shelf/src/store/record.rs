//! Record schema.
//!
//! A record is an opaque JSON object augmented with three reserved fields
//! owned by the store: `id`, `created_at`, and `updated_at`.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Caller-supplied record contents.
pub type Fields = Map<String, Value>;

/// Keys the store assigns itself. Caller values for these are dropped.
pub const RESERVED_FIELDS: &[&str] = &["id", "_id", "created_at", "updated_at"];

/// A stored record.
///
/// Decoding goes through [`TryFrom<Fields>`] so documents written with a
/// legacy `_id` key still load, including ones that also carry a caller `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Fields")]
pub struct Record {
    /// Unique within a store, immutable after creation.
    pub id: String,
    /// Opaque caller data.
    #[serde(flatten)]
    pub fields: Fields,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last replaced.
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Create a new record stamped at `now`.
    pub fn new(id: String, fields: Fields, now: DateTime<Utc>) -> Self {
        Self {
            id,
            fields: strip_reserved(fields),
            created_at: now,
            updated_at: now,
        }
    }

    /// Build the replacement for this record carrying `fields`.
    ///
    /// Keeps `id` and `created_at`. The new `updated_at` is strictly later than
    /// the current one even if the clock has not advanced.
    pub fn replaced(&self, fields: Fields, now: DateTime<Utc>) -> Self {
        let floor = self.updated_at + TimeDelta::microseconds(1);
        Self {
            id: self.id.clone(),
            fields: strip_reserved(fields),
            created_at: self.created_at,
            updated_at: now.max(floor),
        }
    }
}

/// Why a stored object could not be read as a [`Record`].
#[derive(Debug, Error)]
pub enum RecordDecodeError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("record id must be a string or number, got {0}")]
    InvalidId(Value),

    #[error("invalid timestamp in `{field}`: {source}")]
    InvalidTimestamp {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl TryFrom<Fields> for Record {
    type Error = RecordDecodeError;

    /// `_id` wins over `id` when both are present; the losing key is dropped.
    fn try_from(mut object: Fields) -> Result<Self, Self::Error> {
        let raw_id = match object.remove("_id") {
            Some(legacy) => legacy,
            None => object
                .remove("id")
                .ok_or(RecordDecodeError::MissingField("id"))?,
        };
        let id = match raw_id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => return Err(RecordDecodeError::InvalidId(other)),
        };
        let created_at = take_timestamp(&mut object, "created_at")?;
        let updated_at = take_timestamp(&mut object, "updated_at")?;

        Ok(Self {
            id,
            fields: strip_reserved(object),
            created_at,
            updated_at,
        })
    }
}

fn take_timestamp(
    object: &mut Fields,
    field: &'static str,
) -> Result<DateTime<Utc>, RecordDecodeError> {
    let raw = object
        .remove(field)
        .ok_or(RecordDecodeError::MissingField(field))?;
    serde_json::from_value(raw).map_err(|source| RecordDecodeError::InvalidTimestamp { field, source })
}

fn strip_reserved(mut fields: Fields) -> Fields {
    for key in RESERVED_FIELDS {
        fields.remove(*key);
    }
    fields
}
