//! Metadata row for one stored object.

use crate::store::ObjectEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tag persisted alongside every object, mirroring the key convention.
pub const TYPE_FILE: &str = "FILE";
pub const TYPE_DIRECTORY: &str = "DIRECTORY";

/// Represents a single object (file payload or folder marker) in the bucket.
///
/// The row carries metadata only; the payload lives on disk under a path
/// derived from `id`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal id, also names the payload file.
    pub id: Uuid,

    pub bucket_id: Uuid,

    /// Full object key, e.g. `user-7-files/docs/readme.md`.
    pub key: String,

    pub content_type: Option<String>,

    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub etag: Option<String>,

    /// `FILE` or `DIRECTORY`.
    pub resource_type: String,

    pub last_modified: DateTime<Utc>,
}

impl From<StoredObject> for ObjectEntry {
    fn from(obj: StoredObject) -> Self {
        let is_dir = crate::paths::is_folder(&obj.key);
        ObjectEntry {
            key: obj.key,
            size: obj.size_bytes.max(0) as u64,
            content_type: obj.content_type,
            etag: obj.etag,
            last_modified: Some(obj.last_modified),
            is_dir,
        }
    }
}
