//! Object store gateway.
//!
//! The filesystem service only needs a flat key/value capability: put, get,
//! stat, list by prefix, copy and delete single objects. `ObjectStore`
//! captures that surface so the service can run against the bundled
//! [`LocalObjectStore`] or any other backend.

pub mod error;
pub mod local;

pub use error::{StorageError, StorageResult};
pub use local::LocalObjectStore;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::{fmt, future::Future, io, pin::Pin};
use tokio::io::AsyncRead;

/// Content type recorded for folder markers.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

/// One entry produced by a listing or a metadata probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    /// `None` for directories synthesized from common prefixes.
    pub last_modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
}

impl ObjectEntry {
    /// A directory entry that exists only as a shared key prefix.
    pub fn prefix(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: 0,
            content_type: None,
            etag: None,
            last_modified: None,
            is_dir: true,
        }
    }
}

pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// An opened object: its metadata and a reader over the payload.
pub struct ObjectReader {
    pub entry: ObjectEntry,
    pub body: ObjectBody,
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

/// Result of deleting one member of a batch.
#[derive(Debug)]
pub struct DeleteOutcome {
    pub key: String,
    pub result: StorageResult<()>,
}

impl DeleteOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Flat object storage addressed by string keys.
///
/// Implementations are cheap to clone and shared across requests.
pub trait ObjectStore: Clone + Send + Sync + 'static {
    /// Store `body` under `key`. Never overwrites: an existing key fails
    /// with [`StorageError::AlreadyExists`]. When `expected_size` is given
    /// the body must have exactly that many bytes.
    fn put_object<S>(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: S,
        expected_size: Option<u64>,
    ) -> impl Future<Output = StorageResult<ObjectEntry>> + Send
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static;

    /// Open `key` for reading.
    fn get_object(&self, key: &str) -> impl Future<Output = StorageResult<ObjectReader>> + Send;

    /// Header metadata for `key` without opening the payload.
    fn stat_object(&self, key: &str) -> impl Future<Output = StorageResult<ObjectEntry>> + Send;

    fn object_exists(&self, key: &str) -> impl Future<Output = StorageResult<bool>> + Send;

    /// Entries whose key starts with `prefix`, in key order.
    ///
    /// A non-recursive listing stops one level below `prefix`: deeper keys
    /// are folded into a directory entry for their first segment.
    fn list_objects(
        &self,
        prefix: &str,
        recursive: bool,
    ) -> impl Future<Output = StorageResult<Vec<ObjectEntry>>> + Send;

    /// Server-side copy. Replaces `to` if it exists.
    fn copy_object(&self, from: &str, to: &str) -> impl Future<Output = StorageResult<()>> + Send;

    fn remove_object(&self, key: &str) -> impl Future<Output = StorageResult<()>> + Send;

    /// Delete every key independently, reporting one outcome per key.
    fn remove_objects(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Vec<DeleteOutcome>> + Send;
}
