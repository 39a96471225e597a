//! Builds [`ResourceRecord`]s from object store entries and upload results.
//!
//! Kind is always decided by the trailing-slash convention, never by the
//! stored content type, so every producer of records agrees.

use crate::{
    models::resource::{ResourceKind, ResourceRecord},
    paths,
    store::ObjectEntry,
};

fn kind_of(key: &str) -> ResourceKind {
    if paths::is_folder(key) {
        ResourceKind::Directory
    } else {
        ResourceKind::File
    }
}

/// Folders and zero-length placeholders report no size.
fn visible_size(key: &str, size: u64) -> Option<u64> {
    (!paths::is_folder(key) && size > 0).then_some(size)
}

/// Record for `key` with an explicit byte count.
pub fn to_record(key: &str, size: u64) -> ResourceRecord {
    ResourceRecord {
        path: paths::parent_path(key).to_string(),
        name: paths::base_name(key).to_string(),
        size: visible_size(key, size),
        kind: kind_of(key),
    }
}

/// Record for a listing or metadata entry.
pub fn from_entry(entry: &ObjectEntry) -> ResourceRecord {
    to_record(&entry.key, entry.size)
}

/// Record for a freshly created folder marker.
pub fn directory(key: &str) -> ResourceRecord {
    to_record(key, 0)
}
