//! Multi-file upload into a directory.
//!
//! File names may carry client-side subdirectories (`docs/readme.md`). The
//! store has no implicit directories, so a marker is written for every
//! ancestor before the files themselves. Collisions abort the batch before
//! anything is written; a file that fails to store is logged and skipped.

use crate::{
    models::resource::ResourceRecord,
    paths,
    services::mapper,
    store::{DIRECTORY_CONTENT_TYPE, ObjectStore, StorageError, StorageResult},
};
use bytes::Bytes;
use futures::stream;
use std::{
    collections::{BTreeSet, HashSet},
    io,
};
use tracing::{debug, info, warn};

/// One file of an upload batch.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Client-relative name, possibly with `/`-separated subdirectories.
    pub filename: String,
    pub content_type: Option<String>,
    pub content: Bytes,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, content_type: Option<&str>, content: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.map(str::to_string),
            content: content.into(),
        }
    }
}

/// A file with its destination resolved.
struct PlannedFile {
    key: String,
    relative: String,
    file: UploadFile,
}

pub struct Uploader<S> {
    store: S,
}

impl<S: ObjectStore> Uploader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Upload `files` beneath `target`, returning records for every marker
    /// created and every file stored.
    pub async fn upload(&self, files: Vec<UploadFile>, target: &str) -> StorageResult<Vec<ResourceRecord>> {
        if files.is_empty() {
            return Err(StorageError::InvalidArgument(
                "upload requires at least one file".into(),
            ));
        }
        if !paths::is_valid_directory_end(target) {
            return Err(StorageError::InvalidArgument(format!(
                "upload target `{target}` is not a directory"
            )));
        }
        if !self.store.object_exists(target).await? {
            return Err(StorageError::NotFound(target.to_string()));
        }

        let planned = self.plan(files, target).await?;
        let directories = collect_directories(&planned);
        info!(
            dir = %target,
            files = planned.len(),
            directories = directories.len(),
            "uploading batch"
        );

        let mut uploaded = Vec::with_capacity(directories.len() + planned.len());
        for directory in &directories {
            let key = format!("{target}{directory}");
            if self.create_marker(&key).await? {
                uploaded.push(mapper::directory(&key));
            }
        }

        let total = planned.len();
        let mut first_failure = None;
        for PlannedFile { key, relative, file } in planned {
            let size = file.content.len() as u64;
            let body = stream::iter([Ok::<_, io::Error>(file.content)]);
            match self
                .store
                .put_object(&key, file.content_type.as_deref(), body, Some(size))
                .await
            {
                Ok(entry) => {
                    debug!(key = %key, size = entry.size, "uploaded file");
                    uploaded.push(mapper::to_record(&key, entry.size));
                }
                Err(err) => {
                    warn!(file = %relative, error = %err, "can't upload file, skipping");
                    first_failure.get_or_insert(err);
                }
            }
        }

        // Every file failed: an empty success would hide the problem.
        if let Some(err) = first_failure {
            let stored_files = uploaded.iter().filter(|r| !r.is_directory()).count();
            if stored_files == 0 {
                warn!(dir = %target, total, "no file of the batch could be uploaded");
                return Err(err);
            }
        }

        Ok(uploaded)
    }

    /// Resolve every destination key and refuse the batch when any of them
    /// is taken, before a single write.
    async fn plan(&self, files: Vec<UploadFile>, target: &str) -> StorageResult<Vec<PlannedFile>> {
        let mut seen = HashSet::with_capacity(files.len());
        let mut planned = Vec::with_capacity(files.len());
        for file in files {
            let relative = paths::normalize_relative(&file.filename)?;
            let key = format!("{target}{relative}");
            if !seen.insert(key.clone()) || self.store.object_exists(&key).await? {
                return Err(StorageError::AlreadyExists(key));
            }
            planned.push(PlannedFile {
                key,
                relative,
                file,
            });
        }
        Ok(planned)
    }

    /// Write a folder marker unless one is already there. Returns whether a
    /// marker was created.
    async fn create_marker(&self, key: &str) -> StorageResult<bool> {
        if self.store.object_exists(key).await? {
            return Ok(false);
        }
        let body = stream::iter([Ok::<_, io::Error>(Bytes::new())]);
        match self
            .store
            .put_object(key, Some(DIRECTORY_CONTENT_TYPE), body, Some(0))
            .await
        {
            Ok(_) => Ok(true),
            // Created concurrently; the directory exists either way.
            Err(StorageError::AlreadyExists(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Distinct ancestor directories of every planned file, relative to the
/// upload target, outermost first.
fn collect_directories(planned: &[PlannedFile]) -> BTreeSet<String> {
    planned
        .iter()
        .flat_map(|p| paths::ancestor_directories(&p.relative))
        .map(str::to_string)
        .collect()
}
