//! FileSystemService — directory semantics on top of a flat object store.
//!
//! Paths handed to this service are fully qualified keys (the user's root
//! prefix already applied). Every mutating operation checks existence first
//! and fails with `NotFound` / `AlreadyExists` before touching the store;
//! those checks are not atomic with the write that follows, so concurrent
//! clients racing on one key can still interleave.

use crate::{
    models::resource::ResourceRecord,
    paths,
    services::{
        download::Download,
        mapper,
        upload::{UploadFile, Uploader},
    },
    store::{DIRECTORY_CONTENT_TYPE, ObjectStore, StorageError, StorageResult},
};
use bytes::Bytes;
use futures::stream;
use std::io;
use tracing::{error, info, warn};

/// Progress of a move; the compensating branch depends on how far it got.
#[derive(Debug)]
enum MoveState {
    /// Every source object has a copy at the destination.
    Copied { created: Vec<String> },
    /// Sources are gone; the move is complete.
    SourceRemoved,
}

#[derive(Clone)]
pub struct FileSystemService<S> {
    store: S,
}

impl<S: ObjectStore> FileSystemService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create the namespace root for a newly registered user.
    pub async fn create_root_directory_for_user(&self, user_id: i64) -> StorageResult<ResourceRecord> {
        let root = paths::user_root(user_id);
        info!(user_id, root = %root, "creating user root directory");
        self.put_marker(&root).await?;
        Ok(mapper::directory(&root))
    }

    /// Direct children of the directory at `path`.
    pub async fn get_directory_info(&self, path: &str) -> StorageResult<Vec<ResourceRecord>> {
        info!(path, "getting directory info");
        self.require_directory_path(path)?;
        self.require_exists(path).await?;

        let entries = self.store.list_objects(path, false).await?;
        Ok(entries
            .iter()
            .filter(|entry| entry.key != path)
            .map(mapper::from_entry)
            .collect())
    }

    /// Create an empty directory. Its parent must already exist.
    pub async fn create_directory(&self, path: &str) -> StorageResult<ResourceRecord> {
        info!(path, "creating directory");
        self.require_directory_path(path)?;
        self.require_exists(paths::parent_path(path)).await?;
        if self.store.object_exists(path).await? {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }

        self.put_marker(path).await?;
        Ok(mapper::directory(path))
    }

    pub async fn get_resource_info(&self, path: &str) -> StorageResult<ResourceRecord> {
        let entry = self.store.stat_object(path).await?;
        Ok(mapper::to_record(path, entry.size))
    }

    /// Delete a file, or a directory with everything beneath it.
    pub async fn delete_resource(&self, path: &str) -> StorageResult<()> {
        info!(path, "deleting resource");
        self.require_exists(path).await?;
        self.remove_tree(path).await
    }

    /// Resolve how `path` will be downloaded. The bytes are produced later
    /// by [`Download::stream_to`].
    pub async fn download_resource(&self, path: &str) -> StorageResult<Download<S>> {
        self.require_exists(path).await?;
        Ok(Download::for_path(self.store.clone(), path))
    }

    /// Move or rename `from` to `to` as copy-then-delete.
    pub async fn move_resource(&self, from: &str, to: &str) -> StorageResult<ResourceRecord> {
        info!(from, to, "moving resource");
        if paths::is_folder(from) != paths::is_folder(to) {
            return Err(StorageError::InvalidArgument(
                "cannot move a file onto a folder path or a folder onto a file path".into(),
            ));
        }
        if paths::is_ancestor_or_self(from, to) {
            return Err(StorageError::InvalidArgument(
                "cannot move a folder into its own subtree".into(),
            ));
        }
        if self.store.object_exists(to).await? {
            return Err(StorageError::AlreadyExists(to.to_string()));
        }
        self.require_exists(from).await?;
        self.require_exists(paths::parent_path(to)).await?;

        let copied = self.copy_tree(from, to).await?;
        let state = self.finish_move(copied, from, to).await?;
        info!(from, to, ?state, "move complete");

        let entry = self.store.stat_object(to).await?;
        Ok(mapper::to_record(to, entry.size))
    }

    /// Case-insensitive substring search on names beneath `root`. Folder
    /// names are matched without their trailing `/`.
    pub async fn search_resources_by_query(&self, query: &str, root: &str) -> StorageResult<Vec<ResourceRecord>> {
        let needle = query.to_lowercase();
        let entries = self.store.list_objects(root, true).await?;
        Ok(entries
            .iter()
            .filter(|entry| entry.key != root)
            .filter(|entry| display_name(&entry.key).to_lowercase().contains(&needle))
            .map(mapper::from_entry)
            .collect())
    }

    pub async fn upload_resource(&self, files: Vec<UploadFile>, target: &str) -> StorageResult<Vec<ResourceRecord>> {
        Uploader::new(self.store.clone()).upload(files, target).await
    }

    fn require_directory_path(&self, path: &str) -> StorageResult<()> {
        if paths::is_folder(path) {
            Ok(())
        } else {
            Err(StorageError::InvalidArgument(format!(
                "`{path}` is not a directory path"
            )))
        }
    }

    async fn require_exists(&self, path: &str) -> StorageResult<()> {
        if self.store.object_exists(path).await? {
            Ok(())
        } else {
            Err(StorageError::NotFound(path.to_string()))
        }
    }

    async fn put_marker(&self, key: &str) -> StorageResult<()> {
        let body = stream::iter([Ok::<_, io::Error>(Bytes::new())]);
        self.store
            .put_object(key, Some(DIRECTORY_CONTENT_TYPE), body, Some(0))
            .await?;
        Ok(())
    }

    /// Copy `from` (and for folders every member beneath it) to `to`. A copy
    /// failure removes what was already created before returning the error.
    async fn copy_tree(&self, from: &str, to: &str) -> StorageResult<MoveState> {
        let sources = if paths::is_folder(from) {
            self.store
                .list_objects(from, true)
                .await?
                .into_iter()
                .map(|entry| entry.key)
                .collect()
        } else {
            vec![from.to_string()]
        };

        let mut created = Vec::with_capacity(sources.len());
        for source in &sources {
            let target = format!("{to}{}", paths::relative_path(source, from));
            if let Err(err) = self.store.copy_object(source, &target).await {
                error!(from = %source, to = %target, error = %err, "copy failed, rolling back");
                self.discard(&created).await;
                return Err(err);
            }
            created.push(target);
        }
        Ok(MoveState::Copied { created })
    }

    /// Remove the move's source. If that fails outright, the copies are
    /// deleted again so the resource is not left duplicated.
    async fn finish_move(&self, state: MoveState, from: &str, to: &str) -> StorageResult<MoveState> {
        let created = match state {
            MoveState::Copied { created } => created,
            MoveState::SourceRemoved => return Ok(MoveState::SourceRemoved),
        };
        match self.remove_tree(from).await {
            Ok(()) => Ok(MoveState::SourceRemoved),
            Err(err) => {
                error!(from, to, error = %err, "error moving resource, rolling back");
                self.discard(&created).await;
                Err(err)
            }
        }
    }

    /// Best-effort removal used for compensation. Failures are logged only.
    async fn discard(&self, keys: &[String]) {
        for outcome in self.store.remove_objects(keys).await {
            if let Err(err) = outcome.result {
                error!(key = %outcome.key, error = %err, "compensating delete failed");
            }
        }
    }

    /// Remove a file, or every object under a folder prefix. Member failures
    /// of a folder are logged; the removal fails only when no member could
    /// be removed.
    async fn remove_tree(&self, path: &str) -> StorageResult<()> {
        if !paths::is_folder(path) {
            return self.store.remove_object(path).await;
        }

        let keys: Vec<String> = self
            .store
            .list_objects(path, true)
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        if keys.is_empty() {
            info!(path, "no objects found to remove");
            return Ok(());
        }

        let outcomes = self.store.remove_objects(&keys).await;
        let mut first_failure = None;
        let mut removed = 0usize;
        for outcome in outcomes {
            match outcome.result {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!(key = %outcome.key, error = %err, "failed to delete object");
                    first_failure.get_or_insert(err);
                }
            }
        }

        match first_failure {
            Some(err) if removed == 0 => Err(err),
            Some(_) => {
                warn!(path, removed, total = keys.len(), "folder partially removed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Base name without the folder separator.
fn display_name(key: &str) -> &str {
    let name = paths::base_name(key);
    name.strip_suffix(paths::SEPARATOR).unwrap_or(name)
}
