//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use bytes::Bytes;
use cloud_storage::{
    db,
    services::{filesystem::FileSystemService, upload::UploadFile},
    store::{
        DeleteOutcome, LocalObjectStore, ObjectEntry, ObjectReader, ObjectStore, StorageError,
        StorageResult,
    },
};
use futures::Stream;
use std::{
    collections::HashSet,
    io,
    sync::{Arc, Mutex},
};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

pub const BUCKET: &str = "user-files";
pub const ROOT: &str = "user-7-files/";

/// A store on a fresh temp directory and in-memory metadata database. Keep
/// the `TempDir` alive for the duration of the test.
pub async fn local_store() -> (LocalObjectStore, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = db::connect_in_memory().await.expect("in-memory database");
    let store = LocalObjectStore::open(Arc::new(pool), dir.path(), BUCKET)
        .await
        .expect("open store");
    (store, dir)
}

/// A service over a local store with the root of user 7 already created.
pub async fn service_with_root() -> (FileSystemService<LocalObjectStore>, TempDir) {
    let (store, dir) = local_store().await;
    let service = FileSystemService::new(store);
    service
        .create_root_directory_for_user(7)
        .await
        .expect("create root");
    (service, dir)
}

pub fn file(name: &str, content: &'static str) -> UploadFile {
    UploadFile::new(name, Some("text/plain"), Bytes::from_static(content.as_bytes()))
}

/// Full payload of `key` as UTF-8.
pub async fn read_string<S: ObjectStore>(store: &S, key: &str) -> String {
    let mut reader = store.get_object(key).await.expect("object exists");
    let mut contents = String::new();
    reader
        .body
        .read_to_string(&mut contents)
        .await
        .expect("read payload");
    contents
}

#[derive(Default)]
struct Faults {
    put: HashSet<String>,
    get: HashSet<String>,
    copy: HashSet<String>,
    remove: HashSet<String>,
}

/// Wraps a store and fails chosen operations on chosen keys with a
/// connection error.
#[derive(Clone)]
pub struct FlakyStore<S> {
    inner: S,
    faults: Arc<Mutex<Faults>>,
}

impl<S: ObjectStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn fail_put(&self, key: &str) {
        self.faults.lock().unwrap().put.insert(key.to_string());
    }

    /// Fails copies whose destination is `key`.
    pub fn fail_copy(&self, key: &str) {
        self.faults.lock().unwrap().copy.insert(key.to_string());
    }

    pub fn fail_get(&self, key: &str) {
        self.faults.lock().unwrap().get.insert(key.to_string());
    }

    pub fn fail_remove(&self, key: &str) {
        self.faults.lock().unwrap().remove.insert(key.to_string());
    }

    fn check(&self, op: &'static str, key: &str) -> StorageResult<()> {
        let faults = self.faults.lock().unwrap();
        let set = match op {
            "put" => &faults.put,
            "get" => &faults.get,
            "copy" => &faults.copy,
            _ => &faults.remove,
        };
        if set.contains(key) {
            return Err(StorageError::Connection {
                op,
                key: key.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionReset, "injected fault"),
            });
        }
        Ok(())
    }
}

impl<S: ObjectStore> ObjectStore for FlakyStore<S> {
    async fn put_object<B>(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: B,
        expected_size: Option<u64>,
    ) -> StorageResult<ObjectEntry>
    where
        B: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.check("put", key)?;
        self.inner
            .put_object(key, content_type, body, expected_size)
            .await
    }

    async fn get_object(&self, key: &str) -> StorageResult<ObjectReader> {
        self.check("get", key)?;
        self.inner.get_object(key).await
    }

    async fn stat_object(&self, key: &str) -> StorageResult<ObjectEntry> {
        self.inner.stat_object(key).await
    }

    async fn object_exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.object_exists(key).await
    }

    async fn list_objects(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<ObjectEntry>> {
        self.inner.list_objects(prefix, recursive).await
    }

    async fn copy_object(&self, from: &str, to: &str) -> StorageResult<()> {
        self.check("copy", to)?;
        self.inner.copy_object(from, to).await
    }

    async fn remove_object(&self, key: &str) -> StorageResult<()> {
        self.check("remove", key)?;
        self.inner.remove_object(key).await
    }

    async fn remove_objects(&self, keys: &[String]) -> Vec<DeleteOutcome> {
        let mut outcomes = Vec::with_capacity(keys.len());
        for key in keys {
            let result = match self.check("remove", key) {
                Ok(()) => self.inner.remove_object(key).await,
                Err(err) => Err(err),
            };
            outcomes.push(DeleteOutcome {
                key: key.clone(),
                result,
            });
        }
        outcomes
    }
}
