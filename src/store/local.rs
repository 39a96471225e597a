//! src/store/local.rs
//!
//! LocalObjectStore — a single-bucket, S3-like object store backed by SQLite
//! for metadata and local disk for payloads. Payloads are sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{object-id}`, so keys never become
//! directory names on disk and a folder marker can coexist with its members.

use super::{
    DIRECTORY_CONTENT_TYPE, DeleteOutcome, ObjectEntry, ObjectReader, ObjectStore,
    error::{StorageError, StorageResult, map_io, map_sqlx},
};
use crate::{
    models::{
        bucket::Bucket,
        object::{StoredObject, TYPE_DIRECTORY, TYPE_FILE},
    },
    paths,
};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    collections::BTreeMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    bucket: Arc<Bucket>,
}

/// Outcome of the readiness probes, `Err` carrying a human readable reason.
#[derive(Debug)]
pub struct Readiness {
    pub sqlite: Result<(), String>,
    pub disk: Result<(), String>,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.sqlite.is_ok() && self.disk.is_ok()
    }
}

impl LocalObjectStore {
    /// Open the store on `bucket_name`, creating the bucket row and its
    /// payload directory when they do not exist yet.
    pub async fn open(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        bucket_name: &str,
    ) -> StorageResult<Self> {
        ensure_bucket_name_safe(bucket_name)?;
        let base_path = base_path.into();

        let bucket = match fetch_bucket(&db, bucket_name).await? {
            Some(bucket) => bucket,
            None => create_bucket(&db, bucket_name).await?,
        };

        let store = Self {
            db,
            base_path,
            bucket: Arc::new(bucket),
        };
        let root = store.bucket_root();
        fs::create_dir_all(&root)
            .await
            .map_err(|err| map_io("open", bucket_name, err))?;

        Ok(store)
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    /// Reject keys that could escape the payload tree or confuse listings.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        let reason = if key.is_empty() {
            "key is empty"
        } else if key.len() > MAX_OBJECT_KEY_LEN {
            "key is too long"
        } else if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
            "key must be relative and must not contain a `..` segment"
        } else if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            "key contains control characters or backslashes"
        } else {
            return Ok(());
        };
        Err(StorageError::InvalidArgument(format!(
            "invalid object key `{key}`: {reason}"
        )))
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket.name)
    }

    /// Two-level shard directories from MD5(bucket/key), 00–ff each.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn payload_path(&self, key: &str, id: Uuid) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.bucket.name, key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(id.to_string());
        path
    }

    async fn find_object(&self, op: &'static str, key: &str) -> StorageResult<Option<StoredObject>> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, bucket_id, key, content_type, size_bytes, etag, resource_type, last_modified
             FROM objects WHERE bucket_id = ? AND key = ?",
        )
        .bind(self.bucket.id)
        .bind(key)
        .fetch_optional(&*self.db)
        .await
        .map_err(|err| map_sqlx(op, key, err))
    }

    async fn fetch_object(&self, op: &'static str, key: &str) -> StorageResult<StoredObject> {
        self.find_object(op, key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    /// All rows whose key starts with `prefix`, ordered by key.
    ///
    /// `instr` keeps the match literal; `LIKE` would treat `_` and `%` in
    /// file names as wildcards.
    async fn fetch_prefixed(&self, prefix: &str) -> StorageResult<Vec<StoredObject>> {
        let rows = sqlx::query_as::<_, StoredObject>(
            "SELECT id, bucket_id, key, content_type, size_bytes, etag, resource_type, last_modified
             FROM objects
             WHERE bucket_id = ? AND instr(key, ?) = 1
             ORDER BY key ASC",
        )
        .bind(self.bucket.id)
        .bind(prefix)
        .fetch_all(&*self.db)
        .await
        .map_err(|err| map_sqlx("list_objects", prefix, err))?;

        Ok(rows
            .into_iter()
            .filter(|row| row.key.starts_with(prefix))
            .collect())
    }

    /// Stream `body` into the payload file for `target`.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5/etag and size while streaming.
    /// - Renames into the final location once the data is durable.
    ///
    /// Cleans up the temp file on every error path.
    async fn write_payload<S>(
        &self,
        key: &str,
        target: &Path,
        body: S,
        expected_size: Option<u64>,
    ) -> StorageResult<(u64, String)>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let parent = target.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::failure("put_object", key, "payload path missing parent directory")
        })?;
        fs::create_dir_all(&parent)
            .await
            .map_err(|err| map_io("put_object", key, err))?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        match stream_into(&tmp_path, body, expected_size).await {
            Ok((size, etag)) => {
                if let Err(err) = fs::rename(&tmp_path, target).await {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(map_io("put_object", key, err));
                }
                Ok((size, etag))
            }
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                Err(map_io("put_object", key, err))
            }
        }
    }

    /// Remove a payload file and prune shard directories left empty.
    /// Missing files are fine; other failures only leave an orphan payload.
    async fn discard_payload(&self, path: &Path) {
        match fs::remove_file(path).await {
            Ok(_) => debug!("removed payload {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", path.display());
            }
            Err(err) => {
                warn!("failed to remove payload {}: {}", path.display(), err);
                return;
            }
        }

        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root()).await;
        }
    }

    /// Recursively remove empty directories up to the bucket root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    /// Probe the metadata database and the payload directory.
    pub async fn readiness(&self) -> Readiness {
        let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await
        {
            Ok(1) => Ok(()),
            Ok(v) => Err(format!("unexpected result: {}", v)),
            Err(e) => Err(format!("error: {}", e)),
        };

        let probe = self.bucket_root().join(format!(".readyz-{}", Uuid::new_v4()));
        let disk = match fs::write(&probe, b"readyz").await {
            Ok(_) => {
                let read_back = fs::read(&probe).await;
                let _ = fs::remove_file(&probe).await;
                match read_back {
                    Ok(bytes) if bytes == b"readyz" => Ok(()),
                    Ok(_) => Err("file content mismatch".to_string()),
                    Err(e) => Err(format!("could not read probe file: {}", e)),
                }
            }
            Err(e) => Err(format!("could not write probe file: {}", e)),
        };

        Readiness { sqlite, disk }
    }
}

impl ObjectStore for LocalObjectStore {
    async fn put_object<S>(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: S,
        expected_size: Option<u64>,
    ) -> StorageResult<ObjectEntry>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;
        // Cheap early answer; the unique index below is what actually
        // enforces no-overwrite.
        if self.find_object("put_object", key).await?.is_some() {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }

        let id = Uuid::new_v4();
        let payload = self.payload_path(key, id);
        let (size_bytes, etag) = self
            .write_payload(key, &payload, body, expected_size)
            .await?;

        let (resource_type, content_type) = if paths::is_folder(key) {
            (TYPE_DIRECTORY, Some(DIRECTORY_CONTENT_TYPE.to_string()))
        } else {
            (TYPE_FILE, content_type.map(str::to_string))
        };

        let insert_result = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes, etag, resource_type, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, bucket_id, key, content_type, size_bytes, etag, resource_type, last_modified
            "#,
        )
        .bind(id)
        .bind(self.bucket.id)
        .bind(key)
        .bind(content_type)
        .bind(size_bytes as i64)
        .bind(&etag)
        .bind(resource_type)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => {
                debug!(key, size_bytes, "stored object");
                Ok(obj.into())
            }
            Err(err) => {
                self.discard_payload(&payload).await;
                Err(map_sqlx("put_object", key, err))
            }
        }
    }

    async fn get_object(&self, key: &str) -> StorageResult<ObjectReader> {
        self.ensure_key_safe(key)?;
        let object = self.fetch_object("get_object", key).await?;
        let file = File::open(self.payload_path(key, object.id))
            .await
            .map_err(|err| map_io("get_object", key, err))?;

        Ok(ObjectReader {
            entry: object.into(),
            body: Box::pin(file),
        })
    }

    async fn stat_object(&self, key: &str) -> StorageResult<ObjectEntry> {
        self.ensure_key_safe(key)?;
        Ok(self.fetch_object("stat_object", key).await?.into())
    }

    async fn object_exists(&self, key: &str) -> StorageResult<bool> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM objects WHERE bucket_id = ? AND key = ?)",
        )
        .bind(self.bucket.id)
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| map_sqlx("object_exists", key, err))?;
        Ok(found != 0)
    }

    async fn list_objects(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<ObjectEntry>> {
        let rows = self.fetch_prefixed(prefix).await?;
        if recursive {
            return Ok(rows.into_iter().map(ObjectEntry::from).collect());
        }

        // Keyed by entry key so real folder markers and the prefixes of
        // deeper members collapse into one directory entry.
        let mut entries = BTreeMap::new();
        for obj in rows {
            match compute_common_prefix(&obj.key, prefix, paths::SEPARATOR) {
                Some(common) if common != obj.key => {
                    entries
                        .entry(common.clone())
                        .or_insert_with(|| ObjectEntry::prefix(common));
                }
                _ => {
                    entries.insert(obj.key.clone(), ObjectEntry::from(obj));
                }
            }
        }
        Ok(entries.into_values().collect())
    }

    async fn copy_object(&self, from: &str, to: &str) -> StorageResult<()> {
        self.ensure_key_safe(from)?;
        self.ensure_key_safe(to)?;
        let source = self.fetch_object("copy_object", from).await?;
        let previous = self.find_object("copy_object", to).await?;

        let id = Uuid::new_v4();
        let src_payload = self.payload_path(from, source.id);
        let dst_payload = self.payload_path(to, id);
        if let Some(parent) = dst_payload.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| map_io("copy_object", to, err))?;
        }
        fs::copy(&src_payload, &dst_payload)
            .await
            .map_err(|err| map_io("copy_object", from, err))?;

        let resource_type = if paths::is_folder(to) {
            TYPE_DIRECTORY
        } else {
            TYPE_FILE
        };
        let upsert = sqlx::query(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes, etag, resource_type, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                id = excluded.id,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                resource_type = excluded.resource_type,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(id)
        .bind(self.bucket.id)
        .bind(to)
        .bind(&source.content_type)
        .bind(source.size_bytes)
        .bind(&source.etag)
        .bind(resource_type)
        .bind(Utc::now())
        .execute(&*self.db)
        .await;

        if let Err(err) = upsert {
            self.discard_payload(&dst_payload).await;
            return Err(map_sqlx("copy_object", to, err));
        }
        if let Some(previous) = previous {
            self.discard_payload(&self.payload_path(to, previous.id)).await;
        }

        debug!(from, to, "copied object");
        Ok(())
    }

    async fn remove_object(&self, key: &str) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let removed: Option<Uuid> = sqlx::query_scalar(
            "DELETE FROM objects WHERE bucket_id = ? AND key = ? RETURNING id",
        )
        .bind(self.bucket.id)
        .bind(key)
        .fetch_optional(&*self.db)
        .await
        .map_err(|err| map_sqlx("remove_object", key, err))?;

        let Some(id) = removed else {
            return Err(StorageError::NotFound(key.to_string()));
        };
        self.discard_payload(&self.payload_path(key, id)).await;
        Ok(())
    }

    async fn remove_objects(&self, keys: &[String]) -> Vec<DeleteOutcome> {
        let mut outcomes = Vec::with_capacity(keys.len());
        for key in keys {
            let result = self.remove_object(key).await;
            outcomes.push(DeleteOutcome {
                key: key.clone(),
                result,
            });
        }
        outcomes
    }
}

/// Copy `body` into a fresh file at `path`, returning size and hex MD5.
async fn stream_into<S>(path: &Path, body: S, expected_size: Option<u64>) -> io::Result<(u64, String)>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    let mut file = File::create(path).await?;
    let mut size_bytes: u64 = 0;
    let mut digest = Context::new();

    pin_mut!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as u64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    if let Some(expected) = expected_size {
        if expected != size_bytes {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("expected {} bytes, received {}", expected, size_bytes),
            ));
        }
    }

    Ok((size_bytes, format!("{:x}", digest.compute())))
}

async fn fetch_bucket(db: &SqlitePool, name: &str) -> StorageResult<Option<Bucket>> {
    sqlx::query_as::<_, Bucket>("SELECT id, name, created_at FROM buckets WHERE name = ?")
        .bind(name)
        .fetch_optional(db)
        .await
        .map_err(|err| map_sqlx("open", name, err))
}

async fn create_bucket(db: &SqlitePool, name: &str) -> StorageResult<Bucket> {
    let bucket = Bucket {
        id: Uuid::new_v4(),
        name: name.to_string(),
        created_at: Utc::now(),
    };

    match sqlx::query("INSERT INTO buckets (id, name, created_at) VALUES (?, ?, ?)")
        .bind(bucket.id)
        .bind(&bucket.name)
        .bind(bucket.created_at)
        .execute(db)
        .await
    {
        Ok(_) => {
            info!("Created bucket {}", name);
            Ok(bucket)
        }
        // Another instance created it first.
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            fetch_bucket(db, name)
                .await?
                .ok_or_else(|| StorageError::NotFound(name.to_string()))
        }
        Err(err) => Err(map_sqlx("open", name, err)),
    }
}

/// Validate the configured bucket name against S3 naming rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
fn ensure_bucket_name_safe(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| {
        Err(StorageError::Configuration(format!(
            "bucket `{}` invalid: {}",
            name, reason
        )))
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return invalid("must be between 3 and 63 characters");
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return invalid("allowed characters are lowercase letters, digits, dots, and hyphens");
    }
    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return invalid("must start and end with a lowercase letter or digit");
    }
    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return invalid("cannot contain consecutive dots or dot-hyphen combinations");
    }
    if is_ipv4_like(name) {
        return invalid("must not be formatted like an IP address");
    }
    Ok(())
}

/// The first-level "common prefix" of `key` below `prefix`, S3 delimiter
/// style: `root/a/b/c.txt` under `root/` groups into `root/a/`. `None` when
/// `key` has no delimiter past the prefix.
fn compute_common_prefix(key: &str, prefix: &str, delimiter: char) -> Option<String> {
    let after_prefix = key.strip_prefix(prefix)?;
    let pos = after_prefix.find(delimiter)?;
    let mut combined = String::with_capacity(prefix.len() + pos + 1);
    combined.push_str(prefix);
    combined.push_str(&after_prefix[..pos + delimiter.len_utf8()]);
    Some(combined)
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
