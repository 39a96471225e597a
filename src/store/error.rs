//! Error taxonomy shared by the object store gateway and the filesystem
//! service, plus the single place where backend errors are translated.

use std::io::{self, ErrorKind};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("resource `{0}` not found")]
    NotFound(String),
    #[error("resource `{0}` already exists")]
    AlreadyExists(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("storage operation `{op}` on `{key}` failed: {source}")]
    Connection {
        op: &'static str,
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("storage misconfigured: {0}")]
    Configuration(String),
    #[error("storage operation `{op}` on `{key}` failed: {message}")]
    StorageFailure {
        op: &'static str,
        key: String,
        message: String,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn failure(op: &'static str, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageFailure {
            op,
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Translate a metadata database error raised while running `op` on `key`.
pub(crate) fn map_sqlx(op: &'static str, key: &str, err: sqlx::Error) -> StorageError {
    let mapped = match err {
        sqlx::Error::RowNotFound => return StorageError::NotFound(key.to_string()),
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            return StorageError::AlreadyExists(key.to_string());
        }
        sqlx::Error::Io(source) => StorageError::Connection {
            op,
            key: key.to_string(),
            source,
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StorageError::Connection {
            op,
            key: key.to_string(),
            source: io::Error::new(ErrorKind::TimedOut, "metadata pool unavailable"),
        },
        sqlx::Error::Configuration(cause) => StorageError::Configuration(cause.to_string()),
        other => StorageError::failure(op, key, other.to_string()),
    };
    error!(op, key, error = %mapped, "metadata operation failed");
    mapped
}

/// Translate a payload I/O error raised while running `op` on `key`.
pub(crate) fn map_io(op: &'static str, key: &str, err: io::Error) -> StorageError {
    let mapped = match err.kind() {
        ErrorKind::NotFound => return StorageError::NotFound(key.to_string()),
        ErrorKind::AlreadyExists => return StorageError::AlreadyExists(key.to_string()),
        ErrorKind::PermissionDenied => StorageError::Configuration(format!(
            "permission denied during `{op}` on `{key}`: {err}"
        )),
        _ => StorageError::Connection {
            op,
            key: key.to_string(),
            source: err,
        },
    };
    error!(op, key, error = %mapped, "payload operation failed");
    mapped
}

/// Translate an archive writer error. Every zip failure during a download
/// originates from the output sink.
pub(crate) fn map_zip(op: &'static str, key: &str, err: zip::result::ZipError) -> StorageError {
    match err {
        zip::result::ZipError::Io(source) => StorageError::Connection {
            op,
            key: key.to_string(),
            source,
        },
        other => StorageError::failure(op, key, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_taxonomy() {
        let err = map_io("get_object", "a.txt", io::Error::from(ErrorKind::NotFound));
        assert!(matches!(err, StorageError::NotFound(key) if key == "a.txt"));

        let err = map_io(
            "put_object",
            "a.txt",
            io::Error::from(ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, StorageError::Configuration(_)));

        let err = map_io(
            "put_object",
            "a.txt",
            io::Error::from(ErrorKind::ConnectionReset),
        );
        assert!(matches!(
            err,
            StorageError::Connection { op: "put_object", .. }
        ));
    }

    #[test]
    fn sqlx_errors_map_to_taxonomy() {
        let err = map_sqlx("stat_object", "a/", sqlx::Error::RowNotFound);
        assert!(matches!(err, StorageError::NotFound(key) if key == "a/"));

        let err = map_sqlx("list_objects", "a/", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StorageError::Connection { .. }));

        let err = map_sqlx("list_objects", "a/", sqlx::Error::WorkerCrashed);
        assert!(matches!(err, StorageError::StorageFailure { .. }));
    }
}
