//! Download strategies: a file streams its payload as is, a folder streams
//! a zip archive of everything beneath it.
//!
//! The zip writer runs on a blocking thread and writes into a bounded pipe
//! whose other end is copied to the sink, so the client receives entries as
//! they are compressed. A member that cannot be opened is logged and left
//! out; a sink that stops accepting bytes ends the download with an error
//! and the writer stops at its next write.

use crate::{
    paths,
    store::{
        ObjectEntry, ObjectStore, StorageError, StorageResult,
        error::{map_io, map_zip},
    },
};
use std::io::{Read, Write};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream},
    runtime::Handle,
};
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, warn};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// Copy granularity for every download.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// A download resolved from the shape of the requested path.
#[derive(Debug, Clone)]
pub enum Download<S> {
    File { store: S, key: String },
    Folder { store: S, prefix: String },
}

impl<S: ObjectStore> Download<S> {
    pub fn for_path(store: S, path: &str) -> Self {
        if paths::is_folder(path) {
            Download::Folder {
                store,
                prefix: path.to_string(),
            }
        } else {
            Download::File {
                store,
                key: path.to_string(),
            }
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Download::File { key, .. } => key,
            Download::Folder { prefix, .. } => prefix,
        }
    }

    /// File name to offer the client.
    pub fn filename(&self) -> String {
        paths::filename_for_download(self.path())
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Download::File { .. } => "application/octet-stream",
            Download::Folder { .. } => "application/zip",
        }
    }

    /// Write the download into `sink`, returning the number of bytes sent.
    pub async fn stream_to<W>(self, sink: W) -> StorageResult<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            Download::File { store, key } => {
                let reader = store.get_object(&key).await?;
                let sent = copy_to_sink(reader.body, sink, &key).await?;
                debug!(key = %key, sent, "file download complete");
                Ok(sent)
            }
            Download::Folder { store, prefix } => {
                let members = store.list_objects(&prefix, true).await?;
                let (pipe_writer, pipe_reader) = tokio::io::duplex(CHUNK_SIZE * 4);
                let handle = Handle::current();
                let archive_prefix = prefix.clone();
                let builder = tokio::task::spawn_blocking(move || {
                    write_archive(&handle, &store, &archive_prefix, members, pipe_writer)
                });

                // Returns once the writer is done or the sink gave up; either
                // way the pipe is closed and the builder winds down.
                let copied = copy_to_sink(pipe_reader, sink, &prefix).await;
                let built = builder
                    .await
                    .map_err(|err| StorageError::failure("download", prefix.as_str(), err.to_string()))?;

                let sent = copied?;
                built?;
                info!(prefix = %prefix, sent, "folder download complete");
                Ok(sent)
            }
        }
    }
}

/// Copy `reader` to `sink` in [`CHUNK_SIZE`] pieces and close the sink.
async fn copy_to_sink<R, W>(mut reader: R, mut sink: W, key: &str) -> StorageResult<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|err| map_io("download", key, err))?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n])
            .await
            .map_err(|err| sink_error(key, err))?;
        sent += n as u64;
    }
    sink.shutdown().await.map_err(|err| sink_error(key, err))?;
    Ok(sent)
}

fn sink_error(key: &str, err: std::io::Error) -> StorageError {
    warn!(key, error = %err, "download sink closed");
    StorageError::Connection {
        op: "download",
        key: key.to_string(),
        source: err,
    }
}

/// Zip every member under `prefix` straight into `pipe`. Runs on a blocking
/// thread; returns once the central directory is written.
fn write_archive<S: ObjectStore>(
    handle: &Handle,
    store: &S,
    prefix: &str,
    members: Vec<ObjectEntry>,
    pipe: DuplexStream,
) -> StorageResult<()> {
    let out = SyncIoBridge::new_with_handle(pipe, handle.clone());
    let mut zip = ZipWriter::new_stream(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut skipped = 0usize;

    for member in members {
        let name = paths::relative_path(&member.key, prefix);
        if name.is_empty() {
            continue;
        }
        if member.is_dir {
            zip.add_directory(name, options)
                .map_err(|err| map_zip("download", &member.key, err))?;
            continue;
        }

        let reader = match handle.block_on(store.get_object(&member.key)) {
            Ok(reader) => reader,
            Err(err) => {
                warn!(key = %member.key, error = %err, "skipping unreadable archive member");
                skipped += 1;
                continue;
            }
        };

        zip.start_file(name, options)
            .map_err(|err| map_zip("download", &member.key, err))?;
        let mut body = SyncIoBridge::new_with_handle(reader.body, handle.clone());
        if !copy_member(&mut body, &mut zip, &member.key)? {
            // Bytes already went out; the entry closes with what was read.
            skipped += 1;
        }
    }

    let mut out = zip
        .finish()
        .map_err(|err| map_zip("download", prefix, err))?;
    out.flush().map_err(|err| map_io("download", prefix, err))?;

    if skipped > 0 {
        warn!(prefix, skipped, "archive built without some members");
    }
    Ok(())
}

/// Copy one member into the archive. `Ok(false)` means the member could not
/// be read to the end; write failures are fatal.
fn copy_member<R: Read, W: Write>(body: &mut R, zip: &mut W, key: &str) -> StorageResult<bool> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => return Ok(true),
            Ok(n) => n,
            Err(err) => {
                warn!(key, error = %err, "failed to read archive member");
                return Ok(false);
            }
        };
        zip.write_all(&buf[..n])
            .map_err(|err| map_io("download", key, err))?;
    }
}
