//! Local filesystem record store.
//!
//! Each stream is a UTF-8 file of newline-delimited JSON records. A record is
//! only considered written once its trailing `\n` is on disk, so a crash
//! mid-append can only ever lose that one record.
//!
//! ## Storage Layout
//!
//! ```text
//! data/
//! ├── posts.jsonl      # Raw stream: one PostRecord per line
//! └── results.jsonl    # Result stream: one AnalysisRecord per line
//! ```

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::{Serialize, de::DeserializeOwned};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, Take};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::PathsConfig;
use crate::storage::RecordStream;

/// One stream file and the lock that serializes its appends.
#[derive(Debug, Clone)]
struct StreamFile {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl StreamFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Append-only JSONL store for the raw and result streams.
#[derive(Debug, Clone)]
pub struct LocalStore {
    posts: StreamFile,
    results: StreamFile,
    durable: bool,
}

impl LocalStore {
    /// Open the store at the configured paths.
    ///
    /// Creates missing parent directories and repairs torn tails left by a
    /// previous crash.
    pub async fn open(paths: &PathsConfig) -> Result<Self> {
        let store = Self {
            posts: StreamFile::new(paths.posts_file.clone()),
            results: StreamFile::new(paths.results_file.clone()),
            durable: paths.durable_writes,
        };

        for stream in RecordStream::ALL {
            let path = store.path(stream);
            ensure_parent(path).await?;
            if repair_tail(path).await? {
                log::warn!(
                    "Repaired torn tail in {} stream at {}",
                    stream,
                    path.display()
                );
            }
        }

        Ok(store)
    }

    /// Open a store with `posts.jsonl` and `results.jsonl` inside `dir`.
    pub async fn in_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        Self::open(&PathsConfig {
            posts_file: dir.join("posts.jsonl"),
            results_file: dir.join("results.jsonl"),
            durable_writes: true,
        })
        .await
    }

    fn file(&self, stream: RecordStream) -> &StreamFile {
        match stream {
            RecordStream::Posts => &self.posts,
            RecordStream::Results => &self.results,
        }
    }

    /// File backing a stream.
    pub fn path(&self, stream: RecordStream) -> &Path {
        &self.file(stream).path
    }

    /// Append one record as a single line and make it durable.
    ///
    /// Appends to the same stream are serialized; the whole line goes out in
    /// one write while the stream lock is held.
    pub async fn append<T: Serialize + ?Sized>(
        &self,
        stream: RecordStream,
        record: &T,
    ) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let file = self.file(stream);
        let _guard = file.lock.lock().await;

        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file.path)
            .await?;
        handle.write_all(&line).await?;
        handle.flush().await?;
        if self.durable {
            handle.sync_data().await?;
        }
        Ok(())
    }

    /// Lazily read every complete record of a stream in file order.
    ///
    /// Each call starts over from the beginning of the file. Only bytes that
    /// were fully appended when the stream is first polled are read, so a
    /// concurrent writer is never observed mid-record. Malformed lines are
    /// logged and skipped. A missing file yields an empty stream.
    pub fn read_all<T>(&self, stream: RecordStream) -> impl Stream<Item = T> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let file = self.file(stream).clone();
        futures::stream::unfold(ReadState::Pending(file), move |state| {
            next_record::<T>(state, stream)
        })
    }

    /// Number of well-formed records in a stream.
    pub async fn count(&self, stream: RecordStream) -> usize {
        self.read_all::<serde_json::Value>(stream).count().await
    }
}

enum ReadState {
    Pending(StreamFile),
    Reading {
        reader: BufReader<Take<File>>,
        path: PathBuf,
        line_no: usize,
    },
}

async fn next_record<T: DeserializeOwned>(
    state: ReadState,
    stream: RecordStream,
) -> Option<(T, ReadState)> {
    let (mut reader, path, mut line_no) = match state {
        ReadState::Pending(file) => match open_snapshot(&file).await {
            Ok(Some(reader)) => (reader, file.path, 0),
            Ok(None) => return None,
            Err(e) => {
                log::warn!(
                    "Cannot read {} stream at {}: {}",
                    stream,
                    file.path.display(),
                    e
                );
                return None;
            }
        },
        ReadState::Reading {
            reader,
            path,
            line_no,
        } => (reader, path, line_no),
    };

    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return None,
            Ok(_) => {}
            Err(e) => {
                log::warn!("Read error in {} at line {}: {}", path.display(), line_no + 1, e);
                return None;
            }
        }
        line_no += 1;

        if buf.last() != Some(&b'\n') {
            log::warn!(
                "Skipping unterminated {} record at {}:{} ({} bytes)",
                stream,
                path.display(),
                line_no,
                buf.len()
            );
            return None;
        }

        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_slice::<T>(line) {
            Ok(record) => {
                let next = ReadState::Reading {
                    reader,
                    path,
                    line_no,
                };
                return Some((record, next));
            }
            Err(e) => log::warn!(
                "Skipping malformed {} record at {}:{}: {}",
                stream,
                path.display(),
                line_no,
                e
            ),
        }
    }
}

/// Open a stream file limited to the bytes present right now.
///
/// The length is taken under the append lock, so it always falls on a record
/// boundary written by this process.
async fn open_snapshot(file: &StreamFile) -> std::io::Result<Option<BufReader<Take<File>>>> {
    let (handle, len) = {
        let _guard = file.lock.lock().await;
        let handle = match File::open(&file.path).await {
            Ok(handle) => handle,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let len = handle.metadata().await?.len();
        (handle, len)
    };
    Ok(Some(BufReader::new(handle.take(len))))
}

/// Ensure parent directory exists.
async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Terminate a partial last line so the next append starts a fresh record.
///
/// Returns `true` if the file needed repair.
async fn repair_tail(path: &Path) -> Result<bool> {
    let mut file = match OpenOptions::new().read(true).append(true).open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(AppError::Io(e)),
    };

    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(false);
    }

    file.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    if last[0] == b'\n' {
        return Ok(false);
    }

    file.write_all(b"\n").await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(true)
}
