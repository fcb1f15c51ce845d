//! Append-only output file.
//!
//! Every write request goes through one [`AppendLog`]. The writer lock is held
//! for the whole request, so a payload always lands as one contiguous run of
//! bytes even when two requests arrive together.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use futures_util::{Stream, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// The single destination file shared by all write requests.
#[derive(Debug)]
pub struct AppendLog {
    path: PathBuf,
    read_chunk_bytes: usize,
    writer: Mutex<()>,
}

impl AppendLog {
    /// Create a log for `path`. The file itself is created on first append.
    pub fn new(path: impl Into<PathBuf>, read_chunk_bytes: usize) -> Self {
        Self {
            path: path.into(),
            read_chunk_bytes: read_chunk_bytes.max(1),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_chunk_bytes(&self) -> usize {
        self.read_chunk_bytes
    }

    /// Current size of the output file in bytes (0 when it does not exist yet).
    pub fn file_len(&self) -> Result<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e).with_context(|| format!("stat output {:?}", self.path)),
        }
    }

    /// Append `body` to the file until the stream ends and return the byte count.
    ///
    /// The file is opened in append mode for this call only and closed before
    /// the writer lock is released. Each chunk is split into increments of at
    /// most `read_chunk_bytes` and written as soon as it arrives. If the stream
    /// fails part way, the bytes already written stay in the file.
    pub async fn append_stream<S, B, E>(&self, body: S) -> Result<u64>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let _writer = self.writer.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open output {:?}", self.path))?;

        let copied = self.copy_increments(&mut file, body).await;
        // Pending writes must land before the next request takes the lock.
        let flushed = file.flush().await;
        let written = copied?;
        flushed.with_context(|| format!("flush output {:?}", self.path))?;
        Ok(written)
    }

    async fn copy_increments<S, B, E>(&self, file: &mut File, body: S) -> Result<u64>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let mut body = std::pin::pin!(body);
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| anyhow!("read request body: {e}"))?;
            for increment in chunk.as_ref().chunks(self.read_chunk_bytes) {
                file.write_all(increment)
                    .await
                    .with_context(|| format!("write output {:?}", self.path))?;
                written += increment.len() as u64;
            }
        }
        Ok(written)
    }
}
