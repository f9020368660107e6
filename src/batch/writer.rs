//! Append-only writer of the batch file

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use super::log::{LogRecord, validate_definitions};
use crate::config::LogConfig;
use crate::error::{BatchLogError, Error, Result};
use crate::events::LifecycleListener;
use crate::types::{LifecycleEvent, SolicitudeDefinition};

/// Single writer of one batch file
///
/// Every record is written as one line and flushed before the append returns,
/// so records reach the file in the order they were appended. After
/// [`close`](Self::close) every append fails with [`BatchLogError::Closed`].
pub struct BatchLogWriter {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    sync_on_append: bool,
    records_written: usize,
}

impl BatchLogWriter {
    /// Start a new batch file with its header
    ///
    /// Fails if the file exists and is not empty.
    pub async fn create(
        path: impl AsRef<Path>,
        definitions: &[SolicitudeDefinition],
        config: &LogConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        validate_definitions(path, definitions)?;
        if let Ok(metadata) = tokio::fs::metadata(path).await
            && metadata.len() > 0
        {
            return Err(BatchLogError::AlreadyExists {
                path: path.to_path_buf(),
            }
            .into());
        }
        Self::open(path, definitions, config).await
    }

    /// Open a batch file for appending
    ///
    /// A missing or empty file gets the header written first. A trailing
    /// partial line left by an interrupted append is cut off so new records
    /// start on a fresh line.
    pub async fn open(
        path: impl AsRef<Path>,
        definitions: &[SolicitudeDefinition],
        config: &LogConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to open batch file '{}': {}", path.display(), e),
                ))
            })?;

        let mut len = file.metadata().await?.len();
        if len > 0 {
            len = truncate_torn_tail(&mut file, path, len).await?;
        }
        let fresh = len == 0;
        file.seek(std::io::SeekFrom::End(0)).await?;

        let mut writer = Self {
            path: path.to_path_buf(),
            file: Some(BufWriter::new(file)),
            sync_on_append: config.sync_on_append,
            records_written: 0,
        };

        if fresh {
            validate_definitions(path, definitions)?;
            for definition in definitions {
                writer
                    .write_record(&LogRecord::Definition(definition.clone()))
                    .await?;
            }
            tracing::debug!(
                path = %path.display(),
                requests = definitions.len(),
                "Wrote batch header"
            );
        }

        Ok(writer)
    }

    /// Append a lifecycle event
    pub async fn append_event(&mut self, event: &LifecycleEvent) -> Result<()> {
        let batch_id = event
            .batch_id
            .clone()
            .ok_or(BatchLogError::MissingBatchId)?;
        self.write_record(&LogRecord::Event {
            batch_id,
            result: event.result,
            response: event.response.clone(),
        })
        .await
    }

    /// Append a timestamped comment
    pub async fn append_comment(&mut self, text: impl Into<String>) -> Result<()> {
        self.write_record(&LogRecord::Comment {
            at: Utc::now(),
            text: text.into(),
        })
        .await
    }

    /// Flush, sync and release the file
    ///
    /// Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.get_ref().sync_all().await?;
            tracing::debug!(
                path = %self.path.display(),
                records = self.records_written,
                "Closed batch log"
            );
        }
        Ok(())
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Records appended through this writer, header included
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Path of the batch file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_record(&mut self, record: &LogRecord) -> Result<()> {
        let file = self.file.as_mut().ok_or(BatchLogError::Closed)?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        if self.sync_on_append {
            file.get_ref().sync_data().await?;
        }
        self.records_written += 1;
        Ok(())
    }
}

/// Repair an unterminated last line left by a crash mid-append
///
/// A tail that still parses as a record is kept and gets its newline, the
/// same way the reader keeps it; anything else is cut off. Returns the
/// resulting length.
async fn truncate_torn_tail(file: &mut File, path: &Path, len: u64) -> Result<u64> {
    let mut contents = Vec::with_capacity(len as usize);
    file.seek(std::io::SeekFrom::Start(0)).await?;
    file.read_to_end(&mut contents).await?;

    if contents.last() == Some(&b'\n') {
        return Ok(len);
    }
    let keep = contents
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);

    let tail = &contents[keep..];
    if serde_json::from_slice::<LogRecord>(tail).is_ok() {
        tracing::warn!(
            path = %path.display(),
            "Terminating complete record at end of batch file"
        );
        file.seek(std::io::SeekFrom::End(0)).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        return Ok(len + 1);
    }

    tracing::warn!(
        path = %path.display(),
        dropped_bytes = tail.len(),
        "Discarding partial record at end of batch file"
    );
    file.set_len(keep as u64).await?;
    Ok(keep as u64)
}

/// Listener appending every lifecycle event to a shared writer
pub(crate) struct LogListener {
    writer: Arc<Mutex<BatchLogWriter>>,
    recorded: AtomicUsize,
}

impl LogListener {
    pub(crate) fn new(writer: Arc<Mutex<BatchLogWriter>>) -> Self {
        Self {
            writer,
            recorded: AtomicUsize::new(0),
        }
    }

    /// Events appended so far
    pub(crate) fn recorded(&self) -> usize {
        self.recorded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LifecycleListener for LogListener {
    async fn on_event(&self, event: &LifecycleEvent) -> Result<()> {
        self.writer.lock().await.append_event(event).await?;
        self.recorded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
