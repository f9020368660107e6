//! Reader and replay of the batch file

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::log::{LogRecord, validate_definitions};
use crate::error::{BatchLogError, Error, Result};
use crate::response::Response;
use crate::solicitude::Solicitude;
use crate::types::{BatchId, LifecycleResult, SolicitudeDefinition};

/// Body record of a parsed batch file
#[derive(Clone, Debug, PartialEq)]
pub enum BodyRecord {
    /// Recorded lifecycle event
    Event {
        /// 1-based line the event was read from
        line: usize,
        /// Process that emitted the event
        batch_id: BatchId,
        /// Recorded outcome
        result: LifecycleResult,
        /// Triggering response
        response: Response,
    },
    /// Pass marker or other comment
    Comment {
        /// When the comment was written
        at: DateTime<Utc>,
        /// Comment text
        text: String,
    },
}

/// Parsed batch file
#[derive(Clone, Debug)]
pub struct BatchLog {
    path: PathBuf,
    definitions: Vec<SolicitudeDefinition>,
    body: Vec<BodyRecord>,
}

impl BatchLog {
    /// Read and parse a batch file
    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read batch file '{}': {}", path.display(), e),
            ))
        })?;
        Self::parse(path, &text)
    }

    /// Parse batch file contents
    ///
    /// `path` only labels diagnostics. An unparsable last line without a
    /// terminating newline is an interrupted append and is skipped.
    pub fn parse(path: impl AsRef<Path>, text: &str) -> Result<Self> {
        let path = path.as_ref();
        let torn_tail_allowed = !text.is_empty() && !text.ends_with('\n');
        let lines: Vec<&str> = text.lines().collect();

        let mut definitions = Vec::new();
        let mut body = Vec::new();

        for (index, raw) in lines.iter().enumerate() {
            let line = index + 1;
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }

            let record: LogRecord = match serde_json::from_str(raw) {
                Ok(record) => record,
                Err(e) if torn_tail_allowed && line == lines.len() => {
                    tracing::warn!(
                        path = %path.display(),
                        line,
                        error = %e,
                        "Ignoring partial record at end of batch file"
                    );
                    break;
                }
                Err(e) => {
                    return Err(BatchLogError::Malformed {
                        line,
                        reason: e.to_string(),
                    }
                    .into());
                }
            };

            match record {
                LogRecord::Definition(definition) => {
                    if !body.is_empty() {
                        return Err(BatchLogError::HeaderAfterBody { line }.into());
                    }
                    definitions.push(definition);
                }
                LogRecord::Event {
                    batch_id,
                    result,
                    response,
                } => body.push(BodyRecord::Event {
                    line,
                    batch_id,
                    result,
                    response,
                }),
                LogRecord::Comment { at, text } => body.push(BodyRecord::Comment { at, text }),
            }
        }

        validate_definitions(path, &definitions)?;

        Ok(Self {
            path: path.to_path_buf(),
            definitions,
            body,
        })
    }

    /// Path the log was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Request definitions from the header, in file order
    pub fn definitions(&self) -> &[SolicitudeDefinition] {
        &self.definitions
    }

    /// Body records in file order
    pub fn body(&self) -> &[BodyRecord] {
        &self.body
    }

    /// Number of recorded lifecycle events
    pub fn event_count(&self) -> usize {
        self.body
            .iter()
            .filter(|record| matches!(record, BodyRecord::Event { .. }))
            .count()
    }

    /// Comment texts in file order
    pub fn comments(&self) -> impl Iterator<Item = &str> {
        self.body.iter().filter_map(|record| match record {
            BodyRecord::Comment { text, .. } => Some(text.as_str()),
            BodyRecord::Event { .. } => None,
        })
    }

    /// Rebuild every process by folding the recorded events through
    /// [`Solicitude::apply`]
    ///
    /// Processes are returned in header order. No remote call is made. Fails on
    /// events for unknown processes, on responses the process state cannot
    /// take, and when replay yields a different result than the one recorded.
    pub fn replay(&self) -> Result<Vec<Solicitude>> {
        let mut processes: Vec<Solicitude> = self
            .definitions
            .iter()
            .map(Solicitude::from_definition)
            .collect();
        let index: HashMap<&BatchId, usize> = self
            .definitions
            .iter()
            .enumerate()
            .map(|(i, definition)| (&definition.batch_id, i))
            .collect();

        for record in &self.body {
            let BodyRecord::Event {
                line,
                batch_id,
                result,
                response,
            } = record
            else {
                continue;
            };

            let position = index
                .get(batch_id)
                .copied()
                .ok_or_else(|| BatchLogError::UnknownProcess {
                    batch_id: batch_id.clone(),
                })?;

            let event = processes[position].apply(response.clone()).map_err(|e| {
                tracing::error!(line, batch_id = %batch_id, error = %e, "Replay failed");
                e
            })?;
            if event.result != *result {
                return Err(BatchLogError::ReplayDiverged {
                    batch_id: batch_id.clone(),
                    recorded: *result,
                    replayed: event.result,
                }
                .into());
            }
        }

        tracing::debug!(
            path = %self.path.display(),
            processes = processes.len(),
            events = self.event_count(),
            "Replayed batch log"
        );
        Ok(processes)
    }
}
