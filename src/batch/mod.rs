//! Batch orchestration and the durable batch log
//!
//! A [`Batch`] owns a fixed set of request processes and the file they are
//! logged to. Each [`run_pass`](Batch::run_pass) advances every pending process
//! once over a shared remote connection and appends every lifecycle event to
//! the file as it happens. [`Batch::open`] rebuilds the exact in-memory state
//! from that file after a restart.
//!
//! - `log` - record format
//! - `writer` - append-only writer
//! - `reader` - parser and replay

mod log;
mod reader;
mod writer;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use log::LogRecord;
pub use reader::{BatchLog, BodyRecord};
pub use writer::BatchLogWriter;

use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, LifecycleListener, ListenerId, Subscription};
use crate::remote::RemoteProtocol;
use crate::repository::DownloadRepository;
use crate::solicitude::{AdvanceContext, PauseHandle, Solicitude, SolicitudeSnapshot};
use crate::types::{AccountRef, BatchId, PassSummary, SolicitudeDefinition};
use writer::LogListener;

/// External collaborators of a batch
#[derive(Clone)]
pub struct BatchServices {
    /// Resolves accounts to signing identities
    pub credentials: Arc<dyn CredentialStore>,
    /// Receives fetched packages
    pub repository: Arc<dyn DownloadRepository>,
}

/// Group of request processes driven together and logged to one file
///
/// A rejection is terminal within a batch. A rejected process is no longer
/// pending, so later passes skip it and never make the call whose accepted
/// answer would clear the rejection. Resubmit the query in a new batch to
/// try again.
pub struct Batch {
    path: PathBuf,
    order: Vec<BatchId>,
    solicitudes: HashMap<BatchId, Solicitude>,
    services: BatchServices,
    config: Arc<Config>,
    dispatcher: EventDispatcher,
}

impl Batch {
    /// Create a new batch file and the processes it defines
    ///
    /// Fails if `definitions` is empty, repeats a batch id, or the file already
    /// holds data.
    pub async fn create(
        path: impl AsRef<Path>,
        definitions: Vec<SolicitudeDefinition>,
        services: BatchServices,
        config: Config,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut writer = BatchLogWriter::create(path, &definitions, &config.log).await?;
        writer.close().await?;
        tracing::info!(path = %path.display(), requests = definitions.len(), "Created batch");

        let processes = definitions.iter().map(Solicitude::from_definition).collect();
        Ok(Self::assemble(path, processes, services, config))
    }

    /// Load a batch by replaying its file
    ///
    /// No remote call is made; every process ends up in the state it had
    /// after the last record that reached the file.
    pub async fn open(
        path: impl AsRef<Path>,
        services: BatchServices,
        config: Config,
    ) -> Result<Self> {
        let path = path.as_ref();
        let log = BatchLog::read(path).await?;
        let processes = log.replay()?;
        let batch = Self::assemble(path, processes, services, config);
        tracing::info!(
            path = %path.display(),
            requests = batch.len(),
            events = log.event_count(),
            pending = batch.pending_ids().len(),
            "Opened batch"
        );
        Ok(batch)
    }

    fn assemble(
        path: &Path,
        processes: Vec<Solicitude>,
        services: BatchServices,
        config: Config,
    ) -> Self {
        let mut order = Vec::with_capacity(processes.len());
        let mut solicitudes = HashMap::with_capacity(processes.len());
        for process in processes {
            // Processes built from definitions always carry their batch id
            if let Some(id) = process.batch_id().cloned() {
                order.push(id.clone());
                solicitudes.insert(id, process);
            }
        }
        Self {
            path: path.to_path_buf(),
            order,
            solicitudes,
            services,
            config: Arc::new(config),
            dispatcher: EventDispatcher::new(),
        }
    }

    /// Path of the batch file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of processes
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the batch has no processes (never true for a loaded batch)
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Batch ids in definition order
    pub fn ids(&self) -> &[BatchId] {
        &self.order
    }

    /// Process by batch id
    pub fn get(&self, id: &BatchId) -> Option<&Solicitude> {
        self.solicitudes.get(id)
    }

    /// Processes in definition order
    pub fn iter(&self) -> impl Iterator<Item = (&BatchId, &Solicitude)> {
        self.order
            .iter()
            .filter_map(|id| self.solicitudes.get(id).map(|process| (id, process)))
    }

    /// Definitions of all processes, in order
    pub fn definitions(&self) -> Vec<SolicitudeDefinition> {
        self.iter()
            .map(|(id, process)| SolicitudeDefinition {
                batch_id: id.clone(),
                account: process.account().clone(),
                query: process.query().clone(),
            })
            .collect()
    }

    /// Snapshots of all processes, in order
    pub fn snapshots(&self) -> Vec<SolicitudeSnapshot> {
        self.iter().map(|(_, process)| process.snapshot()).collect()
    }

    /// Any process still pending
    ///
    /// Rejected and completed processes never count as pending.
    pub fn is_pending(&self) -> bool {
        self.solicitudes.values().any(Solicitude::is_pending)
    }

    /// Ids of pending processes, in order
    pub fn pending_ids(&self) -> Vec<BatchId> {
        self.iter()
            .filter(|(_, process)| process.is_pending())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Pause handle of one process
    pub fn pause_handle(&self, id: &BatchId) -> Option<PauseHandle> {
        self.solicitudes.get(id).map(Solicitude::pause_handle)
    }

    /// Register a lifecycle listener for all future passes
    pub fn subscribe(&self, listener: Arc<dyn LifecycleListener>) -> ListenerId {
        self.dispatcher.subscribe(listener)
    }

    /// Remove a lifecycle listener
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Advance every pending process once
    ///
    /// Does nothing when no process is pending. Otherwise the certificates of
    /// all accounts with pending processes are checked first; any invalid one
    /// fails the pass before a remote call is made. Events are appended to the
    /// batch file as they are emitted, between pass begin/end markers. Any
    /// error stops the pass; events already appended stay valid and the next
    /// pass resumes from them.
    pub async fn run_pass(&mut self, remote: &dyn RemoteProtocol) -> Result<PassSummary> {
        if !self.is_pending() {
            tracing::debug!(path = %self.path.display(), "Nothing pending, skipping pass");
            return Ok(PassSummary::default());
        }

        let pending = self.pending_ids();
        let credentials = self.preflight(&pending).await?;

        let writer =
            BatchLogWriter::open(&self.path, &self.definitions(), &self.config.log).await?;
        let writer = Arc::new(tokio::sync::Mutex::new(writer));
        let markers = self.config.log.pass_markers;

        tracing::info!(
            path = %self.path.display(),
            pending = pending.len(),
            remote = remote.name(),
            "Starting batch pass"
        );

        let begin = if markers {
            writer
                .lock()
                .await
                .append_comment(format!("pass begin: {} pending", pending.len()))
                .await
        } else {
            Ok(())
        };

        let listener = Arc::new(LogListener::new(writer.clone()));
        let outcome = match begin {
            Ok(()) => {
                let _subscription = Subscription::attach(&self.dispatcher, listener.clone());
                let ctx = PassContext {
                    remote,
                    credentials: &credentials,
                    repository: self.services.repository.as_ref(),
                    dispatcher: &self.dispatcher,
                    token_refresh_margin: chrono::Duration::from_std(
                        self.config.pass.token_refresh_margin,
                    )
                    .unwrap_or_else(|_| chrono::Duration::seconds(30)),
                };
                drive(&mut self.solicitudes, &pending, &ctx).await
            }
            Err(e) => Err(e),
        };

        let mut writer = writer.lock().await;
        let end = if markers {
            let text = match &outcome {
                Ok(advanced) => format!(
                    "pass end: {} processes advanced, {} events",
                    advanced,
                    listener.recorded()
                ),
                Err(e) => format!("pass aborted: {e}"),
            };
            writer.append_comment(text).await
        } else {
            Ok(())
        };
        let closed = writer.close().await;

        let processes_advanced = match outcome {
            Ok(advanced) => advanced,
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    events = listener.recorded(),
                    "Batch pass aborted"
                );
                if let Err(close_error) = end.and(closed) {
                    tracing::warn!(
                        error = %close_error,
                        "Failed to finish batch log after aborted pass"
                    );
                }
                return Err(e);
            }
        };
        end?;
        closed?;

        let summary = PassSummary {
            processes_advanced,
            events_recorded: listener.recorded(),
            pending_after: self.is_pending(),
        };
        tracing::info!(
            path = %self.path.display(),
            advanced = summary.processes_advanced,
            events = summary.events_recorded,
            pending = summary.pending_after,
            "Finished batch pass"
        );
        Ok(summary)
    }

    /// Resolve and check the credentials of every account with pending work
    async fn preflight(
        &self,
        pending: &[BatchId],
    ) -> Result<HashMap<AccountRef, Arc<Credentials>>> {
        let accounts: BTreeSet<&AccountRef> = pending
            .iter()
            .filter_map(|id| self.solicitudes.get(id))
            .map(Solicitude::account)
            .collect();

        let now = Utc::now();
        let mut resolved = HashMap::with_capacity(accounts.len());
        for account in accounts {
            let credentials = self.services.credentials.require(account).await?;
            credentials.ensure_valid_at(now)?;
            resolved.insert(account.clone(), credentials);
        }
        tracing::debug!(accounts = resolved.len(), "Credentials checked");
        Ok(resolved)
    }
}

struct PassContext<'a> {
    remote: &'a dyn RemoteProtocol,
    credentials: &'a HashMap<AccountRef, Arc<Credentials>>,
    repository: &'a dyn DownloadRepository,
    dispatcher: &'a EventDispatcher,
    token_refresh_margin: chrono::Duration,
}

/// Advance the listed processes in order; returns how many were advanced
async fn drive(
    solicitudes: &mut HashMap<BatchId, Solicitude>,
    pending: &[BatchId],
    ctx: &PassContext<'_>,
) -> Result<usize> {
    let mut advanced = 0;
    for id in pending {
        let Some(process) = solicitudes.get_mut(id) else {
            continue;
        };
        let credentials = ctx.credentials.get(process.account()).ok_or_else(|| {
            Error::Other(format!("no checked credentials for account {}", process.account()))
        })?;

        let advance = AdvanceContext {
            remote: ctx.remote,
            credentials,
            repository: ctx.repository,
            dispatcher: ctx.dispatcher,
            token_refresh_margin: ctx.token_refresh_margin,
        };
        let emitted = process.advance(&advance).await?;
        advanced += 1;
        tracing::debug!(
            batch_id = %id,
            events = emitted,
            state = %process.state(),
            "Process advanced"
        );
    }
    Ok(advanced)
}
