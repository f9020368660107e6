//! # mass-download
//!
//! Crash-tolerant driver for asynchronous mass-download web services that
//! follow a request, verify, fetch protocol.
//!
//! ## Design Philosophy
//!
//! - **Resumable** - every lifecycle event is appended to a batch file before
//!   the next remote call, and the in-memory state is rebuilt from that file
//! - **Service-agnostic** - the remote service, credential source and package
//!   storage are traits; SOAP envelopes and signing live outside this crate
//! - **Event-driven** - listeners observe every transition and may pause a
//!   process for the rest of a pass
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use mass_download::{
//!     Batch, BatchServices, Config, FsDownloadRepository, MemoryCredentialStore, RemoteProtocol,
//! };
//!
//! async fn drain(
//!     remote: &dyn RemoteProtocol,
//!     store: MemoryCredentialStore,
//! ) -> mass_download::Result<()> {
//!     let config = Config::default();
//!     let services = BatchServices {
//!         credentials: Arc::new(store),
//!         repository: Arc::new(FsDownloadRepository::new(config.repository.clone())),
//!     };
//!
//!     let mut batch = Batch::open("2024-01.batch", services, config).await?;
//!     while batch.is_pending() {
//!         let summary = batch.run_pass(remote).await?;
//!         println!("{} events recorded", summary.events_recorded);
//!         tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Batch orchestration and the batch file
pub mod batch;
/// Configuration types
pub mod config;
/// Accounts, certificates and credential lookup
pub mod credentials;
/// Error types
pub mod error;
/// Lifecycle listeners
pub mod events;
/// Per-process package registry
pub mod registry;
/// Remote service abstraction
pub mod remote;
/// Package storage
pub mod repository;
/// Remote service responses
pub mod response;
/// Request process state machine
pub mod solicitude;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod test_helpers;

// Re-export commonly used types
pub use batch::{Batch, BatchLog, BatchLogWriter, BatchServices};
pub use config::{Config, FileCollisionAction};
pub use credentials::{
    CachedCredentialStore, Certificate, CredentialStore, Credentials, MemoryCredentialStore,
};
pub use error::{BatchLogError, CredentialError, Error, Result, SolicitudeError};
pub use events::{EventDispatcher, FnListener, LifecycleListener, ListenerId, Subscription};
pub use registry::DownloadRegistry;
pub use remote::{RemoteProtocol, Token};
pub use repository::{DownloadRepository, FsDownloadRepository};
pub use response::{Response, ResponseDetail, ResponseKind, VerificationState};
pub use solicitude::{AdvanceContext, PauseHandle, Solicitude, SolicitudeSnapshot};
pub use types::{
    AccountRef, BatchId, DelayReason, DownloadType, LifecycleEvent, LifecycleResult, PackageId,
    PassSummary, Query, RequestId, RequestType, SolicitudeDefinition, SolicitudeState,
};
