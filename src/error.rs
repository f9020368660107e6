//! Error types for mass-download
//!
//! This module groups failures by how a batch pass reacts to them:
//! - Protocol-kind mismatches ([`SolicitudeError`]) are fatal and point at a
//!   corrupted batch log or a programming error
//! - Transport and remote faults abort the remainder of the current pass
//! - Batch log corruption ([`BatchLogError`]) is fatal at load time
//! - Credential problems ([`CredentialError`]) are detected before any remote call
//!
//! A remote *rejection* is not an error at all: it is recorded as a
//! [`LifecycleResult::Rejected`](crate::types::LifecycleResult::Rejected) event.

use crate::response::ResponseKind;
use crate::types::{AccountRef, BatchId, LifecycleResult, SolicitudeState};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mass-download operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mass-download
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "repository.root")
        key: Option<String>,
    },

    /// A response was applied to a request process that cannot accept it
    #[error("solicitude error: {0}")]
    Solicitude(#[from] SolicitudeError),

    /// Batch log could not be written or does not describe a valid batch
    #[error("batch log error: {0}")]
    BatchLog(#[from] BatchLogError),

    /// Credentials missing or unusable
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Network-level failure talking to the remote service
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote service answered with a fault instead of a response
    #[error("remote fault {code}: {message}")]
    Fault {
        /// Fault code reported by the service
        code: String,
        /// Fault description reported by the service
        message: String,
    },

    /// A fetched package payload could not be decoded
    #[error("invalid payload for package {package_id}: {reason}")]
    Payload {
        /// Package whose payload was rejected
        package_id: String,
        /// Why decoding failed
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Request state machine errors
#[derive(Debug, Error)]
pub enum SolicitudeError {
    /// A response kind that is not legal for the current state
    #[error("process {batch_id} in state {state} cannot accept a {kind} response")]
    StateMismatch {
        /// Batch id of the process, or "-" when the process has none
        batch_id: String,
        /// State the process was in
        state: SolicitudeState,
        /// Kind of the offending response
        kind: ResponseKind,
    },
}

/// Durable batch log errors
#[derive(Debug, Error)]
pub enum BatchLogError {
    /// The batch file has no request definitions
    #[error("batch file {path} has no request definitions")]
    MissingHeader {
        /// Path of the batch file
        path: PathBuf,
    },

    /// The same batch id is defined twice
    #[error("batch id {batch_id} is defined more than once")]
    DuplicateBatchId {
        /// The repeated batch id
        batch_id: BatchId,
    },

    /// An event references a process that is not in the header
    #[error("downloadProcess not found: {batch_id}")]
    UnknownProcess {
        /// The batch id referenced by the event
        batch_id: BatchId,
    },

    /// A record could not be parsed
    #[error("malformed record at line {line}: {reason}")]
    Malformed {
        /// 1-based line number
        line: usize,
        /// Parser diagnostic
        reason: String,
    },

    /// A request definition appears after the first event or comment
    #[error("request definition at line {line} appears after the batch body started")]
    HeaderAfterBody {
        /// 1-based line number
        line: usize,
    },

    /// Replaying a recorded event produced a different result than recorded
    #[error("replay of {batch_id} produced {replayed} where the log recorded {recorded}")]
    ReplayDiverged {
        /// Process whose replay diverged
        batch_id: BatchId,
        /// Result stored in the log
        recorded: LifecycleResult,
        /// Result produced by the transition function
        replayed: LifecycleResult,
    },

    /// A lifecycle event without a batch id cannot be logged
    #[error("lifecycle event has no batch id")]
    MissingBatchId,

    /// The batch file already holds a batch
    #[error("batch file {path} already exists and is not empty")]
    AlreadyExists {
        /// Path of the batch file
        path: PathBuf,
    },

    /// The writer was closed
    #[error("batch log writer is closed")]
    Closed,
}

/// Credential lookup and certificate validity errors
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credentials are registered for an account
    #[error("no credentials for account {account}")]
    NotFound {
        /// The account reference that was looked up
        account: AccountRef,
    },

    /// The certificate is outside its validity window
    #[error(
        "certificate for account {account} is valid from {not_before} to {not_after}, checked at {checked_at}"
    )]
    OutsideValidity {
        /// Account whose certificate failed the check
        account: AccountRef,
        /// Start of the validity window
        not_before: DateTime<Utc>,
        /// End of the validity window
        not_after: DateTime<Utc>,
        /// Instant the check was made
        checked_at: DateTime<Utc>,
    },
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Solicitude(SolicitudeError::StateMismatch { .. }) => "state_mismatch",
            Error::BatchLog(e) => match e {
                BatchLogError::MissingHeader { .. } => "missing_header",
                BatchLogError::DuplicateBatchId { .. } => "duplicate_batch_id",
                BatchLogError::UnknownProcess { .. } => "unknown_process",
                BatchLogError::Malformed { .. } => "malformed_record",
                BatchLogError::HeaderAfterBody { .. } => "header_after_body",
                BatchLogError::ReplayDiverged { .. } => "replay_diverged",
                BatchLogError::MissingBatchId => "missing_batch_id",
                BatchLogError::AlreadyExists { .. } => "batch_exists",
                BatchLogError::Closed => "log_closed",
            },
            Error::Credential(e) => match e {
                CredentialError::NotFound { .. } => "credentials_not_found",
                CredentialError::OutsideValidity { .. } => "certificate_invalid",
            },
            Error::Transport(_) => "transport_error",
            Error::Fault { .. } => "remote_fault",
            Error::Payload { .. } => "invalid_payload",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether the error means persisted state cannot be trusted
    ///
    /// State mismatches and log corruption fall in this class; everything else
    /// aborts a pass and leaves the batch resumable on the next one.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::Solicitude(_)
                | Error::BatchLog(
                    BatchLogError::MissingHeader { .. }
                        | BatchLogError::DuplicateBatchId { .. }
                        | BatchLogError::UnknownProcess { .. }
                        | BatchLogError::Malformed { .. }
                        | BatchLogError::HeaderAfterBody { .. }
                        | BatchLogError::ReplayDiverged { .. }
                )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, &'static str, bool)> {
        let now = Utc::now();
        vec![
            (
                Error::Config {
                    message: "bad value".into(),
                    key: Some("repository.root".into()),
                },
                "config_error",
                false,
            ),
            (
                Error::Solicitude(SolicitudeError::StateMismatch {
                    batch_id: "b1".into(),
                    state: SolicitudeState::Verified,
                    kind: ResponseKind::Verified,
                }),
                "state_mismatch",
                true,
            ),
            (
                Error::BatchLog(BatchLogError::MissingHeader {
                    path: PathBuf::from("x.batch"),
                }),
                "missing_header",
                true,
            ),
            (
                Error::BatchLog(BatchLogError::UnknownProcess {
                    batch_id: BatchId::from("ghost"),
                }),
                "unknown_process",
                true,
            ),
            (Error::BatchLog(BatchLogError::Closed), "log_closed", false),
            (
                Error::Credential(CredentialError::NotFound {
                    account: AccountRef::from("AAA010101AAA"),
                }),
                "credentials_not_found",
                false,
            ),
            (
                Error::Credential(CredentialError::OutsideValidity {
                    account: AccountRef::from("AAA010101AAA"),
                    not_before: now,
                    not_after: now,
                    checked_at: now,
                }),
                "certificate_invalid",
                false,
            ),
            (Error::Transport("reset".into()), "transport_error", false),
            (
                Error::Fault {
                    code: "300".into(),
                    message: "invalid token".into(),
                },
                "remote_fault",
                false,
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                "io_error",
                false,
            ),
            (Error::Other("boom".into()), "internal_error", false),
        ]
    }

    #[test]
    fn test_error_codes_and_corruption_class() {
        for (error, code, corruption) in all_error_variants() {
            assert_eq!(error.error_code(), code, "code for {error}");
            assert_eq!(error.is_corruption(), corruption, "class for {error}");
        }
    }

    #[test]
    fn test_unknown_process_message_names_batch_id() {
        let err = Error::BatchLog(BatchLogError::UnknownProcess {
            batch_id: BatchId::from("req-42"),
        });
        assert_eq!(
            err.to_string(),
            "batch log error: downloadProcess not found: req-42"
        );
    }

    #[test]
    fn test_state_mismatch_message() {
        let err = SolicitudeError::StateMismatch {
            batch_id: "b7".into(),
            state: SolicitudeState::New,
            kind: ResponseKind::PackageFetched,
        };
        assert_eq!(
            err.to_string(),
            "process b7 in state new cannot accept a package_fetched response"
        );
    }
}
