//! Core types for mass-download

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::response::Response;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Caller-assigned identifier of a request process inside a batch
    BatchId
);
string_id!(
    /// Reference to the account (taxpayer identity) a request is made for
    AccountRef
);
string_id!(
    /// Identifier the remote service assigns to an accepted download request
    RequestId
);
string_id!(
    /// Identifier of one downloadable package of a verified request
    PackageId
);

/// Which side of the documents the query selects
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadType {
    /// Documents issued by the account
    #[default]
    Issued,
    /// Documents received by the account
    Received,
}

/// What the remote service should package
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Metadata listing only
    #[default]
    Metadata,
    /// Full documents
    Xml,
}

/// Query parameters of a download request
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    /// Inclusive start of the period
    pub period_start: DateTime<Utc>,
    /// Inclusive end of the period
    pub period_end: DateTime<Utc>,
    /// Issued or received documents
    #[serde(default)]
    pub download_type: DownloadType,
    /// Metadata or full documents
    #[serde(default)]
    pub request_type: RequestType,
    /// Restrict to one counterpart account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart: Option<AccountRef>,
}

impl Query {
    /// Query for a period with default download and request types
    pub fn new(period_start: DateTime<Utc>, period_end: DateTime<Utc>) -> Self {
        Self {
            period_start,
            period_end,
            download_type: DownloadType::default(),
            request_type: RequestType::default(),
            counterpart: None,
        }
    }

    /// Set the download type
    pub fn with_download_type(mut self, download_type: DownloadType) -> Self {
        self.download_type = download_type;
        self
    }

    /// Set the request type
    pub fn with_request_type(mut self, request_type: RequestType) -> Self {
        self.request_type = request_type;
        self
    }

    /// Restrict to one counterpart
    pub fn with_counterpart(mut self, counterpart: impl Into<AccountRef>) -> Self {
        self.counterpart = Some(counterpart.into());
        self
    }
}

/// Progress of a request process
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolicitudeState {
    /// Not yet requested
    #[default]
    New,
    /// Request accepted by the remote service
    Accepted,
    /// Verified but the packages are not ready
    Delayed,
    /// Packages known; downloading
    Verified,
}

impl fmt::Display for SolicitudeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SolicitudeState::New => "new",
            SolicitudeState::Accepted => "accepted",
            SolicitudeState::Delayed => "delayed",
            SolicitudeState::Verified => "verified",
        })
    }
}

/// Why a verification did not yet yield packages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayReason {
    /// The remote service has not started working on the request
    PendingAcceptance,
    /// The remote service is assembling the packages
    InProgress,
    /// Any other not-ready answer
    Other,
}

/// Outcome recorded for every transition of a request process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleResult {
    /// The response was not accepted
    Rejected,
    /// A download request was accepted
    Accepted,
    /// Verification said "not ready yet"
    Delayed,
    /// Verification produced the package list
    Verified,
    /// A package was retrieved
    Downloaded,
}

impl fmt::Display for LifecycleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleResult::Rejected => "rejected",
            LifecycleResult::Accepted => "accepted",
            LifecycleResult::Delayed => "delayed",
            LifecycleResult::Verified => "verified",
            LifecycleResult::Downloaded => "downloaded",
        })
    }
}

/// Event emitted by a request process for every applied response
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Batch id of the emitting process, when it belongs to a batch
    pub batch_id: Option<BatchId>,
    /// Outcome of the transition
    pub result: LifecycleResult,
    /// Response that triggered the transition
    pub response: Response,
}

/// Immutable definition of one request process in a batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolicitudeDefinition {
    /// Caller-assigned id, unique within the batch
    pub batch_id: BatchId,
    /// Account the request is made for
    pub account: AccountRef,
    /// Query parameters
    pub query: Query,
}

impl SolicitudeDefinition {
    /// Create a definition
    pub fn new(batch_id: impl Into<BatchId>, account: impl Into<AccountRef>, query: Query) -> Self {
        Self {
            batch_id: batch_id.into(),
            account: account.into(),
            query,
        }
    }
}

/// Summary returned by a batch pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Processes the pass attempted to advance
    pub processes_advanced: usize,
    /// Lifecycle events appended to the batch log
    pub events_recorded: usize,
    /// Whether anything is still pending after the pass
    pub pending_after: bool,
}
