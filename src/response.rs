//! Response model for the three remote calls of a download request
//!
//! Responses are immutable values. Each kind carries its own accept/reject rule,
//! see [`Response::is_accepted`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{DelayReason, PackageId, RequestId};

/// Status code the remote service uses for success, both for the outer
/// call status and for the inner request status of a verification
pub const STATUS_SUCCESS: &str = "5000";

/// Request status reported by a verification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum VerificationState {
    /// Request accepted, work not started (1)
    Accepted,
    /// Packages being assembled (2)
    InProgress,
    /// Packages ready (3)
    Finished,
    /// Remote processing failed (4)
    Failure,
    /// Request rejected (5)
    Rejected,
    /// Request expired (6)
    Expired,
    /// Any other code
    Unknown(u8),
}

impl From<u8> for VerificationState {
    fn from(code: u8) -> Self {
        match code {
            1 => VerificationState::Accepted,
            2 => VerificationState::InProgress,
            3 => VerificationState::Finished,
            4 => VerificationState::Failure,
            5 => VerificationState::Rejected,
            6 => VerificationState::Expired,
            other => VerificationState::Unknown(other),
        }
    }
}

impl From<VerificationState> for u8 {
    fn from(state: VerificationState) -> Self {
        match state {
            VerificationState::Accepted => 1,
            VerificationState::InProgress => 2,
            VerificationState::Finished => 3,
            VerificationState::Failure => 4,
            VerificationState::Rejected => 5,
            VerificationState::Expired => 6,
            VerificationState::Unknown(code) => code,
        }
    }
}

impl VerificationState {
    /// The remote service will never produce packages for this request
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            VerificationState::Failure | VerificationState::Rejected | VerificationState::Expired
        )
    }

    /// Delay reason for a not-ready state, `None` when packages are ready or
    /// the request failed
    pub fn delay_reason(&self) -> Option<DelayReason> {
        match self {
            VerificationState::Accepted => Some(DelayReason::PendingAcceptance),
            VerificationState::InProgress => Some(DelayReason::InProgress),
            VerificationState::Unknown(_) => Some(DelayReason::Other),
            VerificationState::Finished
            | VerificationState::Failure
            | VerificationState::Rejected
            | VerificationState::Expired => None,
        }
    }
}

/// Discriminant of a response
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Reply to a download request
    Requested,
    /// Reply to a verification
    Verified,
    /// Reply to a package fetch
    PackageFetched,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResponseKind::Requested => "requested",
            ResponseKind::Verified => "verified",
            ResponseKind::PackageFetched => "package_fetched",
        })
    }
}

/// Kind-specific fields of a response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseDetail {
    /// Reply to a download request
    Requested {
        /// Request id assigned by the service; absent on rejection
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
    },
    /// Reply to a verification
    Verified {
        /// Request id that was verified
        request_id: RequestId,
        /// Request status
        solicitude_state: VerificationState,
        /// Status code of the request itself
        solicitude_status_code: String,
        /// Number of documents the request matched
        #[serde(default)]
        item_count: u32,
        /// Packages ready for download, in service order
        #[serde(default, skip_serializing_if = "Option::is_none")]
        package_ids: Option<Vec<PackageId>>,
    },
    /// Reply to a package fetch
    PackageFetched {
        /// Package that was fetched
        package_id: PackageId,
        /// Base64 payload; dropped once saved
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encoded_payload: Option<String>,
        /// The payload was already persisted and removed from this response
        #[serde(default)]
        disposed: bool,
    },
}

/// Reply from the remote service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// When the reply was received
    pub received_at: DateTime<Utc>,
    /// Outer status code of the call
    pub status_code: String,
    /// Status message of the call
    #[serde(default)]
    pub message: String,
    /// Kind-specific fields
    #[serde(flatten)]
    pub detail: ResponseDetail,
}

impl Response {
    /// Reply to a download request
    pub fn requested(
        status_code: impl Into<String>,
        message: impl Into<String>,
        request_id: Option<RequestId>,
    ) -> Self {
        Self {
            received_at: Utc::now(),
            status_code: status_code.into(),
            message: message.into(),
            detail: ResponseDetail::Requested { request_id },
        }
    }

    /// Reply to a verification
    pub fn verified(
        status_code: impl Into<String>,
        message: impl Into<String>,
        request_id: RequestId,
        solicitude_state: VerificationState,
        solicitude_status_code: impl Into<String>,
        item_count: u32,
        package_ids: Option<Vec<PackageId>>,
    ) -> Self {
        Self {
            received_at: Utc::now(),
            status_code: status_code.into(),
            message: message.into(),
            detail: ResponseDetail::Verified {
                request_id,
                solicitude_state,
                solicitude_status_code: solicitude_status_code.into(),
                item_count,
                package_ids,
            },
        }
    }

    /// Reply to a package fetch
    pub fn package_fetched(
        status_code: impl Into<String>,
        message: impl Into<String>,
        package_id: PackageId,
        encoded_payload: Option<String>,
    ) -> Self {
        Self {
            received_at: Utc::now(),
            status_code: status_code.into(),
            message: message.into(),
            detail: ResponseDetail::PackageFetched {
                package_id,
                encoded_payload,
                disposed: false,
            },
        }
    }

    /// Override the reception timestamp
    pub fn at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// Kind of this response
    pub fn kind(&self) -> ResponseKind {
        match self.detail {
            ResponseDetail::Requested { .. } => ResponseKind::Requested,
            ResponseDetail::Verified { .. } => ResponseKind::Verified,
            ResponseDetail::PackageFetched { .. } => ResponseKind::PackageFetched,
        }
    }

    /// Whether the outer status code indicates success
    pub fn is_status_success(&self) -> bool {
        self.status_code == STATUS_SUCCESS
    }

    /// Accept/reject classification
    ///
    /// - Requested: success status and a request id
    /// - Verified: success status, success request status, and a request state
    ///   that is not a terminal failure
    /// - PackageFetched: success status and either a payload or `disposed`
    pub fn is_accepted(&self) -> bool {
        if !self.is_status_success() {
            return false;
        }
        match &self.detail {
            ResponseDetail::Requested { request_id } => request_id.is_some(),
            ResponseDetail::Verified {
                solicitude_state,
                solicitude_status_code,
                ..
            } => {
                solicitude_status_code == STATUS_SUCCESS
                    && !solicitude_state.is_terminal_failure()
            }
            ResponseDetail::PackageFetched {
                encoded_payload,
                disposed,
                ..
            } => *disposed || encoded_payload.is_some(),
        }
    }

    /// Delay reason when this is an accepted verification whose packages are
    /// not ready yet
    pub fn delay_reason(&self) -> Option<DelayReason> {
        match &self.detail {
            ResponseDetail::Verified {
                solicitude_state, ..
            } => solicitude_state.delay_reason(),
            _ => None,
        }
    }

    /// Package payload, if still attached
    pub fn encoded_payload(&self) -> Option<&str> {
        match &self.detail {
            ResponseDetail::PackageFetched {
                encoded_payload, ..
            } => encoded_payload.as_deref(),
            _ => None,
        }
    }

    /// Whether the package payload was already persisted
    pub fn is_disposed(&self) -> bool {
        matches!(
            self.detail,
            ResponseDetail::PackageFetched { disposed: true, .. }
        )
    }

    /// Drop the package payload and mark the response as disposed
    ///
    /// Other kinds are returned unchanged.
    pub fn into_disposed(mut self) -> Self {
        if let ResponseDetail::PackageFetched {
            encoded_payload,
            disposed,
            ..
        } = &mut self.detail
        {
            *encoded_payload = None;
            *disposed = true;
        }
        self
    }
}
