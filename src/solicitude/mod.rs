//! Request state machine ("solicitude")
//!
//! A [`Solicitude`] tracks one download request from submission until every
//! package is retrieved. Its state changes only through [`Solicitude::apply`],
//! which is used both live and when replaying a batch log:
//!
//! ```text
//!   New ──Requested──> Accepted ──Verified(not ready)──> Delayed
//!                         │                                 │
//!                         └──────Verified(ready)──────┐     │ Verified(not ready)
//!                                                     v     v
//!                                                   Verified <─┘ (ready)
//!                                                     │
//!                                           PackageFetched × N
//! ```
//!
//! - [`transition`] - the pure transition function
//! - [`advance`] - one advance-pass against the remote service

mod advance;
mod transition;


pub use advance::AdvanceContext;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

use crate::registry::DownloadRegistry;
use crate::response::Response;
use crate::types::{
    AccountRef, BatchId, DelayReason, Query, RequestId, SolicitudeDefinition, SolicitudeState,
};

/// Re-armable pause flag shared between a process and its controllers
///
/// The flag is cleared at the start of every advance-pass, so a pause only
/// stops the remainder of the pass that is running when it is set.
#[derive(Clone, Debug, Default)]
pub struct PauseHandle(Arc<Mutex<bool>>);

impl PauseHandle {
    /// Request that the running advance-pass stops at the next step
    pub fn pause(&self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Whether a pause was requested
    pub fn is_paused(&self) -> bool {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the flag, returning whether it was set
    pub fn clear(&self) -> bool {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Externally observable state of a process
///
/// Two processes with equal snapshots behave identically from here on; replay
/// tests compare snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolicitudeSnapshot {
    /// Batch id, if any
    pub batch_id: Option<BatchId>,
    /// Current state
    pub state: SolicitudeState,
    /// Request id once accepted
    pub request_id: Option<RequestId>,
    /// Timestamp of the last accepted response
    pub last_accepted_at: Option<DateTime<Utc>>,
    /// Reason of the last delay while delayed
    pub delay_reason: Option<DelayReason>,
    /// Documents matched by the request
    pub item_count: u32,
    /// Package registry
    pub registry: DownloadRegistry,
    /// Active rejection
    pub rejection: Option<Response>,
}

/// One tracked download request
#[derive(Debug)]
pub struct Solicitude {
    account: AccountRef,
    query: Query,
    batch_id: Option<BatchId>,
    state: SolicitudeState,
    request_id: Option<RequestId>,
    last_accepted_at: Option<DateTime<Utc>>,
    delay_reason: Option<DelayReason>,
    item_count: u32,
    registry: DownloadRegistry,
    rejection: Option<Response>,
    paused: PauseHandle,
}

impl Solicitude {
    /// New process outside of any batch
    pub fn new(account: impl Into<AccountRef>, query: Query) -> Self {
        Self {
            account: account.into(),
            query,
            batch_id: None,
            state: SolicitudeState::New,
            request_id: None,
            last_accepted_at: None,
            delay_reason: None,
            item_count: 0,
            registry: DownloadRegistry::default(),
            rejection: None,
            paused: PauseHandle::default(),
        }
    }

    /// New process for a batch definition
    pub fn from_definition(definition: &SolicitudeDefinition) -> Self {
        let mut solicitude = Self::new(definition.account.clone(), definition.query.clone());
        solicitude.batch_id = Some(definition.batch_id.clone());
        solicitude
    }

    /// Account the request is made for
    pub fn account(&self) -> &AccountRef {
        &self.account
    }

    /// Query parameters
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Batch id, if the process belongs to a batch
    pub fn batch_id(&self) -> Option<&BatchId> {
        self.batch_id.as_ref()
    }

    /// Current state
    pub fn state(&self) -> SolicitudeState {
        self.state
    }

    /// Request id assigned by the service
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Timestamp of the last accepted response
    pub fn last_accepted_at(&self) -> Option<DateTime<Utc>> {
        self.last_accepted_at
    }

    /// Why the last verification was not ready
    pub fn delay_reason(&self) -> Option<DelayReason> {
        self.delay_reason
    }

    /// Documents matched by the request
    pub fn item_count(&self) -> u32 {
        self.item_count
    }

    /// Package registry; empty until verified
    pub fn registry(&self) -> &DownloadRegistry {
        &self.registry
    }

    /// Response that halted the process, if any
    pub fn rejection(&self) -> Option<&Response> {
        self.rejection.as_ref()
    }

    /// Handle to pause the process from elsewhere
    pub fn pause_handle(&self) -> PauseHandle {
        self.paused.clone()
    }

    /// Pause the remainder of the running advance-pass
    pub fn pause(&self) {
        self.paused.pause();
    }

    /// Whether a pause is set
    pub fn is_paused(&self) -> bool {
        self.paused.is_paused()
    }

    /// Not paused and not rejected
    pub fn is_able(&self) -> bool {
        !self.is_paused() && self.rejection.is_none()
    }

    /// A download request can be sent
    pub fn is_requestable(&self) -> bool {
        self.state == SolicitudeState::New && self.is_able()
    }

    /// The request can be verified
    pub fn is_verifiable(&self) -> bool {
        matches!(
            self.state,
            SolicitudeState::Accepted | SolicitudeState::Delayed
        ) && self.is_able()
    }

    /// A package can be fetched
    pub fn is_downloadable(&self) -> bool {
        self.state == SolicitudeState::Verified && self.is_able() && !self.registry.is_done()
    }

    /// Whether the process still has work a pass could do
    ///
    /// Rejected processes are not pending; neither are verified processes whose
    /// registry is done. Pause does not affect this.
    pub fn is_pending(&self) -> bool {
        self.rejection.is_none()
            && (self.state != SolicitudeState::Verified || !self.registry.is_done())
    }

    /// Verified with every package retrieved
    pub fn is_complete(&self) -> bool {
        self.state == SolicitudeState::Verified && self.registry.is_done()
    }

    /// Externally observable state
    pub fn snapshot(&self) -> SolicitudeSnapshot {
        SolicitudeSnapshot {
            batch_id: self.batch_id.clone(),
            state: self.state,
            request_id: self.request_id.clone(),
            last_accepted_at: self.last_accepted_at,
            delay_reason: self.delay_reason,
            item_count: self.item_count,
            registry: self.registry.clone(),
            rejection: self.rejection.clone(),
        }
    }

    fn label(&self) -> String {
        self.batch_id
            .as_ref()
            .map_or_else(|| "-".to_string(), |id| id.to_string())
    }
}
