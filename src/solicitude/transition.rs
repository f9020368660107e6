//! The transition function shared by live passes and log replay

use crate::error::{Result, SolicitudeError};
use crate::registry::DownloadRegistry;
use crate::response::{Response, ResponseDetail, ResponseKind};
use crate::types::{LifecycleEvent, LifecycleResult, SolicitudeState};

use super::Solicitude;

impl SolicitudeState {
    /// The only response kind a process in this state may receive
    pub fn expected_response(&self) -> ResponseKind {
        match self {
            SolicitudeState::New => ResponseKind::Requested,
            SolicitudeState::Accepted | SolicitudeState::Delayed => ResponseKind::Verified,
            SolicitudeState::Verified => ResponseKind::PackageFetched,
        }
    }
}

impl Solicitude {
    /// Apply a response and return the lifecycle event it produces
    ///
    /// A response kind the current state cannot take fails with
    /// [`SolicitudeError::StateMismatch`] and leaves the process untouched.
    /// A rejected response keeps the state and sets the rejection; an accepted
    /// one clears any previous rejection before transitioning.
    pub fn apply(&mut self, response: Response) -> Result<LifecycleEvent> {
        let kind = response.kind();
        if kind != self.state.expected_response() {
            return Err(SolicitudeError::StateMismatch {
                batch_id: self.label(),
                state: self.state,
                kind,
            }
            .into());
        }

        if !response.is_accepted() {
            tracing::debug!(
                batch_id = %self.label(),
                state = %self.state,
                status_code = %response.status_code,
                message = %response.message,
                "Response rejected"
            );
            self.rejection = Some(response.clone());
            return Ok(self.event(LifecycleResult::Rejected, response));
        }

        self.rejection = None;
        self.last_accepted_at = Some(response.received_at);

        let result = match &response.detail {
            ResponseDetail::Requested { request_id } => {
                self.state = SolicitudeState::Accepted;
                self.request_id = request_id.clone();
                LifecycleResult::Accepted
            }
            ResponseDetail::Verified {
                request_id,
                item_count,
                package_ids,
                ..
            } => {
                if self.request_id.as_ref() != Some(request_id) {
                    tracing::warn!(
                        batch_id = %self.label(),
                        expected = ?self.request_id,
                        received = %request_id,
                        "Verification answers a different request id"
                    );
                }
                match response.delay_reason() {
                    Some(reason) => {
                        self.state = SolicitudeState::Delayed;
                        self.delay_reason = Some(reason);
                        LifecycleResult::Delayed
                    }
                    None => {
                        self.state = SolicitudeState::Verified;
                        self.delay_reason = None;
                        self.item_count = *item_count;
                        self.registry = DownloadRegistry::from_verification(package_ids.as_deref());
                        tracing::info!(
                            batch_id = %self.label(),
                            items = self.item_count,
                            packages = self.registry.len(),
                            "Request verified"
                        );
                        LifecycleResult::Verified
                    }
                }
            }
            ResponseDetail::PackageFetched { package_id, .. } => {
                if !self.registry.mark_downloaded(package_id) {
                    tracing::warn!(
                        batch_id = %self.label(),
                        package_id = %package_id,
                        "Package id not found in registry"
                    );
                }
                LifecycleResult::Downloaded
            }
        };

        tracing::debug!(
            batch_id = %self.label(),
            result = %result,
            state = %self.state,
            "Response applied"
        );
        Ok(self.event(result, response))
    }

    fn event(&self, result: LifecycleResult, response: Response) -> LifecycleEvent {
        LifecycleEvent {
            batch_id: self.batch_id.clone(),
            result,
            response,
        }
    }
}
