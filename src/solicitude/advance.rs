//! One advance-pass of a process against the remote service

use chrono::Utc;

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::events::EventDispatcher;
use crate::remote::{RemoteProtocol, Token};
use crate::repository::DownloadRepository;
use crate::types::LifecycleEvent;

use super::Solicitude;

/// Collaborators an advance-pass calls into
pub struct AdvanceContext<'a> {
    /// Remote service, owning the shared connection
    pub remote: &'a dyn RemoteProtocol,
    /// Signing identity of the process's account
    pub credentials: &'a Credentials,
    /// Sink for fetched payloads
    pub repository: &'a dyn DownloadRepository,
    /// Lifecycle listeners
    pub dispatcher: &'a EventDispatcher,
    /// Re-authenticate when the token expires within this margin
    pub token_refresh_margin: chrono::Duration,
}

/// Lazily obtained token, renewed when close to expiry
struct TokenSession<'a> {
    remote: &'a dyn RemoteProtocol,
    credentials: &'a Credentials,
    margin: chrono::Duration,
    token: Option<Token>,
}

impl<'a> TokenSession<'a> {
    fn new(ctx: &AdvanceContext<'a>) -> Self {
        Self {
            remote: ctx.remote,
            credentials: ctx.credentials,
            margin: ctx.token_refresh_margin,
            token: None,
        }
    }

    async fn token(&mut self) -> Result<Token> {
        if let Some(token) = &self.token
            && token.is_usable(Utc::now(), self.margin)
        {
            return Ok(token.clone());
        }
        tracing::debug!(
            account = %self.credentials.account,
            remote = self.remote.name(),
            "Authenticating"
        );
        let token = self.remote.authenticate(self.credentials).await?;
        self.token = Some(token.clone());
        Ok(token)
    }
}

impl Solicitude {
    /// Drive the process as far as the remote service currently allows
    ///
    /// Requests if new, verifies if accepted or delayed, then fetches packages
    /// one by one until the registry is done, a response is rejected, or a pause
    /// is set. The pause flag is cleared on entry. Every applied response is
    /// dispatched to the listeners before the next remote call.
    ///
    /// Returns the number of lifecycle events emitted.
    pub async fn advance(&mut self, ctx: &AdvanceContext<'_>) -> Result<usize> {
        if self.paused.clear() {
            tracing::debug!(batch_id = %self.label(), "Cleared pause from previous pass");
        }
        if self.account != ctx.credentials.account {
            return Err(Error::Other(format!(
                "credentials for {} cannot drive a request of {}",
                ctx.credentials.account, self.account
            )));
        }

        let mut session = TokenSession::new(ctx);
        let mut emitted = 0;

        if self.is_requestable() {
            let token = session.token().await?;
            let response = ctx
                .remote
                .request_download(ctx.credentials, &self.query, &token)
                .await?;
            let event = self.apply(response)?;
            self.emit(ctx, &event).await?;
            emitted += 1;
        }

        if self.is_verifiable() {
            let request_id = self
                .request_id
                .clone()
                .ok_or_else(|| {
                    Error::Other(format!("process {} has no request id", self.label()))
                })?;
            let token = session.token().await?;
            let response = ctx
                .remote
                .verify(ctx.credentials, &request_id, &token)
                .await?;
            let event = self.apply(response)?;
            self.emit(ctx, &event).await?;
            emitted += 1;
        }

        while self.is_downloadable() {
            let Some(package_id) = self.registry.next_downloadable().cloned() else {
                break;
            };
            let token = session.token().await?;
            let mut response = ctx
                .remote
                .fetch_package(ctx.credentials, &package_id, &token)
                .await?;

            if response.is_accepted()
                && let Some(payload) = response.encoded_payload()
            {
                ctx.repository
                    .save(&self.account, &package_id, payload)
                    .await?;
                response = response.into_disposed();
            }

            let downloaded_before = self.registry.downloaded_count();
            let event = self.apply(response)?;
            self.emit(ctx, &event).await?;
            emitted += 1;

            if self.rejection.is_none() && self.registry.downloaded_count() <= downloaded_before {
                tracing::warn!(
                    batch_id = %self.label(),
                    package_id = %package_id,
                    "Fetch did not retrieve the requested package, stopping this pass"
                );
                break;
            }
        }

        if self.is_paused() {
            tracing::info!(batch_id = %self.label(), "Advance stopped by pause");
        }
        Ok(emitted)
    }

    async fn emit(&self, ctx: &AdvanceContext<'_>, event: &LifecycleEvent) -> Result<()> {
        ctx.dispatcher.dispatch(event).await
    }
}
