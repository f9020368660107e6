//! Remote protocol port
//!
//! The wire format (SOAP envelopes, XML signatures) lives behind
//! [`RemoteProtocol`]. An implementation owns the connection it talks over; a
//! batch pass uses one implementation sequentially for every process.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::credentials::Credentials;
use crate::response::Response;
use crate::types::{PackageId, Query, RequestId};

/// Authentication token returned by the service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// Opaque token value
    pub value: String,
    /// When the service issued the token
    pub created_at: DateTime<Utc>,
    /// When the token stops being accepted
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// Create a token
    pub fn new(
        value: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            value: value.into(),
            created_at,
            expires_at,
        }
    }

    /// Whether the token is still usable at `now` with `margin` to spare
    pub fn is_usable(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

/// Calls of the mass-download web service
///
/// Every call fails with [`Error::Transport`](crate::Error::Transport) for
/// network failures or [`Error::Fault`](crate::Error::Fault) when the service
/// answers with a fault. Unsuccessful but well-formed answers are returned as
/// responses; the state machine classifies them. Calls are never retried by the
/// caller.
#[async_trait]
pub trait RemoteProtocol: Send + Sync {
    /// Obtain a token for the signing identity
    async fn authenticate(&self, credentials: &Credentials) -> crate::Result<Token>;

    /// Submit a download request; answers with a `Requested` response
    async fn request_download(
        &self,
        credentials: &Credentials,
        query: &Query,
        token: &Token,
    ) -> crate::Result<Response>;

    /// Ask for the status of a request; answers with a `Verified` response
    async fn verify(
        &self,
        credentials: &Credentials,
        request_id: &RequestId,
        token: &Token,
    ) -> crate::Result<Response>;

    /// Fetch one package; answers with a `PackageFetched` response
    async fn fetch_package(
        &self,
        credentials: &Credentials,
        package_id: &PackageId,
        token: &Token,
    ) -> crate::Result<Response>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str {
        "remote"
    }
}
