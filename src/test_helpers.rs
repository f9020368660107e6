//! Shared test fixtures: scripted remote service, recording repository, and
//! response builders.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::credentials::{Certificate, Credentials, MemoryCredentialStore};
use crate::error::{Error, Result};
use crate::remote::{RemoteProtocol, Token};
use crate::repository::DownloadRepository;
use crate::response::{Response, STATUS_SUCCESS, VerificationState};
use crate::types::{AccountRef, PackageId, Query, RequestId, SolicitudeDefinition};

pub(crate) const ACCOUNT: &str = "AAA010101AAA";

/// One remote call as observed by [`ScriptedRemote`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Request(AccountRef),
    Verify(RequestId),
    Fetch(PackageId),
}

/// Remote service answering from per-call queues
///
/// An empty queue answers with a transport error.
pub(crate) struct ScriptedRemote {
    requests: Mutex<VecDeque<Result<Response>>>,
    verifications: Mutex<VecDeque<Result<Response>>>,
    fetches: Mutex<VecDeque<Result<Response>>>,
    calls: Mutex<Vec<Call>>,
    authentications: AtomicUsize,
    token_lifetime: Duration,
}

impl ScriptedRemote {
    pub(crate) fn new() -> Self {
        Self {
            requests: Mutex::new(VecDeque::new()),
            verifications: Mutex::new(VecDeque::new()),
            fetches: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            authentications: AtomicUsize::new(0),
            token_lifetime: Duration::minutes(5),
        }
    }

    pub(crate) fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub(crate) fn on_request(self, response: Response) -> Self {
        self.requests.lock().unwrap().push_back(Ok(response));
        self
    }

    pub(crate) fn on_verify(self, response: Response) -> Self {
        self.verifications.lock().unwrap().push_back(Ok(response));
        self
    }

    pub(crate) fn on_fetch(self, response: Response) -> Self {
        self.fetches.lock().unwrap().push_back(Ok(response));
        self
    }

    pub(crate) fn on_fetch_error(self, error: Error) -> Self {
        self.fetches.lock().unwrap().push_back(Err(error));
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn authentications(&self) -> usize {
        self.authentications.load(Ordering::SeqCst)
    }

    fn next(queue: &Mutex<VecDeque<Result<Response>>>, what: &str) -> Result<Response> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Transport(format!("no scripted {what} response"))))
    }
}

#[async_trait]
impl RemoteProtocol for ScriptedRemote {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<Token> {
        let n = self.authentications.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        Ok(Token::new(format!("token-{n}"), now, now + self.token_lifetime))
    }

    async fn request_download(
        &self,
        credentials: &Credentials,
        _query: &Query,
        _token: &Token,
    ) -> Result<Response> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Request(credentials.account.clone()));
        Self::next(&self.requests, "request")
    }

    async fn verify(
        &self,
        _credentials: &Credentials,
        request_id: &RequestId,
        _token: &Token,
    ) -> Result<Response> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Verify(request_id.clone()));
        Self::next(&self.verifications, "verify")
    }

    async fn fetch_package(
        &self,
        _credentials: &Credentials,
        package_id: &PackageId,
        _token: &Token,
    ) -> Result<Response> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Fetch(package_id.clone()));
        Self::next(&self.fetches, "fetch")
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Repository that remembers what it was asked to save
#[derive(Default)]
pub(crate) struct RecordingRepository {
    saved: Mutex<Vec<(AccountRef, PackageId, String)>>,
}

impl RecordingRepository {
    pub(crate) fn saved(&self) -> Vec<(AccountRef, PackageId, String)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadRepository for RecordingRepository {
    async fn save(
        &self,
        account: &AccountRef,
        package_id: &PackageId,
        encoded_payload: &str,
    ) -> Result<()> {
        self.saved.lock().unwrap().push((
            account.clone(),
            package_id.clone(),
            encoded_payload.to_string(),
        ));
        Ok(())
    }
}

pub(crate) fn query() -> Query {
    Query::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap(),
    )
}

pub(crate) fn definition(batch_id: &str, account: &str) -> SolicitudeDefinition {
    SolicitudeDefinition::new(batch_id, account, query())
}

pub(crate) fn credentials(account: &str) -> Credentials {
    let now = Utc::now();
    Credentials::new(
        account,
        Certificate {
            serial_number: "00001000000500000001".into(),
            not_before: now - Duration::days(365),
            not_after: now + Duration::days(365),
        },
        b"test-key".to_vec(),
    )
}

pub(crate) fn expired_credentials(account: &str) -> Credentials {
    let now = Utc::now();
    Credentials::new(
        account,
        Certificate {
            serial_number: "00001000000500000002".into(),
            not_before: now - Duration::days(800),
            not_after: now - Duration::days(10),
        },
        b"test-key".to_vec(),
    )
}

pub(crate) fn store(accounts: &[&str]) -> MemoryCredentialStore {
    let mut store = MemoryCredentialStore::new();
    for account in accounts {
        store.insert(credentials(account));
    }
    store
}

pub(crate) fn requested(request_id: &str) -> Response {
    Response::requested(STATUS_SUCCESS, "Solicitud Aceptada", Some(RequestId::from(request_id)))
}

pub(crate) fn request_rejected() -> Response {
    Response::requested("5002", "Se han agotado las solicitudes de por vida", None)
}

pub(crate) fn verified(request_id: &str, packages: &[&str]) -> Response {
    Response::verified(
        STATUS_SUCCESS,
        "Solicitud Aceptada",
        RequestId::from(request_id),
        VerificationState::Finished,
        STATUS_SUCCESS,
        packages.len() as u32 * 10,
        Some(packages.iter().map(|p| PackageId::from(*p)).collect()),
    )
}

pub(crate) fn delayed(request_id: &str, state: VerificationState) -> Response {
    Response::verified(
        STATUS_SUCCESS,
        "Solicitud Aceptada",
        RequestId::from(request_id),
        state,
        STATUS_SUCCESS,
        0,
        None,
    )
}

pub(crate) fn verify_rejected(request_id: &str) -> Response {
    Response::verified(
        STATUS_SUCCESS,
        "Solicitud Aceptada",
        RequestId::from(request_id),
        VerificationState::Rejected,
        "5004",
        0,
        None,
    )
}

pub(crate) fn fetched(package_id: &str) -> Response {
    Response::package_fetched(
        STATUS_SUCCESS,
        "Solicitud Aceptada",
        PackageId::from(package_id),
        Some("UEsDBBQAAAAI".to_string()),
    )
}

pub(crate) fn fetch_rejected(package_id: &str) -> Response {
    Response::package_fetched(
        "5008",
        "Maximo de descargas permitidas",
        PackageId::from(package_id),
        None,
    )
}
