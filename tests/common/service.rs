//! In-process stand-in for the mass-download web service
//!
//! Requests become ready after a configurable number of verifications and
//! then list a fixed number of packages. Package payloads are base64 text.

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{Duration, Utc};
use mass_download::{
    Credentials, Error, PackageId, Query, RemoteProtocol, RequestId, Response, Result, Token,
    VerificationState,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Success code of the service
pub const OK: &str = "5000";

/// Decoded content of a simulated package
pub fn package_content(package_id: &str) -> Vec<u8> {
    format!("zip bytes of {package_id}").into_bytes()
}

struct RequestState {
    verifications: u32,
    packages: Vec<PackageId>,
}

#[derive(Default)]
struct ServiceState {
    next_request: u32,
    requests: HashMap<RequestId, RequestState>,
    fetches: HashMap<PackageId, u32>,
    calls: Vec<String>,
    authentications: usize,
    fail_fetch_in: Option<usize>,
}

/// Stateful simulated service
pub struct SimulatedService {
    ready_after: u32,
    packages_per_request: usize,
    state: Mutex<ServiceState>,
}

impl SimulatedService {
    /// Requests become ready on the verification after `ready_after` delayed ones
    pub fn new(ready_after: u32, packages_per_request: usize) -> Self {
        Self {
            ready_after,
            packages_per_request,
            state: Mutex::new(ServiceState::default()),
        }
    }

    /// Make the `n`th fetch from now (1-based) fail with a transport error
    pub fn fail_fetch_in(&self, n: usize) {
        self.state.lock().unwrap().fail_fetch_in = Some(n);
    }

    /// Every call made, as `"<kind> <id>"`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// How often each package was fetched
    pub fn fetch_count(&self, package_id: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .fetches
            .get(&PackageId::from(package_id))
            .copied()
            .unwrap_or(0)
    }

    /// Number of tokens handed out
    pub fn authentications(&self) -> usize {
        self.state.lock().unwrap().authentications
    }
}

#[async_trait]
impl RemoteProtocol for SimulatedService {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Token> {
        let mut state = self.state.lock().unwrap();
        state.authentications += 1;
        let now = Utc::now();
        Ok(Token::new(
            format!("{}-{}", credentials.account, state.authentications),
            now,
            now + Duration::minutes(5),
        ))
    }

    async fn request_download(
        &self,
        credentials: &Credentials,
        _query: &Query,
        _token: &Token,
    ) -> Result<Response> {
        let mut state = self.state.lock().unwrap();
        state.next_request += 1;
        let request_id = RequestId::new(format!("REQ-{:04}", state.next_request));
        let packages = (1..=self.packages_per_request)
            .map(|n| PackageId::new(format!("{request_id}_{n:02}")))
            .collect();
        state.requests.insert(
            request_id.clone(),
            RequestState {
                verifications: 0,
                packages,
            },
        );
        state
            .calls
            .push(format!("request {}", credentials.account));
        Ok(Response::requested(OK, "Solicitud Aceptada", Some(request_id)))
    }

    async fn verify(
        &self,
        _credentials: &Credentials,
        request_id: &RequestId,
        _token: &Token,
    ) -> Result<Response> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("verify {request_id}"));
        let ready_after = self.ready_after;
        let Some(request) = state.requests.get_mut(request_id) else {
            return Ok(Response::verified(
                OK,
                "Solicitud Aceptada",
                request_id.clone(),
                VerificationState::Rejected,
                "5004",
                0,
                None,
            ));
        };

        request.verifications += 1;
        if request.verifications <= ready_after {
            return Ok(Response::verified(
                OK,
                "Solicitud Aceptada",
                request_id.clone(),
                VerificationState::InProgress,
                OK,
                0,
                None,
            ));
        }
        Ok(Response::verified(
            OK,
            "Solicitud Aceptada",
            request_id.clone(),
            VerificationState::Finished,
            OK,
            request.packages.len() as u32 * 100,
            Some(request.packages.clone()),
        ))
    }

    async fn fetch_package(
        &self,
        _credentials: &Credentials,
        package_id: &PackageId,
        _token: &Token,
    ) -> Result<Response> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("fetch {package_id}"));

        if let Some(n) = state.fail_fetch_in.as_mut() {
            *n -= 1;
            if *n == 0 {
                state.fail_fetch_in = None;
                return Err(Error::Transport("connection reset by peer".into()));
            }
        }

        *state.fetches.entry(package_id.clone()).or_default() += 1;
        let payload =
            base64::engine::general_purpose::STANDARD.encode(package_content(package_id.as_str()));
        Ok(Response::package_fetched(
            OK,
            "Solicitud Aceptada",
            package_id.clone(),
            Some(payload),
        ))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
