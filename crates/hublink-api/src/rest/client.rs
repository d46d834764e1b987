// Hub REST call executor
//
// Wraps `reqwest::Client` with bearer auth, a per-call deadline, and the
// one-shot refresh-and-retry policy. Endpoint helpers (states, services,
// config flows) are inherent methods in sibling modules so this file stays
// focused on transport mechanics.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::{ConnectionDescriptor, CredentialRefresher};
use crate::error::{Error, is_auth_status};
use crate::transport::TransportConfig;

/// How much of an error body is folded into the error message.
const ERROR_BODY_PREVIEW: usize = 200;

/// Path used by the reachability probe.
const PROBE_PATH: &str = "/api/";

// ── Request / response ───────────────────────────────────────────────

/// Method and optional JSON body of a hub REST call.
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    pub body: Option<serde_json::Value>,
}

impl RestRequest {
    pub fn new(method: Method) -> Self {
        Self { method, body: None }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post(body: serde_json::Value) -> Self {
        Self::new(Method::POST).with_body(body)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A fully-read hub response. The body is read inside the call deadline.
#[derive(Debug, Clone)]
pub struct RestResponse {
    status: StatusCode,
    body: String,
}

impl RestResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_str(&self.body).map_err(|e| {
            let preview = preview(&self.body);
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: self.body.clone(),
            }
        })
    }

    fn into_http_error(self) -> Error {
        let reason = self.status.canonical_reason().unwrap_or("error");
        let message = if self.body.trim().is_empty() {
            reason.to_owned()
        } else {
            format!("{reason}: {}", preview(&self.body))
        };
        Error::Http {
            status: self.status.as_u16(),
            message,
        }
    }
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_PREVIEW) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

pub(crate) fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

// ── Client ───────────────────────────────────────────────────────────

/// Timeout-bound REST executor for the hub API.
///
/// Holds no per-hub state: every call receives the [`ConnectionDescriptor`]
/// to use, so one client serves both local and relay transports.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    refresher: Option<Arc<dyn CredentialRefresher>>,
}

impl RestClient {
    /// Create a client from a `TransportConfig`, without a refresher.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self::with_client(transport.build_client()?))
    }

    /// Wrap a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            refresher: None,
        }
    }

    /// Register the strategy used after a 401/403.
    pub fn with_refresher(mut self, refresher: Arc<dyn CredentialRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Execute a call against `descriptor`, returning the response on 2xx.
    ///
    /// On 401/403 with a refresher registered, the credential is refreshed
    /// and the call retried exactly once, provided the refreshed credential
    /// still targets the same base URL. Any other non-2xx is terminal.
    /// `timeout` bounds the whole call, refresh and retry included.
    pub async fn call(
        &self,
        descriptor: &ConnectionDescriptor,
        path: &str,
        request: &RestRequest,
        timeout: Duration,
    ) -> Result<RestResponse, Error> {
        let mut answered = false;
        self.call_within(descriptor, path, request, timeout, &mut answered)
            .await
    }

    /// Call and decode a JSON response body.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        descriptor: &ConnectionDescriptor,
        path: &str,
        request: &RestRequest,
        timeout: Duration,
    ) -> Result<T, Error> {
        self.call(descriptor, path, request, timeout).await?.json()
    }

    /// Fast existence check: does the hub answer at all?
    ///
    /// Any HTTP response counts as reachable, including 401/403 after a
    /// failed refresh or a retry that never completed. Only a hub that
    /// never responded (network failure or timeout) is unreachable.
    pub async fn probe(&self, descriptor: &ConnectionDescriptor, timeout: Duration) -> bool {
        let mut answered = false;
        let result = self
            .call_within(descriptor, PROBE_PATH, &RestRequest::get(), timeout, &mut answered)
            .await;
        match result {
            Ok(_) => true,
            Err(e) => {
                let reachable = answered || e.is_hub_response();
                debug!(url = %descriptor.base_url(), error = %e, reachable, "probe finished");
                reachable
            }
        }
    }

    /// Run the retry policy under a single deadline.
    ///
    /// `answered` is set once any attempt got an HTTP response, and keeps
    /// that value when the deadline cuts the call short.
    async fn call_within(
        &self,
        descriptor: &ConnectionDescriptor,
        path: &str,
        request: &RestRequest,
        timeout: Duration,
        answered: &mut bool,
    ) -> Result<RestResponse, Error> {
        tokio::time::timeout(
            timeout,
            self.call_with_recovery(descriptor, path, request, answered),
        )
        .await
        .map_err(|_| {
            debug!(path, "hub REST call timed out");
            Error::Timeout {
                timeout_ms: timeout_ms(timeout),
            }
        })?
    }

    async fn call_with_recovery(
        &self,
        descriptor: &ConnectionDescriptor,
        path: &str,
        request: &RestRequest,
        answered: &mut bool,
    ) -> Result<RestResponse, Error> {
        let first = self.send_once(descriptor, path, request, 1).await?;
        *answered = true;
        if first.status.is_success() {
            return Ok(first);
        }

        let status = first.status.as_u16();
        let Some(refresher) = self.refresher.as_ref().filter(|_| is_auth_status(status)) else {
            return Err(first.into_http_error());
        };

        debug!(status, path, "hub rejected credential, refreshing");
        let refreshed = refresher
            .refresh(descriptor)
            .await
            .map_err(|e| Error::AuthFailed {
                message: format!("HTTP {status} and credential refresh failed: {e}"),
            })?;

        if !refreshed.same_endpoint(descriptor) {
            warn!(
                from = %descriptor.base_url(),
                to = %refreshed.base_url(),
                "refreshed credential targets a different hub, abandoning call"
            );
            return Err(first.into_http_error());
        }

        let second = self.send_once(&refreshed, path, request, 2).await?;
        if second.status.is_success() {
            Ok(second)
        } else {
            Err(second.into_http_error())
        }
    }

    /// One attempt: send and read the body.
    ///
    /// Runs inside the caller's deadline; dropping it cancels the
    /// in-flight request.
    async fn send_once(
        &self,
        descriptor: &ConnectionDescriptor,
        path: &str,
        request: &RestRequest,
        attempt: u8,
    ) -> Result<RestResponse, Error> {
        let url = descriptor.endpoint(path)?;
        debug!(method = %request.method, %url, attempt, "hub REST call");

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(AUTHORIZATION, descriptor.bearer()?);
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok(RestResponse { status, body })
    }
}
