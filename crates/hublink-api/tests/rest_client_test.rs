#![allow(clippy::unwrap_used)]
// Integration tests for `RestClient` using wiremock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hublink_api::{
    ConnectionDescriptor, CredentialRefresher, Error, FlowStep, RestClient, RestRequest,
};

const TIMEOUT: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────

fn descriptor(base: &str, token: &str) -> ConnectionDescriptor {
    ConnectionDescriptor::new(Url::parse(base).unwrap(), SecretString::from(token.to_owned()))
}

/// Hands out a fixed replacement and counts invocations.
struct FixedRefresher {
    replacement: ConnectionDescriptor,
    calls: AtomicUsize,
}

impl FixedRefresher {
    fn new(replacement: ConnectionDescriptor) -> Arc<Self> {
        Arc::new(Self {
            replacement,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialRefresher for FixedRefresher {
    async fn refresh(&self, _stale: &ConnectionDescriptor) -> Result<ConnectionDescriptor, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.replacement.clone())
    }
}

struct FailingRefresher;

#[async_trait]
impl CredentialRefresher for FailingRefresher {
    async fn refresh(&self, _stale: &ConnectionDescriptor) -> Result<ConnectionDescriptor, Error> {
        Err(Error::Refresh {
            message: "platform unavailable".into(),
        })
    }
}

/// Never completes a refresh.
struct StalledRefresher;

#[async_trait]
impl CredentialRefresher for StalledRefresher {
    async fn refresh(&self, _stale: &ConnectionDescriptor) -> Result<ConnectionDescriptor, Error> {
        std::future::pending().await
    }
}

/// A localhost port with nothing listening on it.
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

// ── Retry policy ────────────────────────────────────────────────────

#[tokio::test]
async fn test_401_refreshes_and_retries_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .and(header("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let refresher = FixedRefresher::new(descriptor(&server.uri(), "new"));
    let client = RestClient::with_client(reqwest::Client::new()).with_refresher(refresher.clone());

    let states = client
        .get_states(&descriptor(&server.uri(), "old"), TIMEOUT)
        .await
        .unwrap();

    assert!(states.is_empty());
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn test_second_rejection_is_terminal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(2)
        .mount(&server)
        .await;

    let refresher = FixedRefresher::new(descriptor(&server.uri(), "still-bad"));
    let client = RestClient::with_client(reqwest::Client::new()).with_refresher(refresher.clone());

    let result = client
        .get_config(&descriptor(&server.uri(), "bad"), TIMEOUT)
        .await;

    assert!(
        matches!(result, Err(Error::Http { status: 403, .. })),
        "expected HTTP 403, got: {result:?}"
    );
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn test_refresh_to_different_endpoint_abandons_call() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let refresher = FixedRefresher::new(descriptor("https://relay.example.com/hub/1", "new"));
    let client = RestClient::with_client(reqwest::Client::new()).with_refresher(refresher);

    let result = client
        .get_states(&descriptor(&server.uri(), "old"), TIMEOUT)
        .await;

    assert!(
        matches!(result, Err(Error::Http { status: 401, .. })),
        "expected original 401, got: {result:?}"
    );
}

#[tokio::test]
async fn test_failed_refresh_is_auth_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client =
        RestClient::with_client(reqwest::Client::new()).with_refresher(Arc::new(FailingRefresher));

    let result = client
        .get_states(&descriptor(&server.uri(), "old"), TIMEOUT)
        .await;

    assert!(
        matches!(result, Err(Error::AuthFailed { .. })),
        "expected AuthFailed, got: {result:?}"
    );
}

#[tokio::test]
async fn test_401_without_refresher_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::with_client(reqwest::Client::new());
    let result = client
        .get_states(&descriptor(&server.uri(), "old"), TIMEOUT)
        .await;

    let err = result.unwrap_err();
    assert!(err.is_auth_rejection(), "expected auth rejection, got: {err:?}");
}

// ── Failure classification ──────────────────────────────────────────

#[tokio::test]
async fn test_server_error_folds_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/services/light/turn_on"))
        .respond_with(ResponseTemplate::new(500).set_body_string("integration crashed"))
        .mount(&server)
        .await;

    let client = RestClient::with_client(reqwest::Client::new());
    let result = client
        .call_service(
            &descriptor(&server.uri(), "t"),
            "light",
            "turn_on",
            json!({ "entity_id": "light.kitchen" }),
            TIMEOUT,
        )
        .await;

    match result {
        Err(Error::Http { status, message }) => {
            assert_eq!(status, 500);
            assert!(message.contains("integration crashed"), "message: {message}");
        }
        other => panic!("expected HTTP 500, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_refused_connection_is_network_failure() {
    let client = RestClient::with_client(reqwest::Client::new());
    let result = client
        .get_states(&descriptor(&closed_port_url(), "t"), TIMEOUT)
        .await;

    let err = result.unwrap_err();
    assert!(err.is_network(), "expected network failure, got: {err:?}");
}

#[tokio::test]
async fn test_slow_hub_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = RestClient::with_client(reqwest::Client::new());
    let result = client
        .get_states(&descriptor(&server.uri(), "t"), Duration::from_millis(100))
        .await;

    assert!(
        matches!(result, Err(Error::Timeout { timeout_ms: 100 })),
        "expected Timeout, got: {result:?}"
    );
}

#[tokio::test]
async fn test_deadline_covers_credential_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        RestClient::with_client(reqwest::Client::new()).with_refresher(Arc::new(StalledRefresher));
    let result = tokio::time::timeout(
        Duration::from_secs(3),
        client.get_states(&descriptor(&server.uri(), "stale"), Duration::from_millis(200)),
    )
    .await
    .expect("call must honour its own deadline");

    assert!(
        matches!(result, Err(Error::Timeout { timeout_ms: 200 })),
        "expected Timeout, got: {result:?}"
    );
}

// ── Probe ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_probe_counts_any_response_as_reachable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = RestClient::with_client(reqwest::Client::new());
    assert!(
        client
            .probe(&descriptor(&server.uri(), "t"), TIMEOUT)
            .await
    );
}

#[tokio::test]
async fn test_rejected_then_stalled_hub_counts_as_reachable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let refresher = FixedRefresher::new(descriptor(&server.uri(), "fresh"));
    let client = RestClient::with_client(reqwest::Client::new()).with_refresher(refresher.clone());

    assert!(
        client
            .probe(&descriptor(&server.uri(), "stale"), Duration::from_millis(300))
            .await
    );
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn test_probe_unreachable_hub() {
    let client = RestClient::with_client(reqwest::Client::new());
    assert!(
        !client
            .probe(&descriptor(&closed_port_url(), "t"), TIMEOUT)
            .await
    );
}

// ── Endpoint helpers ────────────────────────────────────────────────

#[tokio::test]
async fn test_get_state_reads_friendly_name() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/states/switch.desk_plug"))
        .and(header("authorization", "Bearer t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entity_id": "switch.desk_plug",
            "state": "on",
            "attributes": { "friendly_name": "Desk Plug" }
        })))
        .mount(&server)
        .await;

    let client = RestClient::with_client(reqwest::Client::new());
    let state = client
        .get_state(&descriptor(&server.uri(), "t"), "switch.desk_plug", TIMEOUT)
        .await
        .unwrap();

    assert_eq!(state.friendly_name(), Some("Desk Plug"));
}

#[tokio::test]
async fn test_render_template_returns_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/template"))
        .and(body_json(json!({ "template": "{{ 1 + 1 }}" })))
        .respond_with(ResponseTemplate::new(200).set_body_string("2"))
        .mount(&server)
        .await;

    let client = RestClient::with_client(reqwest::Client::new());
    let rendered = client
        .render_template(&descriptor(&server.uri(), "t"), "{{ 1 + 1 }}", TIMEOUT)
        .await
        .unwrap();

    assert_eq!(rendered, "2");
}

#[tokio::test]
async fn test_relay_prefix_is_preserved() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/hub/abc/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "location_name": "Home", "version": "2025.1.0"
        })))
        .mount(&server)
        .await;

    let client = RestClient::with_client(reqwest::Client::new());
    let config = client
        .get_config(
            &descriptor(&format!("{}/hub/abc/", server.uri()), "t"),
            TIMEOUT,
        )
        .await
        .unwrap();

    assert_eq!(config.location_name.as_deref(), Some("Home"));
}

#[tokio::test]
async fn test_flow_start_and_advance() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/config/config_entries/flow"))
        .and(body_json(json!({ "handler": "matter", "show_advanced_options": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "form", "flow_id": "f1", "handler": "matter", "step_id": "user",
            "data_schema": [], "errors": {}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/config/config_entries/flow/f1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "create_entry", "flow_id": "f1", "title": "Plug"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/config/config_entries/flow/f1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::with_client(reqwest::Client::new());
    let d = descriptor(&server.uri(), "t");

    let step = client.start_flow(&d, "matter", TIMEOUT).await.unwrap();
    assert_eq!(step.flow_id(), Some("f1"));

    let step = client
        .advance_flow(&d, "f1", json!({ "code": "1234" }), TIMEOUT)
        .await
        .unwrap();
    assert!(matches!(step, FlowStep::CreateEntry { .. }));

    client.abort_flow(&d, "f1", TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn test_raw_call_returns_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/error_log"))
        .respond_with(ResponseTemplate::new(200).set_body_string("log line"))
        .mount(&server)
        .await;

    let client = RestClient::with_client(reqwest::Client::new());
    let resp = client
        .call(
            &descriptor(&server.uri(), "t"),
            "/api/error_log",
            &RestRequest::get(),
            TIMEOUT,
        )
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.body(), "log line");
}
