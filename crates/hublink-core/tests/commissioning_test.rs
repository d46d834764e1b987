#![allow(clippy::unwrap_used)]
// Commissioning state machine against a wiremock hub and an in-memory registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hublink_api::{AreaEntry, DeviceUpdate, EntityUpdate, RestClient};
use hublink_core::{
    Commissioner, CommissioningConfig, CommissioningRequest, CommissioningStatus,
    ConnectionDescriptor, CoreError, DeviceOverride, HubRegistry, OverrideStore,
};

const FLOW: &str = "/api/config/config_entries/flow";

// ── Fakes ───────────────────────────────────────────────────────────

/// In-memory registry. Staged ids appear from the second snapshot on.
#[derive(Default)]
struct FakeRegistry {
    devices: Mutex<Vec<String>>,
    entities: Mutex<Vec<String>>,
    staged: Mutex<(Vec<String>, Vec<String>)>,
    areas: Vec<AreaEntry>,
    fail_labels: bool,
    stall_areas: bool,
    listings: AtomicUsize,
    entity_listings: AtomicUsize,
    updates: Mutex<Vec<String>>,
}

impl FakeRegistry {
    fn with_areas() -> Self {
        Self {
            devices: Mutex::new(vec!["d1".into()]),
            entities: Mutex::new(vec!["light.porch".into()]),
            areas: vec![
                serde_json::from_value(json!({ "area_id": "kitchen", "name": "Kitchen" }))
                    .unwrap(),
                serde_json::from_value(json!({ "area_id": "office", "name": "Office" })).unwrap(),
            ],
            ..Self::default()
        }
    }

    fn stage(&self, devices: &[&str], entities: &[&str]) {
        let mut staged = self.staged.lock().unwrap();
        staged.0.extend(devices.iter().map(|s| (*s).to_owned()));
        staged.1.extend(entities.iter().map(|s| (*s).to_owned()));
    }

    fn updates(&self) -> Vec<String> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl HubRegistry for FakeRegistry {
    async fn device_ids(&self, _: &ConnectionDescriptor) -> Result<Vec<String>, CoreError> {
        let mut devices = self.devices.lock().unwrap();
        if self.listings.fetch_add(1, Ordering::SeqCst) > 0 {
            devices.append(&mut self.staged.lock().unwrap().0);
        }
        Ok(devices.clone())
    }

    async fn entity_ids(&self, _: &ConnectionDescriptor) -> Result<Vec<String>, CoreError> {
        let mut entities = self.entities.lock().unwrap();
        if self.entity_listings.fetch_add(1, Ordering::SeqCst) > 0 {
            entities.append(&mut self.staged.lock().unwrap().1);
        }
        Ok(entities.clone())
    }

    async fn areas(&self, _: &ConnectionDescriptor) -> Result<Vec<AreaEntry>, CoreError> {
        if self.stall_areas {
            std::future::pending::<()>().await;
        }
        Ok(self.areas.clone())
    }

    async fn update_device(
        &self,
        _: &ConnectionDescriptor,
        device_id: &str,
        update: &DeviceUpdate,
    ) -> Result<(), CoreError> {
        if self.fail_labels && update.labels.is_some() {
            return Err(CoreError::RemoteError {
                code: "unknown_label".into(),
                message: "label does not exist".into(),
            });
        }
        self.updates.lock().unwrap().push(format!(
            "device {device_id} {}",
            serde_json::to_value(update).unwrap()
        ));
        Ok(())
    }

    async fn update_entity(
        &self,
        _: &ConnectionDescriptor,
        entity_id: &str,
        update: &EntityUpdate,
    ) -> Result<(), CoreError> {
        if self.fail_labels && update.labels.is_some() {
            return Err(CoreError::RemoteError {
                code: "unknown_label".into(),
                message: "label does not exist".into(),
            });
        }
        self.updates.lock().unwrap().push(format!(
            "entity {entity_id} {}",
            serde_json::to_value(update).unwrap()
        ));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingOverrides {
    saved: Mutex<Vec<DeviceOverride>>,
}

#[async_trait]
impl OverrideStore for RecordingOverrides {
    async fn save(&self, record: &DeviceOverride) -> Result<(), CoreError> {
        self.saved.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

struct Harness {
    server: MockServer,
    registry: Arc<FakeRegistry>,
    overrides: Arc<RecordingOverrides>,
    commissioner: Commissioner,
    descriptor: ConnectionDescriptor,
}

async fn harness(registry: FakeRegistry) -> Harness {
    let server = MockServer::start().await;
    let registry = Arc::new(registry);
    let overrides = Arc::new(RecordingOverrides::default());
    let commissioner = Commissioner::new(
        RestClient::with_client(reqwest::Client::new()),
        registry.clone(),
        CommissioningConfig {
            request_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
        },
    )
    .with_override_store(overrides.clone());
    let descriptor = ConnectionDescriptor::new(
        Url::parse(&server.uri()).unwrap(),
        SecretString::from("token".to_string()),
    );
    Harness {
        server,
        registry,
        overrides,
        commissioner,
        descriptor,
    }
}

fn step(kind: &str) -> Value {
    match kind {
        "form" => json!({
            "type": "form", "flow_id": "f1", "handler": "matter", "step_id": "user",
            "data_schema": [{ "name": "code", "type": "string" }], "errors": {}
        }),
        "progress" => json!({
            "type": "progress", "flow_id": "f1", "handler": "matter",
            "step_id": "pair", "progress_action": "pairing"
        }),
        "progress_done" => json!({
            "type": "progress_done", "flow_id": "f1", "handler": "matter", "step_id": "pair"
        }),
        "create_entry" => json!({
            "type": "create_entry", "flow_id": "f1", "handler": "matter", "title": "Smart Plug"
        }),
        other => panic!("unknown step {other}"),
    }
}

async fn mount_start(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path(FLOW))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

fn pairing_input() -> serde_json::Map<String, Value> {
    json!({ "code": "1234-5678" }).as_object().unwrap().clone()
}

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_form_progress_create_entry_finalizes_once() {
    let h = harness(FakeRegistry::with_areas()).await;

    mount_start(&h.server, step("form")).await;
    Mock::given(method("POST"))
        .and(path(format!("{FLOW}/f1")))
        .and(body_json(json!({ "code": "1234-5678" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(step("progress")))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{FLOW}/f1")))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(step("create_entry")))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/states/switch.desk_plug"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entity_id": "switch.desk_plug", "state": "off",
            "attributes": { "friendly_name": "Desk Plug" }
        })))
        .mount(&h.server)
        .await;

    let request = CommissioningRequest::new("matter")
        .with_input(pairing_input())
        .with_area("kitchen")
        .with_label("new-devices")
        .with_type_override("switch");

    let mut session = h.commissioner.start(&h.descriptor, request).await.unwrap();
    assert_eq!(session.status, CommissioningStatus::InProgress);
    assert_eq!(session.flow_id.as_deref(), Some("f1"));

    h.registry.stage(&["d2"], &["switch.desk_plug"]);

    h.commissioner.poll(&h.descriptor, &mut session).await.unwrap();

    assert_eq!(session.status, CommissioningStatus::Succeeded);
    assert!(session.is_final);
    assert_eq!(
        session.transitions,
        vec![
            CommissioningStatus::NeedsInput,
            CommissioningStatus::InProgress,
            CommissioningStatus::Succeeded,
        ]
    );
    assert_eq!(session.new_device_ids, vec!["d2".to_owned()]);
    assert_eq!(session.new_entity_ids, vec!["switch.desk_plug".to_owned()]);
    assert!(session.warnings.is_empty(), "warnings: {:?}", session.warnings);
    session.check().unwrap();

    let saved = h.overrides.saved.lock().unwrap().clone();
    assert_eq!(
        saved,
        vec![DeviceOverride {
            entity_id: "switch.desk_plug".into(),
            device_id: Some("d2".into()),
            display_name: "Desk Plug".into(),
            area: Some("kitchen".into()),
            device_type: Some("switch".into()),
        }]
    );
    assert_eq!(
        h.registry.updates(),
        vec![
            r#"device d2 {"labels":["new-devices"]}"#.to_owned(),
            r#"entity switch.desk_plug {"labels":["new-devices"]}"#.to_owned(),
            r#"device d2 {"area_id":"kitchen"}"#.to_owned(),
        ]
    );

    // Further polls on a final session touch nothing.
    h.commissioner.poll(&h.descriptor, &mut session).await.unwrap();
    assert_eq!(h.overrides.saved.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_user_name_and_area_by_name_apply_to_device() {
    let h = harness(FakeRegistry::with_areas()).await;

    mount_start(&h.server, step("create_entry")).await;

    let request = CommissioningRequest::new("zha")
        .with_area("OFFICE")
        .with_name("  Reading Lamp ");

    h.registry.stage(&["d9"], &["light.reading_lamp"]);
    let session = h.commissioner.start(&h.descriptor, request).await.unwrap();

    assert_eq!(session.status, CommissioningStatus::Succeeded);
    let saved = h.overrides.saved.lock().unwrap().clone();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].display_name, "Reading Lamp");
    assert!(
        h.registry
            .updates()
            .contains(&r#"device d9 {"area_id":"office","name_by_user":"Reading Lamp"}"#.to_owned())
    );
}

#[tokio::test]
async fn test_progress_done_step_leads_to_success() {
    let h = harness(FakeRegistry::with_areas()).await;

    mount_start(&h.server, step("progress")).await;
    Mock::given(method("POST"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(step("progress_done")))
        .up_to_n_times(1)
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(step("create_entry")))
        .expect(1)
        .mount(&h.server)
        .await;

    let mut session = h
        .commissioner
        .start(&h.descriptor, CommissioningRequest::new("matter"))
        .await
        .unwrap();
    h.registry.stage(&["d3"], &["switch.garage"]);

    h.commissioner
        .run(&h.descriptor, &mut session, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(session.status, CommissioningStatus::Succeeded);
    assert_eq!(
        session.transitions,
        vec![CommissioningStatus::InProgress, CommissioningStatus::Succeeded]
    );
    assert_eq!(session.new_entity_ids, vec!["switch.garage".to_owned()]);
}

// ── Failure paths ───────────────────────────────────────────────────

#[tokio::test]
async fn test_abort_fails_without_finalization() {
    let h = harness(FakeRegistry::with_areas()).await;

    mount_start(
        &h.server,
        json!({ "type": "abort", "flow_id": "f1", "reason": "already_configured" }),
    )
    .await;

    let session = h
        .commissioner
        .start(&h.descriptor, CommissioningRequest::new("matter").with_label("x"))
        .await
        .unwrap();

    assert_eq!(session.status, CommissioningStatus::Failed);
    assert!(session.is_final);
    assert_eq!(session.error.as_deref(), Some("flow aborted: already_configured"));
    assert_eq!(h.registry.listings.load(Ordering::SeqCst), 1, "pre-snapshot only");
    assert!(h.overrides.saved.lock().unwrap().is_empty());
    assert!(h.registry.updates().is_empty());
    assert!(matches!(
        session.check(),
        Err(CoreError::CommissioningFailed { .. })
    ));
}

#[tokio::test]
async fn test_failed_initial_submit_aborts_remote_flow() {
    let h = harness(FakeRegistry::with_areas()).await;

    mount_start(&h.server, step("form")).await;
    Mock::given(method("POST"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(500).set_body_string("pairing backend crashed"))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h
        .commissioner
        .start(
            &h.descriptor,
            CommissioningRequest::new("matter").with_input(pairing_input()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::HttpFailure { status: 500, .. }), "got {err:?}");
    assert!(h.registry.updates().is_empty());
}

#[tokio::test]
async fn test_form_errors_fail_the_session() {
    let h = harness(FakeRegistry::with_areas()).await;

    mount_start(&h.server, step("form")).await;
    Mock::given(method("POST"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "form", "flow_id": "f1", "step_id": "user",
            "errors": { "code": "invalid_code" }
        })))
        .mount(&h.server)
        .await;

    let session = h
        .commissioner
        .start(
            &h.descriptor,
            CommissioningRequest::new("matter").with_input(pairing_input()),
        )
        .await
        .unwrap();

    assert_eq!(session.status, CommissioningStatus::Failed);
    assert_eq!(session.error.as_deref(), Some("code: invalid_code"));
}

#[tokio::test]
async fn test_label_failure_yields_exactly_one_warning() {
    let registry = FakeRegistry {
        fail_labels: true,
        ..FakeRegistry::with_areas()
    };
    let h = harness(registry).await;

    mount_start(&h.server, step("progress")).await;
    Mock::given(method("POST"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(step("create_entry")))
        .mount(&h.server)
        .await;

    let request = CommissioningRequest::new("matter")
        .with_area("Kitchen")
        .with_label("missing-label");
    let mut session = h.commissioner.start(&h.descriptor, request).await.unwrap();
    h.registry
        .stage(&["d2"], &["sensor.plug_power", "switch.plug"]);
    h.commissioner.poll(&h.descriptor, &mut session).await.unwrap();

    assert_eq!(session.status, CommissioningStatus::Succeeded);
    assert_eq!(session.warnings.len(), 1, "warnings: {:?}", session.warnings);
    assert!(session.warnings[0].contains("applying label failed for 3 item(s)"));
    assert_eq!(h.overrides.saved.lock().unwrap().len(), 2);
    assert_eq!(
        h.registry.updates(),
        vec![r#"device d2 {"area_id":"kitchen"}"#.to_owned()]
    );
    assert!(matches!(
        session.check(),
        Err(CoreError::PartialFailure { ref warnings }) if warnings.len() == 1
    ));
}

#[tokio::test]
async fn test_no_new_entities_is_a_warning() {
    let h = harness(FakeRegistry::with_areas()).await;

    mount_start(&h.server, step("create_entry")).await;

    let session = h
        .commissioner
        .start(&h.descriptor, CommissioningRequest::new("matter"))
        .await
        .unwrap();

    assert_eq!(session.status, CommissioningStatus::Succeeded);
    assert_eq!(session.warnings, vec!["no new entities detected yet".to_owned()]);
    assert!(h.overrides.saved.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_success_survives_interrupted_finalization() {
    let registry = FakeRegistry {
        stall_areas: true,
        ..FakeRegistry::with_areas()
    };
    let h = harness(registry).await;

    mount_start(&h.server, step("progress")).await;
    Mock::given(method("POST"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(step("create_entry")))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let mut session = h
        .commissioner
        .start(
            &h.descriptor,
            CommissioningRequest::new("matter").with_area("Kitchen"),
        )
        .await
        .unwrap();
    h.registry.stage(&["d4"], &["switch.shed"]);

    // The area lookup never returns, so finalization is cut short.
    let interrupted = tokio::time::timeout(
        Duration::from_millis(200),
        h.commissioner.poll(&h.descriptor, &mut session),
    )
    .await;
    assert!(interrupted.is_err());

    assert_eq!(session.status, CommissioningStatus::Succeeded);
    assert!(session.is_final);

    h.commissioner.cancel(&h.descriptor, &mut session).await;
    assert_eq!(session.status, CommissioningStatus::Succeeded);
    assert_eq!(
        session.transitions,
        vec![CommissioningStatus::InProgress, CommissioningStatus::Succeeded]
    );
}

// ── Cancellation & run loop ─────────────────────────────────────────

#[tokio::test]
async fn test_cancel_aborts_remote_flow() {
    let h = harness(FakeRegistry::with_areas()).await;

    mount_start(&h.server, step("progress")).await;
    Mock::given(method("DELETE"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&h.server)
        .await;

    let mut session = h
        .commissioner
        .start(&h.descriptor, CommissioningRequest::new("matter"))
        .await
        .unwrap();
    h.commissioner.cancel(&h.descriptor, &mut session).await;

    assert_eq!(session.status, CommissioningStatus::Canceled);
    assert!(session.is_final);

    // Frozen: a second cancel and a poll send nothing.
    h.commissioner.cancel(&h.descriptor, &mut session).await;
    h.commissioner.poll(&h.descriptor, &mut session).await.unwrap();
    assert!(matches!(session.check(), Err(CoreError::Canceled)));
}

#[tokio::test]
async fn test_run_polls_until_terminal() {
    let h = harness(FakeRegistry::with_areas()).await;

    mount_start(&h.server, step("progress")).await;
    Mock::given(method("POST"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(step("progress")))
        .up_to_n_times(2)
        .expect(2)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(step("create_entry")))
        .expect(1)
        .mount(&h.server)
        .await;

    let mut session = h
        .commissioner
        .start(&h.descriptor, CommissioningRequest::new("matter"))
        .await
        .unwrap();
    h.registry.stage(&[], &["switch.plug"]);

    h.commissioner
        .run(&h.descriptor, &mut session, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(session.status, CommissioningStatus::Succeeded);
    assert_eq!(session.new_entity_ids, vec!["switch.plug".to_owned()]);
}

#[tokio::test]
async fn test_run_honours_cancellation_token() {
    let h = harness(FakeRegistry::with_areas()).await;

    mount_start(&h.server, step("progress")).await;
    Mock::given(method("DELETE"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;

    let mut session = h
        .commissioner
        .start(&h.descriptor, CommissioningRequest::new("matter"))
        .await
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    h.commissioner
        .run(&h.descriptor, &mut session, token)
        .await
        .unwrap();

    assert_eq!(session.status, CommissioningStatus::Canceled);
}

#[tokio::test]
async fn test_run_fails_session_on_hard_error() {
    let h = harness(FakeRegistry::with_areas()).await;

    mount_start(&h.server, step("progress")).await;
    Mock::given(method("POST"))
        .and(path(format!("{FLOW}/f1")))
        .respond_with(ResponseTemplate::new(404).set_body_string("flow not found"))
        .mount(&h.server)
        .await;

    let mut session = h
        .commissioner
        .start(&h.descriptor, CommissioningRequest::new("matter"))
        .await
        .unwrap();
    let err = h
        .commissioner
        .run(&h.descriptor, &mut session, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::HttpFailure { status: 404, .. }));
    assert_eq!(session.status, CommissioningStatus::Failed);
    assert!(session.error.unwrap().contains("flow not found"));
}
