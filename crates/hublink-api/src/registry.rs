// Hub registry commands over WebSocket RPC
//
// Devices, entities, areas and labels live in the hub's registries,
// which are only reachable through the command socket. Each helper is a
// single `WsRpcClient::call`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::auth::ConnectionDescriptor;
use crate::error::Error;
use crate::websocket::WsRpcClient;

// ── Registry entries ─────────────────────────────────────────────────

/// A physical or virtual device known to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_by_user: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub config_entries: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceEntry {
    /// User-assigned name, falling back to the integration's name.
    pub fn display_name(&self) -> Option<&str> {
        self.name_by_user.as_deref().or(self.name.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    pub entity_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaEntry {
    pub area_id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEntry {
    pub label_id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

// ── Updates ──────────────────────────────────────────────────────────

/// Partial device update. `None` fields are left untouched on the hub.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_by_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

/// Partial entity update. `None` fields are left untouched on the hub.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

/// Serialize `update` and add the target key (`device_id` / `entity_id`).
fn update_payload<T: Serialize>(update: &T, key: &str, id: &str) -> Result<Value, Error> {
    let mut payload = serde_json::to_value(update)
        .map_err(|e| Error::Protocol(format!("cannot encode registry update: {e}")))?;
    if let Value::Object(ref mut map) = payload {
        map.insert(key.to_owned(), json!(id));
    }
    Ok(payload)
}

// ── Commands ─────────────────────────────────────────────────────────

impl WsRpcClient {
    /// `config/device_registry/list`
    pub async fn list_devices(
        &self,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> Result<Vec<DeviceEntry>, Error> {
        self.call_typed(descriptor, "config/device_registry/list", Value::Null, timeout)
            .await
    }

    /// `config/entity_registry/list`
    pub async fn list_entities(
        &self,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> Result<Vec<EntityEntry>, Error> {
        self.call_typed(descriptor, "config/entity_registry/list", Value::Null, timeout)
            .await
    }

    /// `config/area_registry/list`
    pub async fn list_areas(
        &self,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> Result<Vec<AreaEntry>, Error> {
        self.call_typed(descriptor, "config/area_registry/list", Value::Null, timeout)
            .await
    }

    /// `config/label_registry/list`
    pub async fn list_labels(
        &self,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> Result<Vec<LabelEntry>, Error> {
        self.call_typed(descriptor, "config/label_registry/list", Value::Null, timeout)
            .await
    }

    /// `config/device_registry/update`
    pub async fn update_device(
        &self,
        descriptor: &ConnectionDescriptor,
        device_id: &str,
        update: &DeviceUpdate,
        timeout: Duration,
    ) -> Result<Value, Error> {
        debug!(device_id, ?update, "updating device registry entry");
        let payload = update_payload(update, "device_id", device_id)?;
        self.call(descriptor, "config/device_registry/update", payload, timeout)
            .await
    }

    /// `config/entity_registry/update`
    pub async fn update_entity(
        &self,
        descriptor: &ConnectionDescriptor,
        entity_id: &str,
        update: &EntityUpdate,
        timeout: Duration,
    ) -> Result<Value, Error> {
        debug!(entity_id, ?update, "updating entity registry entry");
        let payload = update_payload(update, "entity_id", entity_id)?;
        self.call(descriptor, "config/entity_registry/update", payload, timeout)
            .await
    }

    /// `config/device_registry/remove`
    pub async fn remove_device(
        &self,
        descriptor: &ConnectionDescriptor,
        device_id: &str,
        timeout: Duration,
    ) -> Result<(), Error> {
        debug!(device_id, "removing device");
        self.call(
            descriptor,
            "config/device_registry/remove",
            json!({ "device_id": device_id }),
            timeout,
        )
        .await?;
        Ok(())
    }

    /// `config/entity_registry/remove`
    pub async fn remove_entity(
        &self,
        descriptor: &ConnectionDescriptor,
        entity_id: &str,
        timeout: Duration,
    ) -> Result<(), Error> {
        debug!(entity_id, "removing entity");
        self.call(
            descriptor,
            "config/entity_registry/remove",
            json!({ "entity_id": entity_id }),
            timeout,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn device_update_omits_unset_fields() {
        let update = DeviceUpdate {
            area_id: Some("kitchen".into()),
            ..DeviceUpdate::default()
        };
        let payload = update_payload(&update, "device_id", "d1").expect("encodes");
        assert_eq!(payload, json!({ "device_id": "d1", "area_id": "kitchen" }));
    }

    #[test]
    fn entity_entry_tolerates_sparse_payloads() {
        let entry: EntityEntry = serde_json::from_value(json!({
            "entity_id": "switch.plug",
            "device_id": null,
            "has_entity_name": true
        }))
        .expect("sparse entity");
        assert_eq!(entry.device_id, None);
        assert!(entry.labels.is_empty());
        assert!(entry.extra.contains_key("has_entity_name"));
    }

    #[test]
    fn device_display_name_prefers_user_name() {
        let device: DeviceEntry = serde_json::from_value(json!({
            "id": "d1", "name": "Plug v2", "name_by_user": "Desk lamp"
        }))
        .expect("device");
        assert_eq!(device.display_name(), Some("Desk lamp"));
    }
}
