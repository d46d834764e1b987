// ── Registry snapshot & diff ──
//
// Captures the hub's device and entity ids before and after an operation
// and computes what appeared. Registry access goes through `HubRegistry`
// so commissioning can run against a fake in tests.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use hublink_api::{AreaEntry, ConnectionDescriptor, DeviceUpdate, EntityUpdate, WsRpcClient};
use serde::Serialize;

use crate::error::CoreError;

/// Registry operations the engine needs from a hub.
#[async_trait]
pub trait HubRegistry: Send + Sync {
    async fn device_ids(&self, descriptor: &ConnectionDescriptor) -> Result<Vec<String>, CoreError>;

    async fn entity_ids(&self, descriptor: &ConnectionDescriptor) -> Result<Vec<String>, CoreError>;

    async fn areas(&self, descriptor: &ConnectionDescriptor) -> Result<Vec<AreaEntry>, CoreError>;

    async fn update_device(
        &self,
        descriptor: &ConnectionDescriptor,
        device_id: &str,
        update: &DeviceUpdate,
    ) -> Result<(), CoreError>;

    async fn update_entity(
        &self,
        descriptor: &ConnectionDescriptor,
        entity_id: &str,
        update: &EntityUpdate,
    ) -> Result<(), CoreError>;
}

/// [`HubRegistry`] over the hub's WebSocket command API.
#[derive(Clone)]
pub struct WsRegistry {
    ws: WsRpcClient,
    timeout: Duration,
}

impl WsRegistry {
    pub fn new(ws: WsRpcClient, timeout: Duration) -> Self {
        Self { ws, timeout }
    }
}

#[async_trait]
impl HubRegistry for WsRegistry {
    async fn device_ids(&self, descriptor: &ConnectionDescriptor) -> Result<Vec<String>, CoreError> {
        let devices = self.ws.list_devices(descriptor, self.timeout).await?;
        Ok(devices.into_iter().map(|d| d.id).collect())
    }

    async fn entity_ids(&self, descriptor: &ConnectionDescriptor) -> Result<Vec<String>, CoreError> {
        let entities = self.ws.list_entities(descriptor, self.timeout).await?;
        Ok(entities.into_iter().map(|e| e.entity_id).collect())
    }

    async fn areas(&self, descriptor: &ConnectionDescriptor) -> Result<Vec<AreaEntry>, CoreError> {
        Ok(self.ws.list_areas(descriptor, self.timeout).await?)
    }

    async fn update_device(
        &self,
        descriptor: &ConnectionDescriptor,
        device_id: &str,
        update: &DeviceUpdate,
    ) -> Result<(), CoreError> {
        self.ws
            .update_device(descriptor, device_id, update, self.timeout)
            .await?;
        Ok(())
    }

    async fn update_entity(
        &self,
        descriptor: &ConnectionDescriptor,
        entity_id: &str,
        update: &EntityUpdate,
    ) -> Result<(), CoreError> {
        self.ws
            .update_entity(descriptor, entity_id, update, self.timeout)
            .await?;
        Ok(())
    }
}

// ── Snapshot ─────────────────────────────────────────────────────────

/// Known device and entity ids at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub device_ids: BTreeSet<String>,
    pub entity_ids: BTreeSet<String>,
}

impl RegistrySnapshot {
    /// Build from raw ids: trimmed, de-duplicated, blanks dropped.
    pub fn from_ids<D, E>(devices: D, entities: E) -> Self
    where
        D: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
    {
        Self {
            device_ids: normalize(devices),
            entity_ids: normalize(entities),
        }
    }

    /// List devices and entities concurrently.
    pub async fn capture(
        registry: &dyn HubRegistry,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Self, CoreError> {
        let (devices, entities) = tokio::try_join!(
            registry.device_ids(descriptor),
            registry.entity_ids(descriptor)
        )?;
        Ok(Self::from_ids(devices, entities))
    }
}

fn normalize(ids: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    ids.into_iter()
        .map(|id| id.trim().to_owned())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Ids present in `after` but not in `before`, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryDelta {
    pub new_device_ids: Vec<String>,
    pub new_entity_ids: Vec<String>,
}

impl RegistryDelta {
    pub fn is_empty(&self) -> bool {
        self.new_device_ids.is_empty() && self.new_entity_ids.is_empty()
    }
}

/// Set difference; a missing `before` counts as empty.
pub fn diff(before: Option<&RegistrySnapshot>, after: &RegistrySnapshot) -> RegistryDelta {
    let empty = RegistrySnapshot::default();
    let before = before.unwrap_or(&empty);
    RegistryDelta {
        new_device_ids: after
            .device_ids
            .difference(&before.device_ids)
            .cloned()
            .collect(),
        new_entity_ids: after
            .entity_ids
            .difference(&before.entity_ids)
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn diff_finds_new_ids() {
        let before = RegistrySnapshot::from_ids(ids(&["d1"]), ids(&["a", "b"]));
        let after = RegistrySnapshot::from_ids(ids(&["d1", "d2"]), ids(&["a", "b", "c"]));
        let delta = diff(Some(&before), &after);
        assert_eq!(delta.new_device_ids, ids(&["d2"]));
        assert_eq!(delta.new_entity_ids, ids(&["c"]));
    }

    #[test]
    fn missing_before_counts_as_empty() {
        let after = RegistrySnapshot::from_ids(Vec::new(), ids(&["a"]));
        let delta = diff(None, &after);
        assert_eq!(delta.new_entity_ids, ids(&["a"]));
        assert!(delta.new_device_ids.is_empty());
    }

    #[test]
    fn removed_ids_are_not_reported() {
        let before = RegistrySnapshot::from_ids(ids(&["d1", "d2"]), ids(&["a"]));
        let after = RegistrySnapshot::from_ids(ids(&["d1"]), ids(&["a"]));
        assert!(diff(Some(&before), &after).is_empty());
    }

    #[test]
    fn ids_are_trimmed_and_deduplicated() {
        let snapshot =
            RegistrySnapshot::from_ids(ids(&[" d1 ", "d1", "", "  "]), ids(&["b", "a", "b"]));
        assert_eq!(snapshot.device_ids.len(), 1);
        assert!(snapshot.device_ids.contains("d1"));
        assert_eq!(
            snapshot.entity_ids.iter().cloned().collect::<Vec<_>>(),
            ids(&["a", "b"])
        );
    }
}
