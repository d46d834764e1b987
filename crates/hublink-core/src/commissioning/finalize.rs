use hublink_api::{ConnectionDescriptor, DeviceUpdate, EntityUpdate};
use tracing::debug;

use super::{Commissioner, CommissioningSession};
use crate::error::CoreError;
use crate::platform::DeviceOverride;
use crate::registry::{RegistryDelta, RegistrySnapshot, diff};

/// Failures of one finalization step, folded into a single warning.
struct StepFailures {
    step: &'static str,
    count: usize,
    first: Option<String>,
}

impl StepFailures {
    fn new(step: &'static str) -> Self {
        Self {
            step,
            count: 0,
            first: None,
        }
    }

    fn record(&mut self, target: &str, err: &CoreError) {
        self.count += 1;
        if self.first.is_none() {
            self.first = Some(format!("{target}: {err}"));
        }
    }

    fn into_warning(self) -> Option<String> {
        let first = self.first?;
        Some(format!(
            "{} failed for {} item(s); first error: {first}",
            self.step, self.count
        ))
    }
}

impl Commissioner {
    pub(super) async fn finalize(
        &self,
        descriptor: &ConnectionDescriptor,
        session: &mut CommissioningSession,
    ) {
        let delta = match RegistrySnapshot::capture(self.registry.as_ref(), descriptor).await {
            Ok(after) => diff(session.pre_snapshot.as_ref(), &after),
            Err(e) => {
                session.warn(format!("could not snapshot registry after commissioning: {e}"));
                RegistryDelta::default()
            }
        };
        debug!(
            session = %session.id,
            devices = delta.new_device_ids.len(),
            entities = delta.new_entity_ids.len(),
            "registry delta"
        );
        session.new_device_ids.clone_from(&delta.new_device_ids);
        session.new_entity_ids.clone_from(&delta.new_entity_ids);

        if delta.new_entity_ids.is_empty() {
            session.warn("no new entities detected yet");
        }

        let names = self.display_names(descriptor, session, &delta).await;

        if let Some(warning) = self.persist_overrides(session, &delta, &names).await {
            session.warn(warning);
        }
        if let Some(warning) = self.apply_label(descriptor, session, &delta).await {
            session.warn(warning);
        }
        if let Some(warning) = self.apply_area(descriptor, session, &delta).await {
            session.warn(warning);
        }
    }

    /// User name, else live `friendly_name`, else the entity id.
    async fn display_names(
        &self,
        descriptor: &ConnectionDescriptor,
        session: &CommissioningSession,
        delta: &RegistryDelta,
    ) -> Vec<(String, String)> {
        let mut names = Vec::with_capacity(delta.new_entity_ids.len());
        for entity_id in &delta.new_entity_ids {
            let name = if let Some(name) = session.request.user_name() {
                name.to_owned()
            } else {
                match self
                    .rest
                    .get_state(descriptor, entity_id, self.config.request_timeout)
                    .await
                {
                    Ok(state) => state
                        .friendly_name()
                        .map_or_else(|| entity_id.clone(), str::to_owned),
                    Err(e) => {
                        debug!(entity_id, error = %e, "no live state, naming by id");
                        entity_id.clone()
                    }
                }
            };
            names.push((entity_id.clone(), name));
        }
        names
    }

    async fn persist_overrides(
        &self,
        session: &CommissioningSession,
        delta: &RegistryDelta,
        names: &[(String, String)],
    ) -> Option<String> {
        let store = self.overrides.as_ref()?;
        let device_id = match delta.new_device_ids.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };

        let mut failures = StepFailures::new("saving device overrides");
        for (entity_id, display_name) in names {
            let record = DeviceOverride {
                entity_id: entity_id.clone(),
                device_id: device_id.clone(),
                display_name: display_name.clone(),
                area: session.request.area.clone(),
                device_type: session.request.type_override.clone(),
            };
            if let Err(e) = store.save(&record).await {
                failures.record(entity_id, &e);
            }
        }
        failures.into_warning()
    }

    async fn apply_label(
        &self,
        descriptor: &ConnectionDescriptor,
        session: &CommissioningSession,
        delta: &RegistryDelta,
    ) -> Option<String> {
        let label = session.request.label_id.as_ref()?;
        let mut failures = StepFailures::new("applying label");

        let device_update = DeviceUpdate {
            labels: Some(vec![label.clone()]),
            ..DeviceUpdate::default()
        };
        for device_id in &delta.new_device_ids {
            if let Err(e) = self
                .registry
                .update_device(descriptor, device_id, &device_update)
                .await
            {
                failures.record(device_id, &e);
            }
        }

        let entity_update = EntityUpdate {
            labels: Some(vec![label.clone()]),
            ..EntityUpdate::default()
        };
        for entity_id in &delta.new_entity_ids {
            if let Err(e) = self
                .registry
                .update_entity(descriptor, entity_id, &entity_update)
                .await
            {
                failures.record(entity_id, &e);
            }
        }
        failures.into_warning()
    }

    /// Assign the area (and the user's name) to new devices, or to new
    /// entities when no device appeared.
    async fn apply_area(
        &self,
        descriptor: &ConnectionDescriptor,
        session: &CommissioningSession,
        delta: &RegistryDelta,
    ) -> Option<String> {
        let request = &session.request;
        let user_name = request.user_name().map(str::to_owned);
        if request.area.is_none() && user_name.is_none() {
            return None;
        }

        let mut lookup_warning = None;
        let area_id = match request.area {
            Some(ref wanted) => match self.resolve_area(descriptor, wanted).await {
                Ok(Some(id)) => Some(id),
                Ok(None) => {
                    lookup_warning = Some(format!("area '{wanted}' not found on the hub"));
                    None
                }
                Err(e) => {
                    lookup_warning = Some(format!("could not look up area '{wanted}': {e}"));
                    None
                }
            },
            None => None,
        };

        let mut failures = StepFailures::new("assigning area");
        if delta.new_device_ids.is_empty() {
            let update = EntityUpdate {
                area_id: area_id.clone(),
                name: user_name,
                ..EntityUpdate::default()
            };
            if update != EntityUpdate::default() {
                for entity_id in &delta.new_entity_ids {
                    if let Err(e) = self
                        .registry
                        .update_entity(descriptor, entity_id, &update)
                        .await
                    {
                        failures.record(entity_id, &e);
                    }
                }
            }
        } else {
            let update = DeviceUpdate {
                area_id,
                name_by_user: user_name,
                ..DeviceUpdate::default()
            };
            if update != DeviceUpdate::default() {
                for device_id in &delta.new_device_ids {
                    if let Err(e) = self
                        .registry
                        .update_device(descriptor, device_id, &update)
                        .await
                    {
                        failures.record(device_id, &e);
                    }
                }
            }
        }

        match (lookup_warning, failures.into_warning()) {
            (Some(lookup), Some(update)) => Some(format!("{lookup}; {update}")),
            (lookup, update) => lookup.or(update),
        }
    }

    /// Match by area id, then by case-insensitive name.
    async fn resolve_area(
        &self,
        descriptor: &ConnectionDescriptor,
        wanted: &str,
    ) -> Result<Option<String>, CoreError> {
        let wanted = wanted.trim();
        let areas = self.registry.areas(descriptor).await?;
        let found = areas
            .iter()
            .find(|a| a.area_id == wanted)
            .or_else(|| areas.iter().find(|a| a.name.trim().eq_ignore_ascii_case(wanted)));
        Ok(found.map(|a| a.area_id.clone()))
    }
}
