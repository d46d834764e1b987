//! `hublink registry`: device, entity, area and label listings.

use tabled::Tabled;

use hublink_core::{AreaEntry, CoreError, DeviceEntry, EntityEntry, LabelEntry};

use crate::cli::{GlobalOpts, RegistryArgs, RegistryCommand};
use crate::commands::Ctx;
use crate::error::CliError;
use crate::output;

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Manufacturer")]
    manufacturer: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Area")]
    area: String,
    #[tabled(rename = "Labels")]
    labels: String,
}

impl From<&DeviceEntry> for DeviceRow {
    fn from(d: &DeviceEntry) -> Self {
        Self {
            id: d.id.clone(),
            name: d.display_name().unwrap_or("-").to_owned(),
            manufacturer: d.manufacturer.clone().unwrap_or_default(),
            model: d.model.clone().unwrap_or_default(),
            area: d.area_id.clone().unwrap_or_default(),
            labels: d.labels.join(", "),
        }
    }
}

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Entity")]
    entity_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "Area")]
    area: String,
}

impl From<&EntityEntry> for EntityRow {
    fn from(e: &EntityEntry) -> Self {
        Self {
            entity_id: e.entity_id.clone(),
            name: e
                .name
                .clone()
                .or_else(|| e.original_name.clone())
                .unwrap_or_default(),
            device: e.device_id.clone().unwrap_or_default(),
            platform: e.platform.clone().unwrap_or_default(),
            area: e.area_id.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct AreaRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl From<&AreaEntry> for AreaRow {
    fn from(a: &AreaEntry) -> Self {
        Self {
            id: a.area_id.clone(),
            name: a.name.clone(),
        }
    }
}

#[derive(Tabled)]
struct LabelRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Color")]
    color: String,
}

impl From<&LabelEntry> for LabelRow {
    fn from(l: &LabelEntry) -> Self {
        Self {
            id: l.label_id.clone(),
            name: l.name.clone(),
            color: l.color.clone().unwrap_or_default(),
        }
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(ctx: &Ctx, args: RegistryArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let descriptor = ctx.descriptor().await?;
    let ws = ctx.engine.ws();
    let timeout = ctx.engine.config().timeout;

    let out = match args.command {
        RegistryCommand::Devices => {
            let devices = ws
                .list_devices(&descriptor, timeout)
                .await
                .map_err(CoreError::from)?;
            output::render_list(&global.output, &devices, |d| DeviceRow::from(d), |d| d.id.clone())?
        }
        RegistryCommand::Entities { device } => {
            let mut entities = ws
                .list_entities(&descriptor, timeout)
                .await
                .map_err(CoreError::from)?;
            if let Some(ref device_id) = device {
                entities.retain(|e| e.device_id.as_deref() == Some(device_id.as_str()));
            }
            output::render_list(&global.output, &entities, |e| EntityRow::from(e), |e| {
                e.entity_id.clone()
            })?
        }
        RegistryCommand::Areas => {
            let areas = ws
                .list_areas(&descriptor, timeout)
                .await
                .map_err(CoreError::from)?;
            output::render_list(&global.output, &areas, |a| AreaRow::from(a), |a| {
                a.area_id.clone()
            })?
        }
        RegistryCommand::Labels => {
            let labels = ws
                .list_labels(&descriptor, timeout)
                .await
                .map_err(CoreError::from)?;
            output::render_list(&global.output, &labels, |l| LabelRow::from(l), |l| {
                l.label_id.clone()
            })?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
