// Hub REST API response types
//
// Fields use `#[serde(default)]` liberally because the hub adds fields
// between releases; anything not modelled lands in `extra`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── States ───────────────────────────────────────────────────────────

/// One entity state from `GET /api/states`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub last_changed: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl HubState {
    /// The `friendly_name` attribute, if set and non-blank.
    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes
            .get("friendly_name")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// The domain half of the entity id (`light` in `light.kitchen`).
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or(self.entity_id.as_str(), |(domain, _)| domain)
    }
}

/// Hub configuration from `GET /api/config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub internal_url: Option<String>,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Config flows ─────────────────────────────────────────────────────

/// One step of a hub-side config flow.
///
/// Closed set of step shapes; the `type` field selects the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowStep {
    /// The flow needs user input matching `data_schema`.
    Form {
        flow_id: String,
        #[serde(default)]
        handler: Option<String>,
        #[serde(default)]
        step_id: Option<String>,
        #[serde(default)]
        data_schema: Vec<serde_json::Value>,
        #[serde(default)]
        errors: Option<BTreeMap<String, String>>,
    },
    /// The flow offers a choice of next steps.
    Menu {
        flow_id: String,
        #[serde(default)]
        handler: Option<String>,
        #[serde(default)]
        step_id: Option<String>,
        #[serde(default)]
        menu_options: serde_json::Value,
    },
    /// The hub is working; poll again later.
    #[serde(alias = "show_progress")]
    Progress {
        flow_id: String,
        #[serde(default)]
        handler: Option<String>,
        #[serde(default)]
        step_id: Option<String>,
        #[serde(default)]
        progress_action: Option<String>,
    },
    /// Background work finished; the next poll advances the flow.
    #[serde(alias = "show_progress_done")]
    ProgressDone {
        flow_id: String,
        #[serde(default)]
        handler: Option<String>,
        #[serde(default)]
        step_id: Option<String>,
    },
    /// The flow created a config entry.
    CreateEntry {
        #[serde(default)]
        flow_id: Option<String>,
        #[serde(default)]
        handler: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        result: Option<serde_json::Value>,
    },
    /// The flow was aborted by the hub.
    Abort {
        #[serde(default)]
        flow_id: Option<String>,
        #[serde(default)]
        handler: Option<String>,
        reason: String,
    },
}

impl FlowStep {
    pub fn flow_id(&self) -> Option<&str> {
        match self {
            Self::Form { flow_id, .. }
            | Self::Menu { flow_id, .. }
            | Self::Progress { flow_id, .. }
            | Self::ProgressDone { flow_id, .. } => Some(flow_id),
            Self::CreateEntry { flow_id, .. } | Self::Abort { flow_id, .. } => flow_id.as_deref(),
        }
    }

    /// Field-level errors, joined as `field: message; ...`.
    ///
    /// `None` when the step carries no errors.
    pub fn error_summary(&self) -> Option<String> {
        let Self::Form {
            errors: Some(errors),
            ..
        } = self
        else {
            return None;
        };
        if errors.is_empty() {
            return None;
        }
        Some(
            errors
                .iter()
                .map(|(field, message)| format!("{field}: {message}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
