use chrono::{DateTime, Utc};
use hublink_api::FlowStep;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::Display;
use uuid::Uuid;

use crate::error::CoreError;
use crate::registry::RegistrySnapshot;

/// Where a commissioning session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissioningStatus {
    NeedsInput,
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl CommissioningStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// What to provision and how to label the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommissioningRequest {
    /// Integration domain that owns the flow (e.g. `matter`).
    pub handler: String,
    /// Submitted to the first form step when non-empty.
    #[serde(default)]
    pub input: Map<String, Value>,
    /// Area id or name to assign.
    #[serde(default)]
    pub area: Option<String>,
    /// User-facing name for the new device.
    #[serde(default)]
    pub name: Option<String>,
    /// Device type recorded in the platform override.
    #[serde(default)]
    pub type_override: Option<String>,
    /// Label id applied to new devices and entities.
    #[serde(default)]
    pub label_id: Option<String>,
}

impl CommissioningRequest {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: Map<String, Value>) -> Self {
        self.input = input;
        self
    }

    pub fn with_area(mut self, area: impl Into<String>) -> Self {
        self.area = Some(area.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type_override(mut self, device_type: impl Into<String>) -> Self {
        self.type_override = Some(device_type.into());
        self
    }

    pub fn with_label(mut self, label_id: impl Into<String>) -> Self {
        self.label_id = Some(label_id.into());
        self
    }

    /// The requested name, if non-blank.
    pub(crate) fn user_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

/// One provisioning attempt, owned by the caller.
///
/// Frozen once `is_final` is set: later polls, submits and cancels leave
/// it untouched.
#[derive(Debug, Clone, Serialize)]
pub struct CommissioningSession {
    pub id: Uuid,
    pub status: CommissioningStatus,
    pub flow_id: Option<String>,
    pub request: CommissioningRequest,
    pub last_step: Option<FlowStep>,
    pub new_device_ids: Vec<String>,
    pub new_entity_ids: Vec<String>,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub is_final: bool,
    /// Every status entered, in order, without repeats.
    pub transitions: Vec<CommissioningStatus>,
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) pre_snapshot: Option<RegistrySnapshot>,
    #[serde(skip)]
    pub(crate) finalized: bool,
}

impl CommissioningSession {
    pub fn new(request: CommissioningRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: CommissioningStatus::NeedsInput,
            flow_id: None,
            request,
            last_step: None,
            new_device_ids: Vec::new(),
            new_entity_ids: Vec::new(),
            error: None,
            warnings: Vec::new(),
            is_final: false,
            transitions: Vec::new(),
            started_at: Utc::now(),
            pre_snapshot: None,
            finalized: false,
        }
    }

    /// Map a terminal session to the caller-facing outcome.
    pub fn check(&self) -> Result<(), CoreError> {
        match self.status {
            CommissioningStatus::Succeeded if self.warnings.is_empty() => Ok(()),
            CommissioningStatus::Succeeded => Err(CoreError::PartialFailure {
                warnings: self.warnings.clone(),
            }),
            CommissioningStatus::Failed => Err(CoreError::CommissioningFailed {
                message: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "provisioning flow failed".into()),
            }),
            CommissioningStatus::Canceled => Err(CoreError::Canceled),
            CommissioningStatus::NeedsInput | CommissioningStatus::InProgress => {
                Err(CoreError::Internal(format!(
                    "commissioning session {} is still {}",
                    self.id, self.status
                )))
            }
        }
    }

    /// Enter `status`. Ignored once the session is final.
    pub(crate) fn enter(&mut self, status: CommissioningStatus) {
        if self.is_final {
            return;
        }
        if self.transitions.last() != Some(&status) {
            tracing::info!(session = %self.id, from = %self.status, to = %status, "commissioning transition");
            self.transitions.push(status);
        }
        self.status = status;
        self.is_final = status.is_terminal();
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        if self.is_final {
            return;
        }
        self.error = Some(message.into());
        self.enter(CommissioningStatus::Failed);
    }

    pub(crate) fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::warn!(session = %self.id, %warning, "commissioning degraded");
        self.warnings.push(warning);
    }
}

/// How a flow step moves the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    NeedsInput,
    InProgress,
    Succeeded,
    Failed(String),
}

pub(crate) fn classify(step: &FlowStep) -> StepOutcome {
    if let Some(errors) = step.error_summary() {
        return StepOutcome::Failed(errors);
    }
    match step {
        FlowStep::Form { .. } | FlowStep::Menu { .. } => StepOutcome::NeedsInput,
        FlowStep::Progress { .. } | FlowStep::ProgressDone { .. } => StepOutcome::InProgress,
        FlowStep::CreateEntry { .. } => StepOutcome::Succeeded,
        FlowStep::Abort { reason, .. } => StepOutcome::Failed(format!("flow aborted: {reason}")),
    }
}
