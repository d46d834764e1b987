// ── Commissioning state machine ──
//
// Drives a hub-side config flow from start to a terminal step by
// polling, then finalizes exactly once on success: diff the registry,
// name the new entities, apply override/label/area metadata. Finalization
// problems become session warnings and never fail the session.

mod finalize;
mod session;

use std::sync::Arc;
use std::time::Duration;

use hublink_api::{ConnectionDescriptor, FlowStep, RestClient};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::platform::OverrideStore;
use crate::registry::{HubRegistry, RegistrySnapshot};

pub use session::{CommissioningRequest, CommissioningSession, CommissioningStatus};
use session::{StepOutcome, classify};

/// Consecutive transient poll failures tolerated by [`Commissioner::run`].
const MAX_TRANSIENT_POLL_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct CommissioningConfig {
    /// Deadline for each hub call made while commissioning.
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for CommissioningConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(3),
        }
    }
}

pub struct Commissioner {
    rest: RestClient,
    registry: Arc<dyn HubRegistry>,
    overrides: Option<Arc<dyn OverrideStore>>,
    config: CommissioningConfig,
}

impl Commissioner {
    pub fn new(
        rest: RestClient,
        registry: Arc<dyn HubRegistry>,
        config: CommissioningConfig,
    ) -> Self {
        Self {
            rest,
            registry,
            overrides: None,
            config,
        }
    }

    pub fn with_override_store(mut self, overrides: Arc<dyn OverrideStore>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn config(&self) -> &CommissioningConfig {
        &self.config
    }

    /// Snapshot the registry, start the flow, and submit initial input.
    ///
    /// Fails when the flow cannot be started or the initial input cannot
    /// be delivered; in the latter case the remote flow is aborted first.
    /// A failed snapshot is a warning.
    pub async fn start(
        &self,
        descriptor: &ConnectionDescriptor,
        request: CommissioningRequest,
    ) -> Result<CommissioningSession, CoreError> {
        let mut session = CommissioningSession::new(request);

        match RegistrySnapshot::capture(self.registry.as_ref(), descriptor).await {
            Ok(snapshot) => session.pre_snapshot = Some(snapshot),
            Err(e) => session.warn(format!("could not snapshot registry before commissioning: {e}")),
        }

        let step = self
            .rest
            .start_flow(descriptor, &session.request.handler, self.config.request_timeout)
            .await?;
        debug!(session = %session.id, handler = %session.request.handler, "config flow started");
        self.apply(descriptor, &mut session, step).await;

        let wants_input = matches!(session.last_step, Some(FlowStep::Form { .. }));
        if !session.is_final && wants_input && !session.request.input.is_empty() {
            let input = Value::Object(session.request.input.clone());
            if let Err(e) = self.submit(descriptor, &mut session, input).await {
                // The session is dropped here; the hub flow goes with it.
                warn!(session = %session.id, error = %e, "initial input failed, aborting config flow");
                self.cancel(descriptor, &mut session).await;
                return Err(e);
            }
        }
        Ok(session)
    }

    /// Submit user input to the current step. No-op on a final session.
    pub async fn submit(
        &self,
        descriptor: &ConnectionDescriptor,
        session: &mut CommissioningSession,
        input: Value,
    ) -> Result<(), CoreError> {
        if session.is_final {
            return Ok(());
        }
        let flow_id = session
            .flow_id
            .clone()
            .ok_or_else(|| CoreError::Internal("commissioning session has no flow id".into()))?;
        let step = self
            .rest
            .advance_flow(descriptor, &flow_id, input, self.config.request_timeout)
            .await?;
        self.apply(descriptor, session, step).await;
        Ok(())
    }

    /// Advance an in-progress flow by one step.
    ///
    /// No-op for final sessions and for sessions waiting on input.
    pub async fn poll(
        &self,
        descriptor: &ConnectionDescriptor,
        session: &mut CommissioningSession,
    ) -> Result<(), CoreError> {
        if session.is_final || session.status != CommissioningStatus::InProgress {
            return Ok(());
        }
        self.submit(descriptor, session, json!({})).await
    }

    /// Abort the remote flow (best-effort) and mark the session canceled.
    pub async fn cancel(&self, descriptor: &ConnectionDescriptor, session: &mut CommissioningSession) {
        if session.is_final {
            return;
        }
        if let Some(ref flow_id) = session.flow_id {
            if let Err(e) = self
                .rest
                .abort_flow(descriptor, flow_id, self.config.request_timeout)
                .await
            {
                warn!(session = %session.id, flow_id, error = %e, "failed to abort config flow");
            }
        }
        session.enter(CommissioningStatus::Canceled);
    }

    /// Poll on the configured interval until the session is final, needs
    /// input, or `cancel` fires.
    ///
    /// Transient poll failures are retried a few times; anything else
    /// fails the session and is returned.
    pub async fn run(
        &self,
        descriptor: &ConnectionDescriptor,
        session: &mut CommissioningSession,
        cancel: CancellationToken,
    ) -> Result<(), CoreError> {
        let mut transient_failures = 0;

        while !session.is_final && session.status == CommissioningStatus::InProgress {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.cancel(descriptor, session).await;
                    break;
                }
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }

            match self.poll(descriptor, session).await {
                Ok(()) => transient_failures = 0,
                Err(e) if e.is_transient() && transient_failures < MAX_TRANSIENT_POLL_FAILURES => {
                    transient_failures += 1;
                    warn!(session = %session.id, error = %e, attempt = transient_failures, "poll failed, retrying");
                }
                Err(e) => {
                    session.fail(format!("polling failed: {e}"));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Record a step and move the session accordingly.
    async fn apply(
        &self,
        descriptor: &ConnectionDescriptor,
        session: &mut CommissioningSession,
        step: FlowStep,
    ) {
        if session.is_final {
            return;
        }
        if let Some(flow_id) = step.flow_id() {
            session.flow_id = Some(flow_id.to_owned());
        }
        let outcome = classify(&step);
        session.last_step = Some(step);

        match outcome {
            StepOutcome::NeedsInput => session.enter(CommissioningStatus::NeedsInput),
            StepOutcome::InProgress => session.enter(CommissioningStatus::InProgress),
            StepOutcome::Failed(message) => session.fail(message),
            StepOutcome::Succeeded => {
                // Succeeded holds even if finalization is cut short.
                session.enter(CommissioningStatus::Succeeded);
                if !session.finalized {
                    session.finalized = true;
                    self.finalize(descriptor, session).await;
                }
            }
        }
    }
}
