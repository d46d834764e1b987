// Hub config-flow endpoints
//
// Start, advance and abort a provisioning flow. Every response is a
// `FlowStep`; interpreting it is the caller's business.

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::auth::ConnectionDescriptor;
use crate::error::Error;
use crate::rest::client::{RestClient, RestRequest};
use crate::rest::models::FlowStep;

const FLOW_PATH: &str = "/api/config/config_entries/flow";

impl RestClient {
    /// Start a config flow for `handler` (an integration domain).
    ///
    /// `POST /api/config/config_entries/flow`
    pub async fn start_flow(
        &self,
        descriptor: &ConnectionDescriptor,
        handler: &str,
        timeout: Duration,
    ) -> Result<FlowStep, Error> {
        debug!(handler, "starting config flow");
        let request = RestRequest::post(json!({
            "handler": handler,
            "show_advanced_options": false,
        }));
        self.call_json(descriptor, FLOW_PATH, &request, timeout)
            .await
    }

    /// Submit input to the current step, or `{}` to advance a progress step.
    ///
    /// `POST /api/config/config_entries/flow/{flow_id}`
    pub async fn advance_flow(
        &self,
        descriptor: &ConnectionDescriptor,
        flow_id: &str,
        input: serde_json::Value,
        timeout: Duration,
    ) -> Result<FlowStep, Error> {
        debug!(flow_id, "advancing config flow");
        let path = format!("{FLOW_PATH}/{flow_id}");
        self.call_json(descriptor, &path, &RestRequest::post(input), timeout)
            .await
    }

    /// Abort a flow on the hub.
    ///
    /// `DELETE /api/config/config_entries/flow/{flow_id}`
    pub async fn abort_flow(
        &self,
        descriptor: &ConnectionDescriptor,
        flow_id: &str,
        timeout: Duration,
    ) -> Result<(), Error> {
        debug!(flow_id, "aborting config flow");
        let path = format!("{FLOW_PATH}/{flow_id}");
        self.call(descriptor, &path, &RestRequest::delete(), timeout)
            .await?;
        Ok(())
    }
}
