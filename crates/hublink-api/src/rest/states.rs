// Hub state, config, service and template endpoints

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::auth::ConnectionDescriptor;
use crate::error::Error;
use crate::rest::client::{RestClient, RestRequest};
use crate::rest::models::{HubConfig, HubState};

impl RestClient {
    /// List every entity state.
    ///
    /// `GET /api/states`
    pub async fn get_states(
        &self,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> Result<Vec<HubState>, Error> {
        debug!("fetching hub states");
        self.call_json(descriptor, "/api/states", &RestRequest::get(), timeout)
            .await
    }

    /// Fetch the live state of one entity.
    ///
    /// `GET /api/states/{entity_id}`
    pub async fn get_state(
        &self,
        descriptor: &ConnectionDescriptor,
        entity_id: &str,
        timeout: Duration,
    ) -> Result<HubState, Error> {
        debug!(entity_id, "fetching entity state");
        let path = format!("/api/states/{entity_id}");
        self.call_json(descriptor, &path, &RestRequest::get(), timeout)
            .await
    }

    /// Fetch hub configuration.
    ///
    /// `GET /api/config`
    pub async fn get_config(
        &self,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> Result<HubConfig, Error> {
        self.call_json(descriptor, "/api/config", &RestRequest::get(), timeout)
            .await
    }

    /// Invoke a service. Returns the states the hub reports as changed.
    ///
    /// `POST /api/services/{domain}/{service}`
    pub async fn call_service(
        &self,
        descriptor: &ConnectionDescriptor,
        domain: &str,
        service: &str,
        data: serde_json::Value,
        timeout: Duration,
    ) -> Result<Vec<HubState>, Error> {
        debug!(domain, service, "calling hub service");
        let path = format!("/api/services/{domain}/{service}");
        self.call_json(descriptor, &path, &RestRequest::post(data), timeout)
            .await
    }

    /// Render a template on the hub. The response body is plain text.
    ///
    /// `POST /api/template`
    pub async fn render_template(
        &self,
        descriptor: &ConnectionDescriptor,
        template: &str,
        timeout: Duration,
    ) -> Result<String, Error> {
        let request = RestRequest::post(json!({ "template": template }));
        let resp = self
            .call(descriptor, "/api/template", &request, timeout)
            .await?;
        Ok(resp.body().to_owned())
    }
}
