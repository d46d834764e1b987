// ── Platform collaborators ──
//
// The kiosk platform issues hub credentials and stores per-device
// display overrides. Both speak plain JSON REST with the kiosk secret as
// bearer token. A static token source covers installs without a platform.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hublink_api::TransportConfig;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::credentials::{CredentialBundle, CredentialSource};
use crate::error::CoreError;

const KIOSK_SESSION_PATH: &str = "/api/kiosk/session";
const OVERRIDES_PATH: &str = "/api/devices/overrides";
const ERROR_BODY_PREVIEW: usize = 200;

// ── Static source ────────────────────────────────────────────────────

/// Hands out one long-lived hub token.
pub struct StaticCredentialSource {
    hub_url: Url,
    token: SecretString,
}

impl StaticCredentialSource {
    pub fn new(hub_url: Url, token: SecretString) -> Self {
        Self { hub_url, token }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn fetch(&self) -> Result<CredentialBundle, CoreError> {
        Ok(CredentialBundle::new(
            self.hub_url.clone(),
            self.token.clone(),
        ))
    }
}

// ── Platform client ──────────────────────────────────────────────────

/// JSON client for the kiosk platform API.
pub struct PlatformClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl PlatformClient {
    /// Injects `Authorization: Bearer <kiosk secret>` as a default header.
    pub fn new(
        base_url: Url,
        kiosk_secret: &SecretString,
        transport: &TransportConfig,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", kiosk_secret.expose_secret()))
            .map_err(|e| CoreError::Config {
                message: format!("invalid kiosk secret header value: {e}"),
            })?;
        bearer.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);

        let http = transport.build_client_with_headers(headers)?;
        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    fn url(&self, path: &str) -> Result<Url, CoreError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}")).map_err(|e| CoreError::Config {
            message: format!("invalid platform URL: {e}"),
        })
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<String, CoreError> {
        let url = self.url(path)?;
        debug!(%method, %url, "platform call");

        let exchange = async {
            let resp = self.http.request(method, url).json(body).send().await?;
            let status = resp.status();
            let text = resp.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        };

        let (status, text) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| CoreError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|e| CoreError::from(hublink_api::Error::Network(e)))?;

        if status.is_success() {
            return Ok(text);
        }
        let code = status.as_u16();
        if code == 401 || code == 403 {
            return Err(CoreError::AuthFailed {
                message: format!("platform rejected the kiosk secret (HTTP {code})"),
            });
        }
        let preview: String = text.chars().take(ERROR_BODY_PREVIEW).collect();
        Err(CoreError::HttpFailure {
            status: code,
            message: format!("platform: {preview}"),
        })
    }
}

// ── Kiosk-session credentials ────────────────────────────────────────

#[derive(Deserialize)]
struct KioskSession {
    hub_url: Url,
    access_token: String,
}

/// Obtains hub credentials by opening a kiosk session on the platform.
pub struct PlatformCredentialSource {
    client: Arc<PlatformClient>,
    kiosk_id: String,
}

impl PlatformCredentialSource {
    pub fn new(client: Arc<PlatformClient>, kiosk_id: impl Into<String>) -> Self {
        Self {
            client,
            kiosk_id: kiosk_id.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for PlatformCredentialSource {
    async fn fetch(&self) -> Result<CredentialBundle, CoreError> {
        let body = self
            .client
            .send(
                Method::POST,
                KIOSK_SESSION_PATH,
                &json!({ "kiosk_id": self.kiosk_id }),
            )
            .await?;
        let session: KioskSession =
            serde_json::from_str(&body).map_err(|e| CoreError::Credential {
                message: format!("malformed kiosk session response: {e}"),
            })?;
        debug!(kiosk_id = %self.kiosk_id, hub = %session.hub_url, "kiosk session issued");
        Ok(CredentialBundle::new(
            session.hub_url,
            SecretString::from(session.access_token),
        ))
    }
}

// ── Device overrides ─────────────────────────────────────────────────

/// Display metadata the platform keeps for a commissioned entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOverride {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

/// Persists [`DeviceOverride`] records outside the hub.
#[async_trait]
pub trait OverrideStore: Send + Sync {
    async fn save(&self, record: &DeviceOverride) -> Result<(), CoreError>;
}

/// `PUT {platform}/api/devices/overrides/{entity_id}`
pub struct PlatformOverrideStore {
    client: Arc<PlatformClient>,
}

impl PlatformOverrideStore {
    pub fn new(client: Arc<PlatformClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OverrideStore for PlatformOverrideStore {
    async fn save(&self, record: &DeviceOverride) -> Result<(), CoreError> {
        let path = format!("{OVERRIDES_PATH}/{}", record.entity_id);
        self.client.send(Method::PUT, &path, record).await?;
        Ok(())
    }
}
