// ── Runtime engine configuration ──
//
// These types describe *how* to reach a hub and where credentials come
// from. They carry secrets and tuning, but never touch disk: the CLI
// builds an `EngineConfig` from its profile and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use hublink_api::TlsMode;
use secrecy::SecretString;
use url::Url;

/// Where the engine obtains hub credentials.
#[derive(Debug, Clone)]
pub enum CredentialConfig {
    /// A long-lived hub access token.
    Static { hub_url: Url, token: SecretString },
    /// Kiosk-session issuance from the platform API.
    Platform {
        platform_url: Url,
        kiosk_id: String,
        kiosk_secret: SecretString,
    },
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed hubs on the local network).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// Configuration for one engine instance.
///
/// Built by the CLI, passed to [`HubEngine`](crate::HubEngine). Core never
/// reads config files.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub credentials: CredentialConfig,
    /// Externally reachable relay for the same hub.
    pub relay_url: Option<Url>,
    pub relay_enabled: bool,
    pub tls: TlsVerification,
    /// Deadline for a single REST or WebSocket call.
    pub timeout: Duration,
    /// Deadline for a reachability probe.
    pub probe_timeout: Duration,
    /// How long a fetched credential is reused.
    pub credential_ttl: Duration,
    /// Commissioning poll interval.
    pub poll_interval: Duration,
}

impl EngineConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
    pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(15 * 60);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

    pub fn new(credentials: CredentialConfig) -> Self {
        Self {
            credentials,
            relay_url: None,
            relay_enabled: false,
            tls: TlsVerification::default(),
            timeout: Self::DEFAULT_TIMEOUT,
            probe_timeout: Self::DEFAULT_PROBE_TIMEOUT,
            credential_ttl: Self::DEFAULT_CREDENTIAL_TTL,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Shorthand for a static token against a local hub.
    pub fn with_static_token(hub_url: Url, token: SecretString) -> Self {
        Self::new(CredentialConfig::Static { hub_url, token })
    }
}
