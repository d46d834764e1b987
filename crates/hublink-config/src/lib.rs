//! Shared configuration for hublink tools.
//!
//! TOML profiles, secret resolution (env + keyring + plaintext), keyring
//! persistence for fetched hub credentials, and translation to
//! `hublink_core::EngineConfig`. The CLI layers its flag overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use hublink_core::{
    CoreError, CredentialBundle, CredentialConfig, CredentialPersistence, EngineConfig,
    TlsVerification, TransportMode,
};

/// Keyring service name for every secret hublink stores.
pub const KEYRING_SERVICE: &str = "hublink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {secret} configured for profile '{profile}'")]
    NoCredentials { profile: String, secret: String },

    #[error("profile '{0}' not found")]
    UnknownProfile(String),

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<keyring::Error> for ConfigError {
    fn from(err: keyring::Error) -> Self {
        Self::Keyring(err.to_string())
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named hub profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.into()))
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Preferred transport: "local" or "relay".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            mode: default_mode(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_mode() -> String {
    "local".into()
}
fn default_timeout() -> u64 {
    10
}

/// A named hub profile.
///
/// Either `hub_url` plus a token, or `platform_url` plus `kiosk_id` for
/// platform-issued kiosk sessions.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Hub base URL on the local network (e.g. "http://192.168.1.20:8123").
    pub hub_url: Option<String>,

    /// Externally reachable relay URL for the same hub.
    pub relay_url: Option<String>,

    #[serde(default)]
    pub relay_enabled: bool,

    /// Override the default transport for this profile.
    pub mode: Option<String>,

    /// Hub access token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the hub token.
    pub token_env: Option<String>,

    /// Kiosk platform base URL.
    pub platform_url: Option<String>,

    pub kiosk_id: Option<String>,

    /// Kiosk secret (plaintext, prefer keyring or env var).
    pub kiosk_secret: Option<String>,

    /// Environment variable name containing the kiosk secret.
    pub kiosk_secret_env: Option<String>,

    /// Accept invalid TLS certificates.
    pub insecure: Option<bool>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Per-call timeout override in seconds.
    pub timeout: Option<u64>,

    pub credential_ttl_secs: Option<u64>,

    pub poll_interval_secs: Option<u64>,

    /// Keep a copy of fetched hub credentials in the keyring.
    #[serde(default)]
    pub persist_credentials: bool,
}

impl Profile {
    /// The profile's preferred transport, if it sets one.
    pub fn transport_mode(&self) -> Result<Option<TransportMode>, ConfigError> {
        self.mode.as_deref().map(parse_mode).transpose()
    }
}

/// Parse "local" / "relay" (case-insensitive).
pub fn parse_mode(raw: &str) -> Result<TransportMode, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Validation {
        field: "mode".into(),
        reason: format!("expected 'local' or 'relay', got '{raw}'"),
    })
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "hublink", "hublink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hublink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load defaults, then `path`, then `HUBLINK_` environment variables.
///
/// Nested keys use a double underscore:
/// `HUBLINK_PROFILES__HOME__HUB_URL`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HUBLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Secret resolution ───────────────────────────────────────────────

/// Which profile secret to resolve. Names the keyring entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    HubToken,
    KioskSecret,
}

impl SecretKind {
    fn keyring_user(self, profile_name: &str) -> String {
        match self {
            Self::HubToken => format!("{profile_name}/token"),
            Self::KioskSecret => format!("{profile_name}/kiosk-secret"),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::HubToken => "hub token",
            Self::KioskSecret => "kiosk secret",
        }
    }

    fn env_and_plaintext(self, profile: &Profile) -> (Option<&str>, Option<&str>) {
        match self {
            Self::HubToken => (profile.token_env.as_deref(), profile.token.as_deref()),
            Self::KioskSecret => (
                profile.kiosk_secret_env.as_deref(),
                profile.kiosk_secret.as_deref(),
            ),
        }
    }
}

/// Resolve a secret: named env var, then keyring, then plaintext.
pub fn resolve_secret(
    profile: &Profile,
    profile_name: &str,
    kind: SecretKind,
) -> Result<SecretString, ConfigError> {
    let (env_name, plaintext) = kind.env_and_plaintext(profile);
    let from_env = env_name.and_then(|name| std::env::var(name).ok());
    first_secret(
        from_env,
        || keyring_get(&kind.keyring_user(profile_name)),
        plaintext,
    )
    .ok_or_else(|| ConfigError::NoCredentials {
        profile: profile_name.into(),
        secret: kind.describe().into(),
    })
}

fn first_secret(
    from_env: Option<String>,
    from_keyring: impl FnOnce() -> Option<String>,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    from_env
        .filter(|v| !v.is_empty())
        .or_else(from_keyring)
        .or_else(|| plaintext.map(str::to_owned))
        .map(SecretString::from)
}

fn keyring_get(user: &str) -> Option<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, user).ok()?;
    match entry.get_password() {
        Ok(secret) => Some(secret),
        Err(e) => {
            debug!(user, error = %e, "no keyring secret");
            None
        }
    }
}

/// Store a profile secret in the system keyring.
pub fn store_secret(
    profile_name: &str,
    kind: SecretKind,
    secret: &SecretString,
) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &kind.keyring_user(profile_name))?;
    entry.set_password(secret.expose_secret())?;
    Ok(())
}

// ── Engine config ───────────────────────────────────────────────────

/// Build an `EngineConfig` from a profile, with no flag overrides.
pub fn profile_to_engine_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<EngineConfig, ConfigError> {
    let credentials = profile_credentials(profile, profile_name)?;
    engine_config_with(profile, credentials)
}

/// Credentials implied by the profile: a kiosk session when `platform_url`
/// and `kiosk_id` are set, otherwise a static hub token.
pub fn profile_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<CredentialConfig, ConfigError> {
    if let (Some(platform_url), Some(kiosk_id)) =
        (profile.platform_url.as_deref(), profile.kiosk_id.as_deref())
    {
        return Ok(CredentialConfig::Platform {
            platform_url: parse_url("platform_url", platform_url)?,
            kiosk_id: kiosk_id.to_owned(),
            kiosk_secret: resolve_secret(profile, profile_name, SecretKind::KioskSecret)?,
        });
    }
    Ok(CredentialConfig::Static {
        hub_url: profile_hub_url(profile, profile_name)?,
        token: resolve_secret(profile, profile_name, SecretKind::HubToken)?,
    })
}

pub fn profile_hub_url(profile: &Profile, profile_name: &str) -> Result<Url, ConfigError> {
    let raw = profile
        .hub_url
        .as_deref()
        .ok_or_else(|| ConfigError::Validation {
            field: "hub_url".into(),
            reason: format!("profile '{profile_name}' needs hub_url, or platform_url and kiosk_id"),
        })?;
    parse_url("hub_url", raw)
}

/// Apply the profile's relay, TLS and timing settings around `credentials`.
pub fn engine_config_with(
    profile: &Profile,
    credentials: CredentialConfig,
) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::new(credentials);
    config.relay_url = profile
        .relay_url
        .as_deref()
        .map(|raw| parse_url("relay_url", raw))
        .transpose()?;
    config.relay_enabled = profile.relay_enabled;
    config.tls = profile_tls(profile);
    if let Some(secs) = profile.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.credential_ttl_secs {
        config.credential_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.poll_interval_secs {
        config.poll_interval = Duration::from_secs(secs.max(1));
    }
    Ok(config)
}

/// TLS verification implied by the profile.
pub fn profile_tls(profile: &Profile) -> TlsVerification {
    if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    }
}

pub fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

// ── Credential persistence ──────────────────────────────────────────

#[derive(Serialize)]
struct PersistedSession<'a> {
    base_url: &'a str,
    token: &'a str,
}

/// Keeps the engine's current hub credential in the system keyring
/// under `{profile}/session`.
pub struct KeyringCredentialPersistence {
    user: String,
}

impl KeyringCredentialPersistence {
    pub fn new(profile_name: &str) -> Self {
        Self {
            user: format!("{profile_name}/session"),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, CoreError> {
        keyring::Entry::new(KEYRING_SERVICE, &self.user).map_err(|e| CoreError::Credential {
            message: format!("keyring unavailable: {e}"),
        })
    }
}

#[async_trait]
impl CredentialPersistence for KeyringCredentialPersistence {
    async fn save(&self, bundle: &CredentialBundle) -> Result<(), CoreError> {
        let record = serde_json::to_string(&PersistedSession {
            base_url: bundle.base_url.as_str(),
            token: bundle.token.expose_secret(),
        })
        .map_err(|e| CoreError::Internal(format!("encoding session record: {e}")))?;
        self.entry()?
            .set_password(&record)
            .map_err(|e| CoreError::Credential {
                message: format!("storing session in keyring: {e}"),
            })
    }

    async fn delete(&self) -> Result<(), CoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CoreError::Credential {
                message: format!("removing session from keyring: {e}"),
            }),
        }
    }
}
