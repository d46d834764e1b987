//! CLI configuration: thin wrapper around `hublink_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides (--hub,
//! --token, --mode, --insecure, --timeout).

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use hublink_config::{
    KeyringCredentialPersistence, engine_config_with, parse_mode, parse_url,
    profile_credentials, profile_hub_url,
};
use hublink_core::{
    CredentialConfig, EngineConfig, HubEngine, HubEngineBuilder, TlsVerification, TransportMode,
};

use crate::cli::{GlobalOpts, ModeArg};
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use hublink_config::{Config, Profile, config_path, load_config_or_default};

// ── Resolved settings ───────────────────────────────────────────────

/// Transport preference after flags, profile and defaults are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChoice {
    Fixed(TransportMode),
    /// Probe this mode first, then fail over.
    Auto(TransportMode),
}

impl ModeChoice {
    pub fn preferred(self) -> TransportMode {
        match self {
            Self::Fixed(mode) | Self::Auto(mode) => mode,
        }
    }
}

/// Everything a hub-bound command needs to build its engine.
pub struct Resolved {
    pub profile_name: String,
    pub engine: EngineConfig,
    pub mode: ModeChoice,
    pub persist_credentials: bool,
}

impl Resolved {
    pub fn engine_builder(&self) -> HubEngineBuilder {
        let builder = HubEngine::builder(self.engine.clone());
        if self.persist_credentials {
            builder.credential_persistence(Arc::new(KeyringCredentialPersistence::new(
                &self.profile_name,
            )))
        } else {
            builder
        }
    }
}

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Merge flags over the active profile.
///
/// Without a matching profile, `--hub` (plus a token from `--token` or the
/// keyring) is enough. An explicitly named profile must exist.
pub fn resolve(global: &GlobalOpts, config: &Config) -> Result<Resolved, CliError> {
    let profile_name = active_profile_name(global, config);

    let profile = match config.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(config),
            });
        }
        None if global.hub.is_some() => Profile::default(),
        None => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    let credentials = flag_credentials(&profile, &profile_name, global)?;
    let mut engine = engine_config_with(&profile, credentials)?;
    if global.insecure {
        engine.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout.or(profile.timeout) {
        engine.timeout = Duration::from_secs(secs);
    } else {
        engine.timeout = Duration::from_secs(config.defaults.timeout);
    }

    let mode = preferred_mode(global, &profile, config)?;
    Ok(Resolved {
        profile_name,
        engine,
        mode,
        persist_credentials: profile.persist_credentials,
    })
}

/// `--hub` / `--token` override the profile's credential source.
fn flag_credentials(
    profile: &Profile,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<CredentialConfig, CliError> {
    let hub_url = match global.hub.as_deref() {
        Some(raw) => Some(parse_url("hub", raw)?),
        None => None,
    };

    match (hub_url, global.token.as_deref()) {
        (None, None) => Ok(profile_credentials(profile, profile_name)?),
        (hub_url, token) => {
            let hub_url = match hub_url {
                Some(url) => url,
                None => profile_hub_url(profile, profile_name)?,
            };
            let token = match token {
                Some(token) => SecretString::from(token.to_owned()),
                None => hublink_config::resolve_secret(
                    profile,
                    profile_name,
                    hublink_config::SecretKind::HubToken,
                )?,
            };
            Ok(CredentialConfig::Static { hub_url, token })
        }
    }
}

/// Flag, then profile, then `[defaults].mode`.
fn preferred_mode(
    global: &GlobalOpts,
    profile: &Profile,
    config: &Config,
) -> Result<ModeChoice, CliError> {
    let configured = match profile.transport_mode()? {
        Some(mode) => mode,
        None => parse_mode(&config.defaults.mode)?,
    };
    Ok(match global.mode {
        Some(ModeArg::Local) => ModeChoice::Fixed(TransportMode::Local),
        Some(ModeArg::Relay) => ModeChoice::Fixed(TransportMode::Relay),
        Some(ModeArg::Auto) => ModeChoice::Auto(configured),
        None => ModeChoice::Fixed(configured),
    })
}

fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config
            .profiles
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}
