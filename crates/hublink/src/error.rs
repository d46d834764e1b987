//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and distinct exit codes.

use miette::Diagnostic;
use thiserror::Error;

use hublink_config::ConfigError;
use hublink_core::{CoreError, TransportMode};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const POLICY: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const PARTIAL: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the hub: {reason}")]
    #[diagnostic(code(hublink::connection_failed))]
    ConnectionFailed {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(hublink::not_configured))]
    NotConfigured {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Refusing to connect to {url}: {reason}")]
    #[diagnostic(
        code(hublink::policy_rejected),
        help("Use an https:// URL, or a hub address on your local network.")
    )]
    PolicyRejected { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(hublink::auth_failed),
        help(
            "The hub or platform rejected the credential.\n\
             Store a fresh token with: hublink config set-token --profile {profile}"
        )
    )]
    AuthFailed { message: String, profile: String },

    #[error("{message}")]
    #[diagnostic(
        code(hublink::no_credentials),
        help(
            "Pass --token, set HUBLINK_TOKEN, or store one with:\n  \
             hublink config set-token --profile {profile}"
        )
    )]
    NoCredentials { message: String, profile: String },

    // ── Hub responses ────────────────────────────────────────────────
    #[error("{resource} '{identifier}' not found")]
    #[diagnostic(code(hublink::not_found), help("Run: hublink {list_command}"))]
    NotFound {
        resource: String,
        identifier: String,
        list_command: String,
    },

    #[error("Hub returned HTTP {status}: {message}")]
    #[diagnostic(code(hublink::http_error))]
    Http { status: u16, message: String },

    #[error("Hub rejected command ({code}): {message}")]
    #[diagnostic(code(hublink::remote_error))]
    Remote { code: String, message: String },

    #[error("Request timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(hublink::timeout),
        help("Increase the timeout with --timeout, or check the hub is responsive.")
    )]
    Timeout { timeout_ms: u64 },

    // ── Commissioning ────────────────────────────────────────────────
    #[error("Commissioning succeeded with {} warning(s)", .warnings.len())]
    #[diagnostic(code(hublink::partial_failure))]
    PartialFailure {
        warnings: Vec<String>,
        #[help]
        details: String,
    },

    #[error("Commissioning failed: {message}")]
    #[diagnostic(code(hublink::commissioning_failed))]
    CommissioningFailed { message: String },

    #[error("Commissioning flow is waiting for input")]
    #[diagnostic(
        code(hublink::needs_input),
        help("Supply the fields with --input: {fields}")
    )]
    NeedsInput { fields: String },

    #[error("Commissioning canceled")]
    #[diagnostic(code(hublink::canceled))]
    Canceled,

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hublink::validation))]
    Validation { field: String, reason: String },

    #[error("No hub configured")]
    #[diagnostic(
        code(hublink::no_config),
        help(
            "Pass --hub and --token, or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(code(hublink::profile_not_found), help("Available profiles: {available}"))]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(hublink::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(hublink::json))]
    Json(#[from] serde_json::Error),

    #[error("Could not render YAML: {0}")]
    #[diagnostic(code(hublink::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(hublink::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::PolicyRejected { .. } => exit_code::POLICY,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::PartialFailure { .. } => exit_code::PARTIAL,
            Self::Validation { .. } | Self::NeedsInput { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach transport-specific help and the active profile name.
    pub fn in_context(self, mode: TransportMode, profile: &str) -> Self {
        match self {
            Self::ConnectionFailed { reason, help: None } => Self::ConnectionFailed {
                reason,
                help: Some(match mode {
                    TransportMode::Local => {
                        "Check you are on the same network as the hub, or try --mode relay.".into()
                    }
                    TransportMode::Relay => {
                        "Check your internet connection and the profile's relay_url.".into()
                    }
                }),
            },
            Self::NotConfigured { message, help: None } => Self::NotConfigured {
                help: Some(match mode {
                    TransportMode::Relay => {
                        "Remote access is not enabled for this account. Use --mode local on the hub's network.".into()
                    }
                    TransportMode::Local => {
                        "Configure hub_url (or platform_url and kiosk_id) in your profile.".into()
                    }
                }),
                message,
            },
            Self::AuthFailed { message, .. } => Self::AuthFailed {
                message,
                profile: profile.into(),
            },
            Self::NoCredentials { message, .. } => Self::NoCredentials {
                message,
                profile: profile.into(),
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotConfigured { message } => Self::NotConfigured {
                message,
                help: None,
            },
            CoreError::PolicyRejected { url, reason } => Self::PolicyRejected { url, reason },
            CoreError::NetworkFailure { reason } => Self::ConnectionFailed { reason, help: None },
            CoreError::HttpFailure { status, message } if status == 401 || status == 403 => {
                Self::AuthFailed {
                    message: format!("HTTP {status}: {message}"),
                    profile: "default".into(),
                }
            }
            CoreError::HttpFailure { status, message } => Self::Http { status, message },
            CoreError::AuthFailed { message } => Self::AuthFailed {
                message,
                profile: "default".into(),
            },
            CoreError::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            CoreError::RemoteError { code, message } => Self::Remote { code, message },
            CoreError::PartialFailure { warnings } => Self::PartialFailure {
                details: warnings.join("\n"),
                warnings,
            },
            CoreError::CommissioningFailed { message } => Self::CommissioningFailed { message },
            CoreError::Canceled => Self::Canceled,
            CoreError::Credential { message } => Self::NoCredentials {
                message,
                profile: "default".into(),
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { profile, secret } => Self::NoCredentials {
                message: format!("No {secret} configured for profile '{profile}'"),
                profile,
            },
            other => Self::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::NetworkFailure { reason: "refused".into() },
                exit_code::CONNECTION,
            ),
            (
                CoreError::PolicyRejected {
                    url: "http://hub.example.com".into(),
                    reason: "plaintext".into(),
                },
                exit_code::POLICY,
            ),
            (
                CoreError::HttpFailure {
                    status: 401,
                    message: "Unauthorized".into(),
                },
                exit_code::AUTH,
            ),
            (CoreError::Timeout { timeout_ms: 500 }, exit_code::TIMEOUT),
            (
                CoreError::PartialFailure {
                    warnings: vec!["label".into()],
                },
                exit_code::PARTIAL,
            ),
            (CoreError::Canceled, exit_code::GENERAL),
        ];
        for (core, code) in cases {
            let label = core.to_string();
            assert_eq!(CliError::from(core).exit_code(), code, "{label}");
        }
    }

    #[test]
    fn relay_not_configured_explains_remote_access() {
        let err = CliError::from(CoreError::NotConfigured {
            message: "remote access is not enabled for this account".into(),
        })
        .in_context(TransportMode::Relay, "home");
        let help = err.help().map(|h| h.to_string()).unwrap_or_default();
        assert!(help.contains("Remote access is not enabled"), "{help}");
    }

    #[test]
    fn local_network_failure_suggests_same_network() {
        let err = CliError::from(CoreError::NetworkFailure {
            reason: "connection refused".into(),
        })
        .in_context(TransportMode::Local, "home");
        let help = err.help().map(|h| h.to_string()).unwrap_or_default();
        assert!(help.contains("same network as the hub"), "{help}");
    }

    #[test]
    fn auth_failure_names_the_profile() {
        let err = CliError::from(CoreError::AuthFailed {
            message: "rejected".into(),
        })
        .in_context(TransportMode::Local, "lobby");
        let help = err.help().map(|h| h.to_string()).unwrap_or_default();
        assert!(help.contains("--profile lobby"), "{help}");
    }
}
