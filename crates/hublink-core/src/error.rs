// ── Core error types ──
//
// User-facing errors from hublink-core. Consumers see a transport mode's
// failure class, not reqwest or tungstenite internals. The
// `From<hublink_api::Error>` impl folds transport-layer errors into this
// taxonomy.

use thiserror::Error;

/// Unified error type for the engine.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Resolution errors ────────────────────────────────────────────
    /// The requested transport has no usable endpoint or credential.
    #[error("Not configured: {message}")]
    NotConfigured { message: String },

    /// The endpoint violates the transport security policy.
    #[error("Refusing insecure transport to {url}: {reason}")]
    PolicyRejected { url: String, reason: String },

    // ── Call errors ──────────────────────────────────────────────────
    /// No response from the hub: DNS, refused connection, TLS, socket loss.
    #[error("Cannot reach hub: {reason}")]
    NetworkFailure { reason: String },

    /// The hub answered with a non-2xx status.
    #[error("Hub returned HTTP {status}: {message}")]
    HttpFailure { status: u16, message: String },

    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("Hub call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The hub reported a logical failure for a WebSocket command.
    #[error("Hub rejected command ({code}): {message}")]
    RemoteError { code: String, message: String },

    // ── Commissioning outcomes ───────────────────────────────────────
    /// Commissioning succeeded but some finalization steps did not.
    #[error("Commissioning succeeded with {} warning(s)", .warnings.len())]
    PartialFailure { warnings: Vec<String> },

    #[error("Commissioning failed: {message}")]
    CommissioningFailed { message: String },

    #[error("Commissioning canceled")]
    Canceled,

    // ── Collaborator errors ──────────────────────────────────────────
    /// A credential source or persistence backend failed.
    #[error("Credential error: {message}")]
    Credential { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// No response was received, so a different transport may fare better.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. } | Self::Timeout { .. })
    }

    /// Worth retrying on the next poll tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkFailure { .. } | Self::Timeout { .. } => true,
            Self::HttpFailure { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        match self {
            Self::AuthFailed { .. } => true,
            Self::HttpFailure { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hublink_api::Error> for CoreError {
    fn from(err: hublink_api::Error) -> Self {
        match err {
            hublink_api::Error::AuthFailed { message } => CoreError::AuthFailed { message },
            hublink_api::Error::Refresh { message } => CoreError::Credential { message },
            hublink_api::Error::Network(ref e) => CoreError::NetworkFailure {
                reason: e.to_string(),
            },
            hublink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            hublink_api::Error::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            hublink_api::Error::Tls(message) => CoreError::Config {
                message: format!("TLS setup failed: {message}"),
            },
            hublink_api::Error::Http { status, message } => {
                CoreError::HttpFailure { status, message }
            }
            hublink_api::Error::WebSocketConnect(reason) => CoreError::NetworkFailure {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            hublink_api::Error::WebSocketClosed { code, reason } => CoreError::NetworkFailure {
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            hublink_api::Error::Protocol(message) => {
                CoreError::Internal(format!("WebSocket protocol error: {message}"))
            }
            hublink_api::Error::Remote { code, message } => {
                CoreError::RemoteError { code, message }
            }
            hublink_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Unexpected hub response: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_map_to_taxonomy() {
        let http: CoreError = hublink_api::Error::Http {
            status: 403,
            message: "Forbidden".into(),
        }
        .into();
        assert!(matches!(http, CoreError::HttpFailure { status: 403, .. }));
        assert!(http.is_auth());

        let remote: CoreError = hublink_api::Error::Remote {
            code: "not_found".into(),
            message: "gone".into(),
        }
        .into();
        assert!(matches!(remote, CoreError::RemoteError { ref code, .. } if code == "not_found"));

        let closed: CoreError = hublink_api::Error::WebSocketClosed {
            code: 1006,
            reason: "stream ended".into(),
        }
        .into();
        assert!(closed.is_network());
    }

    #[test]
    fn partial_failure_counts_warnings() {
        let err = CoreError::PartialFailure {
            warnings: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "Commissioning succeeded with 2 warning(s)");
    }
}
