use thiserror::Error;

/// Top-level error type for the `hublink-api` crate.
///
/// Covers every failure mode of the hub transport layer: authentication,
/// network, HTTP, and the WebSocket RPC protocol. `hublink-core` maps these
/// into the engine's error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The hub rejected the credential and a refresh did not resolve it.
    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    /// A credential refresher could not produce a new credential.
    #[error("Credential refresh failed: {message}")]
    Refresh { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// No response at all: DNS failure, refused connection, TLS failure.
    #[error("Network failure: {0}")]
    Network(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The caller-supplied deadline elapsed before the call completed.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// TLS setup error (bad CA file, client build failure).
    #[error("TLS error: {0}")]
    Tls(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// Non-2xx response after the retry policy was exhausted.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection or I/O failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed before the call completed.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The hub sent something the handshake did not expect.
    #[error("WebSocket protocol error: {0}")]
    Protocol(String),

    /// The hub reported a logical failure for a command.
    #[error("Hub error ({code}): {message}")]
    Remote { code: String, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if no response was received from the hub at all.
    ///
    /// Callers use this to offer transport-specific guidance such as
    /// "check you are on the same network".
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::WebSocketConnect(_) | Self::WebSocketClosed { .. }
        )
    }

    /// Returns `true` if the hub answered, whatever the answer was.
    pub fn is_hub_response(&self) -> bool {
        matches!(
            self,
            Self::Http { .. }
                | Self::AuthFailed { .. }
                | Self::Remote { .. }
                | Self::Deserialization { .. }
        )
    }

    /// Returns `true` if this is an authorization rejection.
    pub fn is_auth_rejection(&self) -> bool {
        match self {
            Self::AuthFailed { .. } => true,
            Self::Http { status, .. } => is_auth_status(*status),
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// 401 and 403 are the only statuses that trigger a credential refresh.
pub(crate) fn is_auth_status(status: u16) -> bool {
    status == 401 || status == 403
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_are_rejections() {
        for status in [401, 403] {
            let err = Error::Http {
                status,
                message: String::new(),
            };
            assert!(err.is_auth_rejection());
            assert!(err.is_hub_response());
            assert!(!err.is_network());
        }

        let not_found = Error::Http {
            status: 404,
            message: String::new(),
        };
        assert!(!not_found.is_auth_rejection());
    }

    #[test]
    fn timeout_is_neither_response_nor_network() {
        let err = Error::Timeout { timeout_ms: 500 };
        assert!(!err.is_hub_response());
        assert!(!err.is_network());
        assert!(err.is_transient());
    }
}
