use async_trait::async_trait;
use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;

/// WebSocket endpoint path, relative to the hub base URL.
const WEBSOCKET_PATH: &str = "/api/websocket";

/// Where to reach a hub and which credential to present.
///
/// Constructed per logical operation and never persisted. The token is
/// redacted from `Debug` output by [`SecretString`].
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    base_url: Url,
    token: SecretString,
}

impl ConnectionDescriptor {
    pub fn new(base_url: Url, token: SecretString) -> Self {
        Self { base_url, token }
    }

    /// The hub root (e.g. `http://192.168.1.20:8123` or a relay URL).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The bearer credential.
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// Whether `other` targets the same hub endpoint as `self`.
    ///
    /// Compares scheme, host, effective port and path (ignoring a trailing
    /// slash). Credentials are not compared.
    pub fn same_endpoint(&self, other: &Self) -> bool {
        let (a, b) = (&self.base_url, &other.base_url);
        a.scheme() == b.scheme()
            && a.host_str() == b.host_str()
            && a.port_or_known_default() == b.port_or_known_default()
            && a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
    }

    /// Build a full URL for an API path such as `/api/states`.
    ///
    /// The path is appended to the base URL (rather than resolved against
    /// it) so relay URLs with a path prefix keep that prefix.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let full = if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };
        Ok(Url::parse(&full)?)
    }

    /// The WebSocket URL for this hub: `ws(s)://host[:port][/prefix]/api/websocket`.
    pub fn websocket_url(&self) -> Result<Url, Error> {
        let mut url = self.endpoint(WEBSOCKET_PATH)?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(Error::WebSocketConnect(format!(
                    "unsupported scheme '{other}' for WebSocket"
                )));
            }
        };
        url.set_scheme(scheme).map_err(|()| {
            Error::WebSocketConnect(format!("cannot switch {} to {scheme}", self.base_url))
        })?;
        Ok(url)
    }

    /// `Authorization` header value, marked sensitive so it is never logged.
    pub(crate) fn bearer(&self) -> Result<HeaderValue, Error> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token.expose_secret()))
            .map_err(|e| Error::AuthFailed {
                message: format!("invalid token header value: {e}"),
            })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

/// Strategy for obtaining a fresh credential after the hub rejected one.
///
/// Injected into [`RestClient`](crate::RestClient) and
/// [`WsRpcClient`](crate::WsRpcClient) at construction. Implementations must
/// bypass any cache TTL: the caller has just observed the credential fail.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    /// Produce a replacement for `stale`.
    ///
    /// If the returned descriptor targets a different endpoint the caller
    /// abandons the call instead of following it.
    async fn refresh(&self, stale: &ConnectionDescriptor) -> Result<ConnectionDescriptor, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(url: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::new(
            Url::parse(url).expect("valid test URL"),
            SecretString::from("token".to_string()),
        )
    }

    #[test]
    fn endpoint_keeps_relay_prefix() {
        let d = descriptor("https://relay.example.com/hub/abc/");
        let url = d.endpoint("/api/states").expect("endpoint");
        assert_eq!(url.as_str(), "https://relay.example.com/hub/abc/api/states");
    }

    #[test]
    fn websocket_url_switches_scheme() {
        let local = descriptor("http://192.168.1.20:8123");
        assert_eq!(
            local.websocket_url().expect("ws url").as_str(),
            "ws://192.168.1.20:8123/api/websocket"
        );

        let relay = descriptor("https://relay.example.com");
        assert_eq!(
            relay.websocket_url().expect("wss url").as_str(),
            "wss://relay.example.com/api/websocket"
        );
    }

    #[test]
    fn same_endpoint_ignores_token_and_trailing_slash() {
        let a = descriptor("https://hub.lan:8123/");
        let b = ConnectionDescriptor::new(
            Url::parse("https://hub.lan:8123").expect("valid"),
            SecretString::from("other".to_string()),
        );
        assert!(a.same_endpoint(&b));
        assert!(!a.same_endpoint(&descriptor("https://hub.lan:8124")));
        assert!(!a.same_endpoint(&descriptor("http://hub.lan:8123")));
    }

    #[test]
    fn debug_output_redacts_token() {
        let d = ConnectionDescriptor::new(
            Url::parse("https://hub.lan").expect("valid"),
            SecretString::from("s3cr3t-value".to_string()),
        );
        let rendered = format!("{d:?}");
        assert!(!rendered.contains("s3cr3t-value"), "token leaked: {rendered}");
        assert!(rendered.contains("REDACTED"));
    }
}
