//! One-shot WebSocket RPC against the hub.
//!
//! Every [`WsRpcClient::call`] opens a fresh socket, walks the hub's
//! handshake, sends exactly one command and waits for its result:
//!
//! ```text
//! Connecting ──auth_required──▶ Authenticating ──auth_ok──▶ Requesting ──result──▶ Completed
//!                                    │
//!                               auth_invalid
//!                                    ▼
//!                               Recovering (once) ──refresh──▶ reconnect, retry disabled
//! ```
//!
//! The whole call, including any reconnect, is bounded by a single
//! deadline. The socket is closed on every exit path: a close frame on
//! normal completion, dropping the stream on error or timeout.
//!
//! # Example
//!
//! ```rust,ignore
//! use hublink_api::{ConnectionDescriptor, WsRpcClient};
//!
//! let client = WsRpcClient::new();
//! let devices = client
//!     .call(&descriptor, "config/device_registry/list", serde_json::json!({}), timeout)
//!     .await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::auth::{ConnectionDescriptor, CredentialRefresher};
use crate::error::Error;
use crate::rest::client::timeout_ms;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// One outstanding request per socket, so the id never varies.
const REQUEST_ID: u64 = 1;

// ── Wire messages ────────────────────────────────────────────────────

/// Messages the hub sends. Anything unrecognised is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<RemoteErrorBody>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    #[serde(default)]
    code: Value,
    #[serde(default)]
    message: String,
}

/// Handshake phase of a single socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Authenticating,
    Requesting,
}

/// Outcome of one socket's worth of protocol.
enum Attempt {
    Completed(Value),
    AuthRejected(String),
}

// ── Client ───────────────────────────────────────────────────────────

/// WebSocket RPC client for the hub's command API.
///
/// Stateless between calls: no socket outlives a call.
#[derive(Clone, Default)]
pub struct WsRpcClient {
    refresher: Option<Arc<dyn CredentialRefresher>>,
}

impl WsRpcClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the strategy used after `auth_invalid`.
    pub fn with_refresher(mut self, refresher: Arc<dyn CredentialRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Send `{ id, type: method, ...payload }` and return the `result` field.
    ///
    /// `payload` must be a JSON object or `null`.
    pub async fn call(
        &self,
        descriptor: &ConnectionDescriptor,
        method: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, Error> {
        let command = build_command(method, payload)?;
        tokio::time::timeout(timeout, self.call_with_recovery(descriptor, method, &command))
            .await
            .map_err(|_| {
                debug!(method, "hub WebSocket call timed out");
                Error::Timeout {
                    timeout_ms: timeout_ms(timeout),
                }
            })?
    }

    /// Call and decode the `result` field.
    pub async fn call_typed<T: DeserializeOwned>(
        &self,
        descriptor: &ConnectionDescriptor,
        method: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<T, Error> {
        let result = self.call(descriptor, method, payload, timeout).await?;
        serde_json::from_value(result.clone()).map_err(|e| Error::Deserialization {
            message: format!("{method}: {e}"),
            body: result.to_string(),
        })
    }

    async fn call_with_recovery(
        &self,
        descriptor: &ConnectionDescriptor,
        method: &str,
        command: &Value,
    ) -> Result<Value, Error> {
        let mut current = descriptor.clone();
        let mut allow_auth_retry = true;

        loop {
            let message = match self.call_once(&current, method, command).await? {
                Attempt::Completed(result) => return Ok(result),
                Attempt::AuthRejected(message) => message,
            };

            let refresher = match (&self.refresher, allow_auth_retry) {
                (Some(refresher), true) => refresher,
                _ => return Err(Error::AuthFailed { message }),
            };

            debug!(method, "auth_invalid, refreshing credential");
            let refreshed = refresher
                .refresh(&current)
                .await
                .map_err(|e| Error::AuthFailed {
                    message: format!("{message}; credential refresh failed: {e}"),
                })?;

            if !refreshed.same_endpoint(&current) {
                warn!(
                    from = %current.base_url(),
                    to = %refreshed.base_url(),
                    "refreshed credential targets a different hub"
                );
                return Err(Error::AuthFailed {
                    message: format!("{message}; refreshed credential targets a different hub"),
                });
            }

            current = refreshed;
            allow_auth_retry = false;
        }
    }

    /// Open a socket, run the handshake and the command, close the socket.
    async fn call_once(
        &self,
        descriptor: &ConnectionDescriptor,
        method: &str,
        command: &Value,
    ) -> Result<Attempt, Error> {
        let url = descriptor.websocket_url()?;
        debug!(%url, method, "opening hub WebSocket");

        let (mut socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let outcome = exchange(&mut socket, descriptor.token(), command).await;

        if let Err(e) = socket.close(None).await {
            trace!(error = %e, "WebSocket close after call");
        }
        outcome
    }
}

// ── Protocol ─────────────────────────────────────────────────────────

fn build_command(method: &str, payload: Value) -> Result<Value, Error> {
    let mut fields = match payload {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(Error::Protocol(format!(
                "payload for {method} must be a JSON object, got {other}"
            )));
        }
    };
    fields.insert("id".into(), json!(REQUEST_ID));
    fields.insert("type".into(), json!(method));
    Ok(Value::Object(fields))
}

/// Drive one socket through the handshake, gated on [`Phase`].
async fn exchange(
    socket: &mut Socket,
    token: &SecretString,
    command: &Value,
) -> Result<Attempt, Error> {
    let mut phase = Phase::Connecting;

    loop {
        let text = next_text(socket).await?;
        let message: ServerMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                trace!(error = %e, ?phase, "unparseable WebSocket frame, skipping");
                continue;
            }
        };

        match (phase, message) {
            (Phase::Connecting, ServerMessage::AuthRequired { ha_version }) => {
                trace!(?ha_version, "auth_required");
                let auth = json!({ "type": "auth", "access_token": token.expose_secret() });
                send_json(socket, &auth).await?;
                phase = Phase::Authenticating;
            }
            (Phase::Authenticating, ServerMessage::AuthOk { .. }) => {
                send_json(socket, command).await?;
                phase = Phase::Requesting;
            }
            (Phase::Authenticating, ServerMessage::AuthInvalid { message }) => {
                return Ok(Attempt::AuthRejected(
                    message.unwrap_or_else(|| "credential rejected by hub".into()),
                ));
            }
            (
                Phase::Requesting,
                ServerMessage::Result {
                    id,
                    success,
                    result,
                    error,
                },
            ) if id == REQUEST_ID => {
                if success {
                    return Ok(Attempt::Completed(result.unwrap_or(Value::Null)));
                }
                let (code, message) = error.map_or_else(
                    || ("unknown_error".to_owned(), "command failed".to_owned()),
                    |e| (remote_code(&e.code), e.message),
                );
                return Err(Error::Remote { code, message });
            }
            (phase, other) => {
                trace!(?phase, message = ?other, "ignoring out-of-phase message");
            }
        }
    }
}

fn remote_code(code: &Value) -> String {
    match code {
        Value::String(s) => s.clone(),
        Value::Null => "unknown_error".into(),
        other => other.to_string(),
    }
}

async fn send_json(socket: &mut Socket, value: &Value) -> Result<(), Error> {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

/// Next text frame. Control frames are skipped; a close ends the call.
async fn next_text(socket: &mut Socket) -> Result<String, Error> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or_else(
                    || (1005, String::from("no close frame payload")),
                    |cf| (u16::from(cf.code), cf.reason.to_string()),
                );
                return Err(Error::WebSocketClosed { code, reason });
            }
            Some(Ok(_)) => {
                // Ping/Pong/Binary: tungstenite answers pings itself
                trace!("skipping non-text frame");
            }
            Some(Err(tungstenite::Error::ConnectionClosed)) | None => {
                return Err(Error::WebSocketClosed {
                    code: 1006,
                    reason: "stream ended".into(),
                });
            }
            Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
        }
    }
}
