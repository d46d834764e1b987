// ── Transport resolution ──
//
// Turns a requested mode plus session metadata into a connection
// descriptor, applying the plaintext-only-on-private-networks policy.
// Also provides the credential refresher the REST and WebSocket clients
// call after the hub rejects a token.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use hublink_api::{ConnectionDescriptor, CredentialRefresher};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;
use url::{Host, Url};

use crate::credentials::{CredentialBundle, CredentialCache};
use crate::error::CoreError;

/// Host suffixes treated as local-network names.
const LOCAL_SUFFIXES: &[&str] = &[".local", ".lan", ".home.arpa"];

/// Which path to the hub a call takes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Direct connection on the hub's network.
    Local,
    /// Externally reachable relay for the same hub.
    Relay,
}

impl TransportMode {
    pub fn other(self) -> Self {
        match self {
            Self::Local => Self::Relay,
            Self::Relay => Self::Local,
        }
    }
}

/// Account-level transport facts, swapped atomically by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMeta {
    pub relay_url: Option<Url>,
    pub relay_enabled: bool,
}

impl SessionMeta {
    /// The relay URL, only when remote access is enabled.
    pub fn active_relay(&self) -> Option<&Url> {
        self.relay_url.as_ref().filter(|_| self.relay_enabled)
    }
}

// ── Resolver ─────────────────────────────────────────────────────────

pub struct TransportResolver {
    cache: Arc<CredentialCache>,
}

impl TransportResolver {
    pub fn new(cache: Arc<CredentialCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    /// Descriptor for `mode`, or `NotConfigured` / `PolicyRejected`.
    pub async fn resolve(
        &self,
        mode: TransportMode,
        meta: &SessionMeta,
    ) -> Result<ConnectionDescriptor, CoreError> {
        self.resolve_with(mode, meta, false).await
    }

    async fn resolve_with(
        &self,
        mode: TransportMode,
        meta: &SessionMeta,
        force_refresh: bool,
    ) -> Result<ConnectionDescriptor, CoreError> {
        let descriptor = match mode {
            TransportMode::Local => self.bundle(force_refresh).await?.descriptor(),
            TransportMode::Relay => {
                let relay = meta.active_relay().ok_or_else(|| CoreError::NotConfigured {
                    message: "remote access is not enabled for this account".into(),
                })?;
                let bundle = self.bundle(force_refresh).await?;
                ConnectionDescriptor::new(relay.clone(), bundle.token)
            }
        };
        check_transport_policy(descriptor.base_url())?;
        debug!(%mode, url = %descriptor.base_url(), "resolved transport");
        Ok(descriptor)
    }

    async fn bundle(&self, force_refresh: bool) -> Result<CredentialBundle, CoreError> {
        self.cache
            .get(force_refresh)
            .await
            .map_err(|e| CoreError::NotConfigured {
                message: format!("no hub credential available: {e}"),
            })
    }
}

// ── Security policy ──────────────────────────────────────────────────

/// Plaintext transport is allowed only to private or local hosts.
pub fn check_transport_policy(url: &Url) -> Result<(), CoreError> {
    let reject = |reason: &str| {
        Err(CoreError::PolicyRejected {
            url: url.to_string(),
            reason: reason.to_owned(),
        })
    };
    match url.scheme() {
        "https" | "wss" => Ok(()),
        "http" | "ws" => {
            if url.host().as_ref().is_some_and(is_private_host) {
                Ok(())
            } else {
                reject("plaintext is only allowed to hosts on a private network")
            }
        }
        _ => reject("unsupported scheme"),
    }
}

fn is_private_host(host: &Host<&str>) -> bool {
    match host {
        Host::Ipv4(ip) => is_private_v4(*ip),
        Host::Ipv6(ip) => is_private_v6(ip),
        Host::Domain(name) => {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            name == "localhost" || LOCAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
        }
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback() || ip.is_link_local()
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
        || ip.to_ipv4_mapped().is_some_and(is_private_v4)
}

// ── Refresher ────────────────────────────────────────────────────────

/// Force-refreshes the cache and re-resolves for the stale descriptor's mode.
pub struct ResolverRefresher {
    resolver: Arc<TransportResolver>,
    meta: Arc<ArcSwap<SessionMeta>>,
}

impl ResolverRefresher {
    pub fn new(resolver: Arc<TransportResolver>, meta: Arc<ArcSwap<SessionMeta>>) -> Self {
        Self { resolver, meta }
    }
}

#[async_trait]
impl CredentialRefresher for ResolverRefresher {
    async fn refresh(
        &self,
        stale: &ConnectionDescriptor,
    ) -> Result<ConnectionDescriptor, hublink_api::Error> {
        let meta = self.meta.load_full();
        let mode = match meta.relay_url {
            Some(ref relay)
                if stale.same_endpoint(&ConnectionDescriptor::new(
                    relay.clone(),
                    stale.token().clone(),
                )) =>
            {
                TransportMode::Relay
            }
            _ => TransportMode::Local,
        };
        debug!(%mode, "refreshing hub credential after rejection");
        self.resolver
            .resolve_with(mode, &meta, true)
            .await
            .map_err(|e| hublink_api::Error::Refresh {
                message: e.to_string(),
            })
    }
}
