// ── Hub engine ──
//
// Single entry point for consumers. Owns the credential cache, transport
// resolver, REST and WebSocket executors and the commissioner, all wired
// to one refresher so a rejected token is refreshed through the cache.

use std::sync::Arc;

use arc_swap::ArcSwap;
use hublink_api::{
    ConnectionDescriptor, CredentialRefresher, RestClient, RestRequest, RestResponse,
    TransportConfig, WsRpcClient,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commissioning::{
    Commissioner, CommissioningConfig, CommissioningRequest, CommissioningSession,
};
use crate::config::{CredentialConfig, EngineConfig};
use crate::credentials::{CredentialCache, CredentialPersistence, CredentialSource};
use crate::error::CoreError;
use crate::platform::{
    OverrideStore, PlatformClient, PlatformCredentialSource, PlatformOverrideStore,
    StaticCredentialSource,
};
use crate::registry::{HubRegistry, WsRegistry};
use crate::resolver::{ResolverRefresher, SessionMeta, TransportMode, TransportResolver};

// ── Builder ──────────────────────────────────────────────────────────

/// Assembles a [`HubEngine`], defaulting each collaborator from config.
pub struct HubEngineBuilder {
    config: EngineConfig,
    source: Option<Arc<dyn CredentialSource>>,
    persistence: Option<Arc<dyn CredentialPersistence>>,
    overrides: Option<Arc<dyn OverrideStore>>,
    registry: Option<Arc<dyn HubRegistry>>,
}

impl HubEngineBuilder {
    pub fn credential_source(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn credential_persistence(mut self, persistence: Arc<dyn CredentialPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn override_store(mut self, overrides: Arc<dyn OverrideStore>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn HubRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<HubEngine, CoreError> {
        let config = self.config;
        let transport = TransportConfig {
            tls: (&config.tls).into(),
            ..TransportConfig::default()
        };

        // Platform-issued credentials also get the platform override store.
        let mut default_overrides: Option<Arc<dyn OverrideStore>> = None;
        let default_source: Arc<dyn CredentialSource> = match config.credentials {
            CredentialConfig::Static {
                ref hub_url,
                ref token,
            } => Arc::new(StaticCredentialSource::new(hub_url.clone(), token.clone())),
            CredentialConfig::Platform {
                ref platform_url,
                ref kiosk_id,
                ref kiosk_secret,
            } => {
                let client = Arc::new(PlatformClient::new(
                    platform_url.clone(),
                    kiosk_secret,
                    &TransportConfig::default(),
                    config.timeout,
                )?);
                default_overrides = Some(Arc::new(PlatformOverrideStore::new(Arc::clone(&client))));
                Arc::new(PlatformCredentialSource::new(client, kiosk_id.clone()))
            }
        };

        let mut cache = CredentialCache::new(
            self.source.unwrap_or(default_source),
            config.credential_ttl,
        );
        if let Some(persistence) = self.persistence {
            cache = cache.with_persistence(persistence);
        }
        let cache = Arc::new(cache);

        let resolver = Arc::new(TransportResolver::new(Arc::clone(&cache)));
        let meta = Arc::new(ArcSwap::from_pointee(SessionMeta {
            relay_url: config.relay_url.clone(),
            relay_enabled: config.relay_enabled,
        }));
        let refresher: Arc<dyn CredentialRefresher> = Arc::new(ResolverRefresher::new(
            Arc::clone(&resolver),
            Arc::clone(&meta),
        ));

        let rest = RestClient::new(&transport)?.with_refresher(Arc::clone(&refresher));
        let ws = WsRpcClient::new().with_refresher(refresher);

        let registry: Arc<dyn HubRegistry> = match self.registry {
            Some(registry) => registry,
            None => Arc::new(WsRegistry::new(ws.clone(), config.timeout)),
        };
        let mut commissioner = Commissioner::new(
            rest.clone(),
            registry,
            CommissioningConfig {
                request_timeout: config.timeout,
                poll_interval: config.poll_interval,
            },
        );
        if let Some(overrides) = self.overrides.or(default_overrides) {
            commissioner = commissioner.with_override_store(overrides);
        }

        Ok(HubEngine {
            inner: Arc::new(EngineInner {
                config,
                cache,
                resolver,
                meta,
                rest,
                ws,
                commissioner,
            }),
        })
    }
}

// ── HubEngine ────────────────────────────────────────────────────────

/// Connectivity and commissioning engine for one hub.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Every call resolves a fresh
/// [`ConnectionDescriptor`] for the requested mode.
#[derive(Clone)]
pub struct HubEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    cache: Arc<CredentialCache>,
    resolver: Arc<TransportResolver>,
    meta: Arc<ArcSwap<SessionMeta>>,
    rest: RestClient,
    ws: WsRpcClient,
    commissioner: Commissioner,
}

impl HubEngine {
    pub fn builder(config: EngineConfig) -> HubEngineBuilder {
        HubEngineBuilder {
            config,
            source: None,
            persistence: None,
            overrides: None,
            registry: None,
        }
    }

    /// Build with every collaborator derived from `config`.
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The REST executor, for typed endpoint helpers.
    pub fn rest(&self) -> &RestClient {
        &self.inner.rest
    }

    /// The WebSocket client, for typed registry helpers.
    pub fn ws(&self) -> &WsRpcClient {
        &self.inner.ws
    }

    pub fn credential_cache(&self) -> &Arc<CredentialCache> {
        &self.inner.cache
    }

    // ── Transport ────────────────────────────────────────────────────

    pub async fn resolve_connection(
        &self,
        mode: TransportMode,
    ) -> Result<ConnectionDescriptor, CoreError> {
        let meta = self.inner.meta.load_full();
        self.inner.resolver.resolve(mode, &meta).await
    }

    pub async fn call_rest(
        &self,
        mode: TransportMode,
        path: &str,
        request: &RestRequest,
    ) -> Result<RestResponse, CoreError> {
        let descriptor = self.resolve_connection(mode).await?;
        Ok(self
            .inner
            .rest
            .call(&descriptor, path, request, self.inner.config.timeout)
            .await?)
    }

    pub async fn call_ws(
        &self,
        mode: TransportMode,
        method: &str,
        payload: Value,
    ) -> Result<Value, CoreError> {
        let descriptor = self.resolve_connection(mode).await?;
        Ok(self
            .inner
            .ws
            .call(&descriptor, method, payload, self.inner.config.timeout)
            .await?)
    }

    /// Whether the hub answers over `mode`. Unresolvable modes are unreachable.
    pub async fn probe_reachability(&self, mode: TransportMode) -> bool {
        match self.resolve_connection(mode).await {
            Ok(descriptor) => {
                self.inner
                    .rest
                    .probe(&descriptor, self.inner.config.probe_timeout)
                    .await
            }
            Err(e) => {
                debug!(%mode, error = %e, "probe skipped, mode does not resolve");
                false
            }
        }
    }

    /// Probe `preferred`, then the other mode; return the first that answers.
    pub async fn select_mode(&self, preferred: TransportMode) -> Result<TransportMode, CoreError> {
        for mode in [preferred, preferred.other()] {
            if self.probe_reachability(mode).await {
                if mode != preferred {
                    info!(%preferred, selected = %mode, "failing over to alternate transport");
                }
                return Ok(mode);
            }
        }
        Err(CoreError::NotConfigured {
            message: "hub is not reachable over local or relay transport".into(),
        })
    }

    // ── Commissioning ────────────────────────────────────────────────

    pub async fn start_commissioning(
        &self,
        mode: TransportMode,
        request: CommissioningRequest,
    ) -> Result<CommissioningSession, CoreError> {
        let descriptor = self.resolve_connection(mode).await?;
        self.inner.commissioner.start(&descriptor, request).await
    }

    pub async fn submit_commissioning(
        &self,
        mode: TransportMode,
        session: &mut CommissioningSession,
        input: Value,
    ) -> Result<(), CoreError> {
        let descriptor = self.resolve_connection(mode).await?;
        self.inner
            .commissioner
            .submit(&descriptor, session, input)
            .await
    }

    pub async fn poll_commissioning(
        &self,
        mode: TransportMode,
        session: &mut CommissioningSession,
    ) -> Result<(), CoreError> {
        if session.is_final {
            return Ok(());
        }
        let descriptor = self.resolve_connection(mode).await?;
        self.inner.commissioner.poll(&descriptor, session).await
    }

    /// Abort the remote flow and mark the session canceled.
    ///
    /// The session is canceled even when the transport cannot be resolved.
    pub async fn cancel_commissioning(&self, mode: TransportMode, session: &mut CommissioningSession) {
        if session.is_final {
            return;
        }
        match self.resolve_connection(mode).await {
            Ok(descriptor) => self.inner.commissioner.cancel(&descriptor, session).await,
            Err(e) => {
                warn!(session = %session.id, error = %e, "cannot reach hub to abort flow");
                session.enter(crate::commissioning::CommissioningStatus::Canceled);
            }
        }
    }

    pub async fn run_commissioning(
        &self,
        mode: TransportMode,
        session: &mut CommissioningSession,
        cancel: CancellationToken,
    ) -> Result<(), CoreError> {
        if session.is_final {
            return Ok(());
        }
        let descriptor = self.resolve_connection(mode).await?;
        self.inner
            .commissioner
            .run(&descriptor, session, cancel)
            .await
    }

    // ── Session ──────────────────────────────────────────────────────

    pub fn session_meta(&self) -> SessionMeta {
        SessionMeta::clone(&self.inner.meta.load_full())
    }

    pub fn set_session_meta(&self, meta: SessionMeta) {
        debug!(relay_enabled = meta.relay_enabled, "session metadata updated");
        self.inner.meta.store(Arc::new(meta));
    }

    /// Forget the cached credential. Later calls fetch a new one.
    pub fn sign_out(&self) {
        info!("signing out, clearing hub credential");
        self.inner.cache.clear();
    }
}
