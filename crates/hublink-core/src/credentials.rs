// ── Credential cache ──
//
// Holds the current hub credential bundle with TTL reuse and
// single-flight fetching. Concurrent callers during a fetch await the
// same shared future; `clear()` invalidates in-flight fetches by bumping
// a generation counter so their results are never written back.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use hublink_api::ConnectionDescriptor;
use secrecy::SecretString;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::error::CoreError;

/// Hub endpoint plus bearer token, as issued by a [`CredentialSource`].
///
/// Replaced wholesale on refresh, never partially updated.
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    pub base_url: Url,
    pub token: SecretString,
    pub fetched_at: Instant,
}

impl CredentialBundle {
    pub fn new(base_url: Url, token: SecretString) -> Self {
        Self {
            base_url,
            token,
            fetched_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::new(self.base_url.clone(), self.token.clone())
    }
}

/// Produces fresh credential bundles.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self) -> Result<CredentialBundle, CoreError>;
}

/// Durable copy of the current bundle, written after each fetch.
#[async_trait]
pub trait CredentialPersistence: Send + Sync {
    async fn save(&self, bundle: &CredentialBundle) -> Result<(), CoreError>;
    async fn delete(&self) -> Result<(), CoreError>;
}

type SharedFetch = Shared<BoxFuture<'static, Result<CredentialBundle, Arc<CoreError>>>>;

struct InFlight {
    id: u64,
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct CacheState {
    current: Option<CredentialBundle>,
    in_flight: Option<InFlight>,
    /// Bumped by `clear()`; fetches from older generations are discarded.
    generation: u64,
    next_fetch: u64,
    /// Highest fetch id whose result was written back.
    settled_fetch: u64,
}

/// TTL cache over a [`CredentialSource`], scoped to one engine.
pub struct CredentialCache {
    source: Arc<dyn CredentialSource>,
    persistence: Option<Arc<dyn CredentialPersistence>>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl CredentialCache {
    pub fn new(source: Arc<dyn CredentialSource>, ttl: Duration) -> Self {
        Self {
            source,
            persistence: None,
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn CredentialPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached bundle, if any, without fetching.
    pub fn peek(&self) -> Option<CredentialBundle> {
        self.lock().current.clone()
    }

    /// Return a bundle, fetching when empty, expired or `force_refresh`.
    ///
    /// A fetch already in flight is joined rather than duplicated, even
    /// when `force_refresh` is set. On failure the cache is left empty.
    pub async fn get(&self, force_refresh: bool) -> Result<CredentialBundle, CoreError> {
        let (id, generation, fetch) = {
            let mut state = self.lock();

            if !force_refresh {
                if let Some(bundle) = state.current.as_ref().filter(|b| b.age() < self.ttl) {
                    return Ok(bundle.clone());
                }
            }

            if let Some(ref in_flight) = state.in_flight {
                debug!(fetch = in_flight.id, "joining in-flight credential fetch");
                (in_flight.id, in_flight.generation, in_flight.fetch.clone())
            } else {
                state.next_fetch += 1;
                let id = state.next_fetch;
                let source = Arc::clone(&self.source);
                let fetch = async move { source.fetch().await.map_err(Arc::new) }
                    .boxed()
                    .shared();
                debug!(fetch = id, force_refresh, "fetching hub credential");
                state.in_flight = Some(InFlight {
                    id,
                    generation: state.generation,
                    fetch: fetch.clone(),
                });
                (id, state.generation, fetch)
            }
        };

        let result = fetch.await;

        let settled = {
            let mut state = self.lock();
            if state.in_flight.as_ref().is_some_and(|f| f.id == id) {
                state.in_flight = None;
            }
            let settle = generation == state.generation && id > state.settled_fetch;
            if settle {
                state.settled_fetch = id;
                state.current = result.as_ref().ok().cloned();
            }
            settle
        };

        match result {
            Ok(bundle) => {
                if settled {
                    self.persist(&bundle).await;
                }
                Ok(bundle)
            }
            Err(e) => Err(CoreError::Credential {
                message: e.to_string(),
            }),
        }
    }

    /// Drop the cached bundle and invalidate any in-flight fetch.
    ///
    /// The persisted copy is deleted in the background when a runtime is
    /// available.
    pub fn clear(&self) {
        {
            let mut state = self.lock();
            state.generation += 1;
            state.current = None;
            state.in_flight = None;
        }
        debug!("credential cache cleared");

        let Some(persistence) = self.persistence.clone() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = persistence.delete().await {
                        warn!(error = %e, "failed to delete persisted credential");
                    }
                });
            }
            Err(_) => debug!("no async runtime, persisted credential left in place"),
        }
    }

    async fn persist(&self, bundle: &CredentialBundle) {
        if let Some(ref persistence) = self.persistence {
            if let Err(e) = persistence.save(bundle).await {
                warn!(error = %e, "failed to persist hub credential");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
