//! Reference registry cache.
//!
//! Small lookup tables (providers, actors) used to turn foreign-key cells into
//! readable labels. Every cell of every table needs them, so they are loaded
//! once per cache generation and shared:
//!
//! - Concurrent callers before the first load completes await one shared
//!   in-flight load.
//! - Callers after it completes get the cached value.
//! - [`RegistryCache::clear`] drops both the value and any in-flight load.
//! - A failed load rejects its waiters and is not cached.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};

use tessera_core::{ActorId, ProviderId, Result};

/// A provider assets are scanned from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Provider id.
    pub id: ProviderId,
    /// Display name.
    pub name: String,
    /// Provider implementation (e.g. `filesystem`).
    #[serde(default)]
    pub kind: Option<String>,
}

/// An actor (user or automation) that authored changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Actor id.
    pub id: ActorId,
    /// Display name.
    pub name: String,
}

/// Kinds of reference entity a foreign-key column can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// [`Provider`].
    Provider,
    /// [`Actor`].
    Actor,
}

impl EntityKind {
    /// Path segment of the entity's detail page.
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Provider => "providers",
            Self::Actor => "actors",
        }
    }
}

/// All reference tables, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryData {
    /// Providers by id.
    pub providers: BTreeMap<ProviderId, Provider>,
    /// Actors by id.
    pub actors: BTreeMap<ActorId, Actor>,
}

impl RegistryData {
    /// Indexes entity listings by id.
    #[must_use]
    pub fn from_lists(providers: Vec<Provider>, actors: Vec<Actor>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.id, p)).collect(),
            actors: actors.into_iter().map(|a| (a.id, a)).collect(),
        }
    }

    /// Display name for a raw foreign id.
    #[must_use]
    pub fn label(&self, kind: EntityKind, raw_id: i64) -> Option<&str> {
        match kind {
            EntityKind::Provider => self
                .providers
                .get(&ProviderId::new(raw_id))
                .map(|p| p.name.as_str()),
            EntityKind::Actor => self
                .actors
                .get(&ActorId::new(raw_id))
                .map(|a| a.name.as_str()),
        }
    }
}

/// Loads reference tables from the backend.
#[async_trait]
pub trait RegistryLoader: Send + Sync {
    /// Fetches every reference table.
    async fn load_registry(&self) -> Result<RegistryData>;
}

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<RegistryData>>>>;

enum Slot {
    Empty,
    Loading {
        generation: u64,
        future: LoadFuture,
    },
    Ready(Arc<RegistryData>),
}

struct CacheState {
    slot: Slot,
    generation: u64,
}

/// Single-flight cache over a [`RegistryLoader`].
///
/// Construct one per application and hand out `Arc<RegistryCache>` handles.
pub struct RegistryCache {
    loader: Arc<dyn RegistryLoader>,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for RegistryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCache")
            .field("cached", &self.cached().is_some())
            .finish_non_exhaustive()
    }
}

impl RegistryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(loader: Arc<dyn RegistryLoader>) -> Self {
        Self {
            loader,
            state: Mutex::new(CacheState {
                slot: Slot::Empty,
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the registry, loading it if this generation has none yet.
    ///
    /// # Errors
    ///
    /// Returns the loader's error to every caller that joined the failed load.
    pub async fn get(&self) -> Result<Arc<RegistryData>> {
        let (generation, future) = {
            let mut state = self.lock();
            match &state.slot {
                Slot::Ready(data) => return Ok(Arc::clone(data)),
                Slot::Loading { generation, future } => (*generation, future.clone()),
                Slot::Empty => {
                    let loader = Arc::clone(&self.loader);
                    let generation = state.generation;
                    tracing::debug!(generation, "loading reference registry");
                    let future = async move { loader.load_registry().await.map(Arc::new) }
                        .boxed()
                        .shared();
                    state.slot = Slot::Loading {
                        generation,
                        future: future.clone(),
                    };
                    (generation, future)
                }
            }
        };

        let result = future.await;

        let mut state = self.lock();
        let still_current = state.generation == generation
            && matches!(&state.slot, Slot::Loading { generation: g, .. } if *g == generation);
        if still_current {
            state.slot = match &result {
                Ok(data) => Slot::Ready(Arc::clone(data)),
                Err(err) => {
                    tracing::warn!(error = %err, "reference registry load failed");
                    Slot::Empty
                }
            };
        }
        drop(state);

        result
    }

    /// The cached registry, without loading.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<RegistryData>> {
        match &self.lock().slot {
            Slot::Ready(data) => Some(Arc::clone(data)),
            Slot::Empty | Slot::Loading { .. } => None,
        }
    }

    /// Forgets the cached value and any in-flight load.
    ///
    /// Waiters already attached to an in-flight load still receive its
    /// result, but it is not stored.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.slot = Slot::Empty;
        tracing::debug!(generation = state.generation, "reference registry cleared");
    }
}
