use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::endpoint_family::EndpointFamily;
use crate::helpers::time::get_instant;
use crate::observability::metrics::get_metrics;

pub const CACHE_KIND: &str = "in-memory";

/// (endpoint, normalized params). Params are kept as sorted pairs rather than a
/// joined string so values containing `&` or `=` cannot collide.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub family: EndpointFamily,
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(path: &str, params: &BTreeMap<String, String>) -> Self {
        Self {
            family: EndpointFamily::classify(path),
            path: path.to_owned(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheStatus {
    #[serde(rename = "type")]
    pub kind: String,
    /// seconds, per family
    pub ttl: BTreeMap<EndpointFamily, u64>,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// bumped on every invalidation of a family
    epochs: HashMap<EndpointFamily, u64>,
}

/// Read-through cache for GET responses, shared by all in-flight requests.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    inner: Arc<RwLock<CacheState>>,
    ttls: Arc<HashMap<EndpointFamily, Duration>>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

impl ResponseCache {
    pub fn new(ttl_overrides_secs: &HashMap<EndpointFamily, u64>) -> Self {
        let ttls = EndpointFamily::ALL
            .iter()
            .map(|family| {
                let ttl = ttl_overrides_secs
                    .get(family)
                    .map(|secs| Duration::from_secs(*secs))
                    .unwrap_or_else(|| family.default_ttl());
                (*family, ttl)
            })
            .collect();
        Self {
            inner: Arc::new(RwLock::new(CacheState::default())),
            ttls: Arc::new(ttls),
        }
    }

    pub fn ttl_for(&self, family: EndpointFamily) -> Duration {
        self.ttls
            .get(&family)
            .copied()
            .unwrap_or_else(|| family.default_ttl())
    }

    /// Fresh payload or `None`. Expired entries are never returned.
    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        let state = self.inner.read().await;
        let now = get_instant();
        let hit = state
            .entries
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value.clone());

        let result = if hit.is_some() { "hit" } else { "miss" };
        get_metrics()
            .await
            .cache_lookups
            .with_label_values(&[key.family.as_str(), result])
            .inc();
        debug!("cache {} for '{}' {:?}", result, key.path, key.params);
        hit
    }

    pub async fn put(&self, key: CacheKey, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let mut state = self.inner.write().await;
        Self::insert_locked(&mut state, key, value, ttl).await;
    }

    /// Current invalidation epoch of a family; pair with [`Self::put_if_current`].
    pub async fn epoch(&self, family: EndpointFamily) -> u64 {
        self.inner
            .read()
            .await
            .epochs
            .get(&family)
            .copied()
            .unwrap_or(0)
    }

    /// Stores the payload only if the family was not invalidated since `epoch`
    /// was read, so a read racing a mutation cannot write back stale data.
    pub async fn put_if_current(&self, key: CacheKey, value: Value, ttl: Duration, epoch: u64) -> bool {
        if ttl.is_zero() {
            return false;
        }
        let mut state = self.inner.write().await;
        let current = state.epochs.get(&key.family).copied().unwrap_or(0);
        if current != epoch {
            debug!(
                "skip caching '{}': family '{}' invalidated meanwhile",
                key.path, key.family
            );
            return false;
        }
        Self::insert_locked(&mut state, key, value, ttl).await;
        true
    }

    /// Drop every entry matching the predicate, returns how many were removed.
    ///
    /// The predicate may also match keys that are not cached yet but are being
    /// fetched, so every family epoch moves and no in-flight read is written back.
    pub async fn invalidate<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CacheKey) -> bool,
    {
        let mut state = self.inner.write().await;
        for family in EndpointFamily::ALL {
            *state.epochs.entry(family).or_insert(0) += 1;
        }
        let before = state.entries.len();
        state.entries.retain(|key, _| !predicate(key));
        let removed = before - state.entries.len();
        get_metrics().await.cached_entries.set(state.entries.len() as i64);
        removed
    }

    /// Coarse invalidation used after successful mutations.
    pub async fn invalidate_families(&self, families: &[EndpointFamily]) -> usize {
        let mut state = self.inner.write().await;
        for family in families {
            *state.epochs.entry(*family).or_insert(0) += 1;
        }
        let before = state.entries.len();
        state.entries.retain(|key, _| !families.contains(&key.family));
        let removed = before - state.entries.len();

        let metrics = get_metrics().await;
        metrics.cached_entries.set(state.entries.len() as i64);
        for family in families {
            metrics
                .cache_invalidations
                .with_label_values(&[family.as_str()])
                .inc();
        }
        debug!("invalidated {} entries of families {:?}", removed, families);
        removed
    }

    pub async fn clear(&self) {
        let mut state = self.inner.write().await;
        state.entries.clear();
        for family in EndpointFamily::ALL {
            *state.epochs.entry(family).or_insert(0) += 1;
        }
        get_metrics().await.cached_entries.set(0);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn status(&self) -> CacheStatus {
        CacheStatus {
            kind: CACHE_KIND.to_owned(),
            ttl: self
                .ttls
                .iter()
                .map(|(family, ttl)| (*family, ttl.as_secs()))
                .collect(),
            entries: self.len().await,
        }
    }

    async fn insert_locked(state: &mut CacheState, key: CacheKey, value: Value, ttl: Duration) {
        let now = get_instant();
        // lazy pruning
        state.entries.retain(|_, entry| entry.is_fresh(now));
        state.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        get_metrics().await.cached_entries.set(state.entries.len() as i64);
    }
}
