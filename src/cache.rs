use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::AppError;

/// One cached query shape. Parameterised shapes carry their parameters so each
/// combination is cached on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    DashboardMetrics,
    TechStackWithUsage,
    AllOptionValues,
    TechnologySessionCounts,
    CategoryUsage,
    CategoryAnalytics,
    TechnologyAnalytics,
    Sessions { limit: i64, offset: i64 },
}

struct CacheEntry {
    value: serde_json::Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    // Bumped by every invalidation; a computation that started under an older
    // generation must not publish its result.
    generation: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

/// Time-boxed memoization of expensive read queries.
///
/// Values are kept as `serde_json::Value` so one cache holds every result shape. The only
/// invalidation primitive is [`QueryCache::invalidate_all`]; the synchronizer calls it
/// after every successful write.
#[derive(Default)]
pub struct QueryCache {
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // The state is plain data, a panic while holding the lock cannot leave it torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the cached value for `key` if it is younger than its TTL, otherwise runs
    /// `compute` synchronously and caches the result for `ttl`.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: CacheKey,
        ttl: Duration,
        compute: F,
    ) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let generation = {
            let mut state = self.lock();
            let now = Instant::now();
            let cached = state
                .entries
                .get(&key)
                .filter(|entry| entry.is_fresh(now))
                .map(|entry| entry.value.clone());

            if let Some(value) = cached {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?key, "Cache hit");
                return Ok(serde_json::from_value(value)?);
            }

            // Expired entries are dropped eagerly
            state.entries.remove(&key);
            state.generation
        };

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = ?key, "Cache miss, recomputing");
        let fresh = compute().await?;

        if !ttl.is_zero() {
            let value = serde_json::to_value(&fresh)?;
            let mut state = self.lock();
            if state.generation == generation {
                state.entries.insert(
                    key,
                    CacheEntry {
                        value,
                        stored_at: Instant::now(),
                        ttl,
                    },
                );
            }
        }

        Ok(fresh)
    }

    pub fn invalidate_all(&self) {
        let mut state = self.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        state.generation += 1;
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        info!(dropped, "Query cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        let state = self.lock();
        state
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_fresh(Instant::now()))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}
