//! Time-to-live cache for read-only query results.
//!
//! Keys are the exact `(query text, parameters)` pair; no normalisation is
//! applied, so textually different queries never share an entry. Entries
//! are evicted lazily: an expired entry is removed by the lookup that
//! observes it and there is no background sweeper.
//!
//! # Concurrent Population
//!
//! Callers that race on the same missing key each run their own fetch and
//! the last `set` wins. There is no single-flight guarantee: a statement
//! may reach the backend once per racing caller.
//!
//! # Staleness
//!
//! Writes through a model do not invalidate cached reads; a cached SELECT
//! can return rows that are up to `ttl` old.

use crate::config::CacheSettings;
use crate::models::Value;
use crate::Result;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Cache key: exact statement text plus parameter tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    params: Vec<Value>,
}

impl CacheKey {
    fn new(query: &str, params: &[Value]) -> Self {
        Self {
            query: query.to_string(),
            params: params.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Thread-safe TTL cache shared by reference between models.
///
/// Guarded by a single mutex; the lock is never held while a fetch runs.
#[derive(Debug)]
pub struct QueryCache<V = Vec<Vec<Value>>> {
    entries: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> QueryCache<V> {
    /// Creates an empty cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Creates an empty cache from configuration.
    #[must_use]
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.ttl)
    }

    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether `query` may be served from the cache: SELECT statements only.
    #[must_use]
    pub fn is_cacheable(query: &str) -> bool {
        query
            .trim_start()
            .get(..6)
            .is_some_and(|head| head.eq_ignore_ascii_case("select"))
    }

    /// Returns the live entry for `(query, params)`.
    ///
    /// An expired entry is removed and reported as absent.
    #[must_use]
    pub fn get(&self, query: &str, params: &[Value]) -> Option<V> {
        let key = CacheKey::new(query, params);
        let mut entries = self.lock();

        let expired = match entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                metrics::counter!("querysmith_cache_hits_total").increment(1);
                return Some(entry.value.clone());
            },
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(&key);
            tracing::debug!(query = %key.query, "Evicted expired cache entry");
        }
        metrics::counter!("querysmith_cache_misses_total").increment(1);
        None
    }

    /// Stores `value` for `(query, params)`, replacing any previous entry.
    pub fn set(&self, query: &str, params: &[Value], value: V) {
        self.lock().insert(
            CacheKey::new(query, params),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Returns the cached value or runs `fetch` and caches its result.
    ///
    /// Non-SELECT statements bypass the cache and always run `fetch`.
    /// Failed fetches are not cached.
    ///
    /// # Errors
    ///
    /// Propagates any error returned by `fetch`.
    pub fn get_or_fetch<F>(&self, query: &str, params: &[Value], fetch: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if !Self::is_cacheable(query) {
            return fetch();
        }
        if let Some(value) = self.get(query, params) {
            return Ok(value);
        }
        let value = fetch()?;
        self.set(query, params, value.clone());
        Ok(value)
    }

    /// Removes every entry regardless of age.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet observed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone> Default for QueryCache<V> {
    fn default() -> Self {
        Self::from_settings(&CacheSettings::default())
    }
}
