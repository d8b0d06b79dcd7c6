//! Weather client: the entry point for forecast lookups.
//!
//! Lookup path: cache → queue → cache again → fetch with retry → cache write
//! → snapshot write. Only the queued path touches the network.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::cache::{CacheSnapshot, CacheStore, DEFAULT_TTL_MINUTES};
use crate::clock::{Clock, SystemClock};
use crate::error::WeatherError;
use crate::key::LocationKey;
use crate::persistence::CachePersistence;
use crate::provider::WeatherFetcher;
use crate::retry::{fetch_with_retry, RetryPolicy};
use crate::scheduler::{RequestScheduler, ScheduleError, DEFAULT_MIN_SPACING_MS};
use crate::types::{Location, WeatherResponse};

/// Tunables for `WeatherClient`
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub ttl: chrono::Duration,
    pub min_spacing: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::minutes(DEFAULT_TTL_MINUTES),
            min_spacing: Duration::from_millis(DEFAULT_MIN_SPACING_MS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Counters since the client was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Served from cache without queueing
    pub hits: u64,
    /// Queued because the cache had no fresh entry
    pub misses: u64,
    /// Queued misses answered by the post-admission cache check
    pub deduplicated: u64,
    /// Logical fetches that reached the provider (retries count once)
    pub fetches: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    deduplicated: AtomicU64,
    fetches: AtomicU64,
}

/// State shared between the client and its queued jobs.
struct Shared<F> {
    fetcher: F,
    cache: Mutex<CacheStore>,
    persistence: Option<CachePersistence>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    counters: Counters,
    /// Bumped by `clear_cache` while the cache lock is held
    generation: AtomicU64,
    /// Held for every write to the durable medium
    persist_lock: Mutex<()>,
}

impl<F> Shared<F> {
    fn cached(&self, key: &LocationKey) -> Option<WeatherResponse> {
        let now = self.clock.now();
        self.cache.lock().get(key, now).map(|entry| entry.payload.clone())
    }

    /// Write `snapshot` unless the cache was cleared after it was taken.
    /// Blocking.
    fn persist(&self, snapshot: &CacheSnapshot, generation: u64) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let _guard = self.persist_lock.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Skipping weather cache write, cache was cleared");
            return;
        }
        persistence.save(snapshot);
    }
}

/// Rate-limited, cached weather lookups.
///
/// Cheap to clone; clones share the cache and the request queue.
pub struct WeatherClient<F> {
    shared: Arc<Shared<F>>,
    scheduler: RequestScheduler,
}

impl<F> Clone for WeatherClient<F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<F> WeatherClient<F>
where
    F: WeatherFetcher + 'static,
{
    /// Client with an in-memory cache only. Must be called from within a
    /// Tokio runtime.
    pub fn new(fetcher: F, settings: ClientSettings) -> Self {
        Self::build(fetcher, settings, None, Arc::new(SystemClock))
    }

    /// Client whose cache is restored from, and written back to, `persistence`.
    pub fn with_persistence(
        fetcher: F,
        settings: ClientSettings,
        persistence: CachePersistence,
    ) -> Self {
        Self::build(fetcher, settings, Some(persistence), Arc::new(SystemClock))
    }

    /// Full constructor with an explicit clock.
    pub fn build(
        fetcher: F,
        settings: ClientSettings,
        persistence: Option<CachePersistence>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = match persistence.as_ref().and_then(CachePersistence::load) {
            Some(snapshot) => CacheStore::from_snapshot(snapshot, settings.ttl),
            None => CacheStore::new(settings.ttl),
        };

        let shared = Arc::new(Shared {
            fetcher,
            cache: Mutex::new(cache),
            persistence,
            clock,
            retry: settings.retry,
            counters: Counters::default(),
            generation: AtomicU64::new(0),
            persist_lock: Mutex::new(()),
        });

        Self {
            shared,
            scheduler: RequestScheduler::new(settings.min_spacing),
        }
    }

    /// Forecast for `location`, from cache when fresh.
    ///
    /// # Errors
    /// `InvalidLocation` for bad coordinates, `RateLimited` once retries are
    /// exhausted, `Network`/`Upstream` for other fetch failures,
    /// `Unavailable` if the request queue has stopped and `Internal` if the
    /// queued lookup panicked. Persistence failures are never returned.
    pub async fn get_weather_data(&self, location: &Location) -> Result<WeatherResponse, WeatherError> {
        let key = LocationKey::for_location(location)?;
        let counters = &self.shared.counters;

        if let Some(payload) = self.shared.cached(&key) {
            counters.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Weather cache hit for {}", key);
            return Ok(payload);
        }

        counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Weather cache miss for {}, queueing", key);

        let shared = self.shared.clone();
        let location = location.clone();
        self.scheduler
            .schedule(resolve_miss(shared, key, location))
            .await
            .map_err(|e| match e {
                ScheduleError::Closed => WeatherError::Unavailable,
                ScheduleError::JobPanicked => WeatherError::Internal,
            })?
    }

    /// Empty the cache and remove the persisted snapshot.
    ///
    /// Waits for an in-progress snapshot write, and any snapshot taken
    /// before the reset is never written afterwards.
    pub fn clear_cache(&self) {
        let _guard = self.shared.persist_lock.lock();
        {
            let mut cache = self.shared.cache.lock();
            cache.clear();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(p) = &self.shared.persistence {
            p.clear();
        }
        tracing::info!("Weather cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.shared.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            deduplicated: c.deduplicated.load(Ordering::Relaxed),
            fetches: c.fetches.load(Ordering::Relaxed),
        }
    }

    /// Number of cache entries held in memory, fresh or not.
    pub fn cached_entries(&self) -> usize {
        self.shared.cache.lock().len()
    }
}

/// Queued half of a lookup; runs once admitted by the scheduler.
async fn resolve_miss<F>(
    shared: Arc<Shared<F>>,
    key: LocationKey,
    location: Location,
) -> Result<WeatherResponse, WeatherError>
where
    F: WeatherFetcher + 'static,
{
    // An earlier job for the same key may have landed while this one waited
    if let Some(payload) = shared.cached(&key) {
        shared.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Weather for {} resolved while queued", key);
        return Ok(payload);
    }

    shared.counters.fetches.fetch_add(1, Ordering::Relaxed);
    let payload = fetch_with_retry(&shared.fetcher, &location, &shared.retry).await?;

    let snapshot = {
        let now = shared.clock.now();
        let mut cache = shared.cache.lock();
        cache.put(key.clone(), payload.clone(), now);
        let generation = shared.generation.load(Ordering::SeqCst);
        shared
            .persistence
            .as_ref()
            .map(|p| (cache.snapshot(p.version(), now), generation))
    };
    tracing::info!("Fetched weather for {} ({})", location.label(), key);

    if let Some((snapshot, generation)) = snapshot {
        let writer = shared.clone();
        let write = tokio::task::spawn_blocking(move || writer.persist(&snapshot, generation));
        if let Err(e) = write.await {
            tracing::warn!("Weather cache write task failed: {}", e);
        }
    }

    Ok(payload)
}
