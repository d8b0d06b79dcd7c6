//! In-memory forecast cache with lazy TTL expiry.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::key::LocationKey;
use crate::types::WeatherResponse;

/// Schema tag written into every snapshot. Bump it whenever the shape or
/// meaning of `WeatherResponse` changes so stale snapshots are discarded.
pub const CACHE_VERSION: &str = "3";

/// Default freshness window
pub const DEFAULT_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: WeatherResponse,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Fresh while `0 <= now - fetched_at < ttl`. Entries stamped in the
    /// future (clock moved backwards) are treated as stale.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now - self.fetched_at;
        age >= Duration::zero() && age < ttl
    }
}

/// Versioned image of the cache as written to the durable medium
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: String,
    pub entries: HashMap<LocationKey, CacheEntry>,
}

/// Keyed forecast cache.
///
/// Not internally synchronized; `WeatherClient` owns it behind a mutex.
#[derive(Debug)]
pub struct CacheStore {
    entries: HashMap<LocationKey, CacheEntry>,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Rebuild a store from a snapshot that already passed the version check.
    pub fn from_snapshot(snapshot: CacheSnapshot, ttl: Duration) -> Self {
        Self {
            entries: snapshot.entries,
            ttl,
        }
    }

    /// Return the entry only while it is fresh. Expired entries stay in
    /// place until overwritten or pruned at snapshot time.
    pub fn get(&self, key: &LocationKey, now: DateTime<Utc>) -> Option<&CacheEntry> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
    }

    /// Overwrite any existing entry for `key`.
    pub fn put(&mut self, key: LocationKey, payload: WeatherResponse, now: DateTime<Utc>) {
        self.entries.insert(
            key,
            CacheEntry {
                payload,
                fetched_at: now,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of physically present entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the fresh entries, tagged with `version`.
    pub fn snapshot(&self, version: &str, now: DateTime<Utc>) -> CacheSnapshot {
        let entries = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_fresh(now, self.ttl))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();

        CacheSnapshot {
            version: version.to_string(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Location;

    fn key(lat: f64, lon: f64) -> LocationKey {
        LocationKey::for_location(&Location::new(lat, lon)).unwrap()
    }

    fn payload(lat: f64) -> WeatherResponse {
        WeatherResponse {
            latitude: lat,
            longitude: 0.0,
            timezone: None,
            daily: Default::default(),
            hourly: Default::default(),
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T06:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_get_within_ttl() {
        let mut store = CacheStore::new(Duration::minutes(30));
        store.put(key(1.0, 0.0), payload(1.0), t0());

        let hit = store.get(&key(1.0, 0.0), t0() + Duration::minutes(29));
        assert_eq!(hit.map(|e| e.payload.latitude), Some(1.0));
    }

    #[test]
    fn test_expired_entry_is_a_miss_but_stays_present() {
        let mut store = CacheStore::new(Duration::minutes(30));
        store.put(key(1.0, 0.0), payload(1.0), t0());

        assert!(store.get(&key(1.0, 0.0), t0() + Duration::minutes(31)).is_none());
        // Exactly at the TTL boundary is already stale
        assert!(store.get(&key(1.0, 0.0), t0() + Duration::minutes(30)).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_future_stamped_entry_is_stale() {
        let mut store = CacheStore::new(Duration::minutes(30));
        store.put(key(1.0, 0.0), payload(1.0), t0() + Duration::minutes(5));
        assert!(store.get(&key(1.0, 0.0), t0()).is_none());
    }

    #[test]
    fn test_put_overwrites_and_restamps() {
        let mut store = CacheStore::new(Duration::minutes(30));
        store.put(key(1.0, 0.0), payload(1.0), t0());
        store.put(key(1.0, 0.0), payload(2.0), t0() + Duration::minutes(40));

        let entry = store.get(&key(1.0, 0.0), t0() + Duration::minutes(45)).unwrap();
        assert_eq!(entry.payload.latitude, 2.0);
        assert_eq!(entry.fetched_at, t0() + Duration::minutes(40));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut store = CacheStore::new(Duration::minutes(30));
        store.put(key(1.0, 0.0), payload(1.0), t0());
        store.put(key(2.0, 0.0), payload(2.0), t0());
        store.clear();
        assert!(store.is_empty());
        assert!(store.get(&key(1.0, 0.0), t0()).is_none());
    }

    #[test]
    fn test_snapshot_drops_expired_entries() {
        let mut store = CacheStore::new(Duration::minutes(30));
        store.put(key(1.0, 0.0), payload(1.0), t0());
        store.put(key(2.0, 0.0), payload(2.0), t0() + Duration::minutes(20));

        let snapshot = store.snapshot(CACHE_VERSION, t0() + Duration::minutes(35));
        assert_eq!(snapshot.version, CACHE_VERSION);
        assert_eq!(snapshot.entries.len(), 1);
        assert!(snapshot.entries.contains_key(&key(2.0, 0.0)));
    }

    #[test]
    fn test_from_snapshot_serves_entries() {
        let mut store = CacheStore::new(Duration::minutes(30));
        store.put(key(1.0, 0.0), payload(1.0), t0());
        let snapshot = store.snapshot(CACHE_VERSION, t0());

        let restored = CacheStore::from_snapshot(snapshot, Duration::minutes(30));
        assert!(restored.get(&key(1.0, 0.0), t0() + Duration::minutes(10)).is_some());
    }
}
