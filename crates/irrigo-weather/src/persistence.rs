//! Versioned snapshot persistence for the forecast cache.
//!
//! Every failure here is logged and absorbed: a broken medium costs a
//! re-fetch after restart and nothing else.

use std::sync::Arc;

use crate::cache::{CacheSnapshot, CACHE_VERSION};
use crate::error::StoreError;
use crate::store::KeyValueStore;

/// Key under which the snapshot is stored
pub const SNAPSHOT_KEY: &str = "weather_cache";

#[derive(Clone)]
pub struct CachePersistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
    version: String,
}

impl std::fmt::Debug for CachePersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePersistence")
            .field("key", &self.key)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl CachePersistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_version(store, CACHE_VERSION)
    }

    /// Use an explicit expected version instead of `CACHE_VERSION`.
    pub fn with_version(store: Arc<dyn KeyValueStore>, version: impl Into<String>) -> Self {
        Self {
            store,
            key: SNAPSHOT_KEY.to_string(),
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Write the snapshot. Failures are logged, never returned.
    pub fn save(&self, snapshot: &CacheSnapshot) {
        if let Err(e) = self.try_save(snapshot) {
            tracing::warn!("Failed to persist weather cache: {}", e);
        }
    }

    fn try_save(&self, snapshot: &CacheSnapshot) -> Result<(), StoreError> {
        let body = serde_json::to_string(snapshot)?;
        self.store.set(&self.key, &body)?;
        tracing::debug!(
            "Persisted weather cache: {} entries, {} bytes",
            snapshot.entries.len(),
            body.len()
        );
        Ok(())
    }

    /// Read the stored snapshot.
    ///
    /// Returns `None` when nothing is stored, when the medium or the data is
    /// unreadable, or when the stored version differs from the expected one.
    /// A version mismatch also clears the medium.
    pub fn load(&self) -> Option<CacheSnapshot> {
        let body = match self.store.get(&self.key) {
            Ok(Some(body)) => body,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read weather cache: {}", e);
                return None;
            }
        };

        let snapshot: CacheSnapshot = match serde_json::from_str(&body) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Discarding unreadable weather cache: {}", e);
                return None;
            }
        };

        if snapshot.version != self.version {
            tracing::info!(
                "Discarding weather cache with version {:?} (expected {:?})",
                snapshot.version,
                self.version
            );
            self.clear();
            return None;
        }

        tracing::info!("Loaded {} cached forecasts", snapshot.entries.len());
        Some(snapshot)
    }

    /// Remove the stored snapshot. Failures are logged, never returned.
    pub fn clear(&self) {
        if let Err(e) = self.store.remove(&self.key) {
            tracing::warn!("Failed to clear persisted weather cache: {}", e);
        }
    }
}
