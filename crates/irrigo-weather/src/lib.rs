//! Weather data acquisition for Irrigo
//!
//! Fetches Open-Meteo forecasts for many field locations through a single
//! spaced request queue, with a TTL cache that is snapshotted to a durable
//! key/value medium and reloaded at start-up.

pub mod cache;
pub mod client;
pub mod clock;
pub mod error;
pub mod key;
pub mod persistence;
pub mod provider;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod types;

pub use cache::{CacheEntry, CacheSnapshot, CacheStore, CACHE_VERSION};
pub use client::{CacheStats, ClientSettings, WeatherClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{FetchError, StoreError, WeatherError};
pub use key::LocationKey;
pub use persistence::CachePersistence;
pub use provider::{OpenMeteoProvider, WeatherFetcher};
pub use retry::{fetch_with_retry, RetryPolicy};
pub use scheduler::{RequestScheduler, ScheduleError, Ticket};
pub use store::{FileStore, KeyValueStore, MemoryStore, SqliteStore};
pub use types::*;
