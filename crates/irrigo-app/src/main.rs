use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use irrigo_core::{CacheBackend, Config, WeatherConfig};
use irrigo_weather::{
    CachePersistence, ClientSettings, FileStore, KeyValueStore, Location, MemoryStore,
    OpenMeteoProvider, RetryPolicy, SqliteStore, WeatherClient, WeatherError, WeatherResponse,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize core
    irrigo_core::init()?;

    let (config, _) = Config::load_validated(None)?;

    tracing::info!("Irrigo started");
    println!("Irrigo - Field Weather");
    println!("  Config directory: {}", config.config_dir.display());

    if config.locations.is_empty() {
        println!("\nNo locations configured. Add [[locations]] entries to config.toml.");
        return Ok(());
    }

    let client = build_client(&config)?;

    let mut tasks = tokio::task::JoinSet::new();
    for (index, loc) in config.locations.iter().enumerate() {
        let client = client.clone();
        let location = Location::named(&loc.name, loc.latitude, loc.longitude);
        tasks.spawn(async move {
            let result = client.get_weather_data(&location).await;
            (index, location, result)
        });
    }

    // Print in config order, not completion order
    let mut results = Vec::with_capacity(config.locations.len());
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.context("Weather lookup task failed")?);
    }
    results.sort_by_key(|(index, _, _)| *index);

    for (_, location, result) in &results {
        print_location(location, result);
    }

    let stats = client.stats();
    tracing::info!(
        hits = stats.hits,
        misses = stats.misses,
        fetches = stats.fetches,
        "Weather lookups finished"
    );

    Ok(())
}

fn build_client(config: &Config) -> Result<WeatherClient<OpenMeteoProvider>> {
    let weather = &config.weather;
    let provider = OpenMeteoProvider::new(
        &weather.api_base_url,
        Duration::from_secs(weather.request_timeout_secs),
        weather.forecast_days,
    )
    .context("Failed to create weather provider")?;

    let settings = client_settings(weather);

    let store: Arc<dyn KeyValueStore> = match weather.cache_backend {
        CacheBackend::File => Arc::new(FileStore::new(config.cache_dir())),
        CacheBackend::Sqlite => {
            let path = config.config_dir.join("weather_cache.db");
            let store = SqliteStore::open(&path)
                .with_context(|| format!("Failed to open cache database {}", path.display()))?;
            Arc::new(store)
        }
        CacheBackend::Memory => {
            tracing::debug!("Weather cache kept in memory for this run only");
            Arc::new(MemoryStore::new())
        }
    };

    Ok(WeatherClient::with_persistence(
        provider,
        settings,
        CachePersistence::new(store),
    ))
}

fn client_settings(weather: &WeatherConfig) -> ClientSettings {
    ClientSettings {
        ttl: chrono::Duration::minutes(i64::from(weather.ttl_minutes)),
        min_spacing: Duration::from_millis(weather.min_spacing_ms),
        retry: RetryPolicy::new(
            weather.max_retries,
            weather.base_delay_ms,
            weather.max_delay_ms,
        ),
    }
}

fn print_location(location: &Location, result: &Result<WeatherResponse, WeatherError>) {
    println!("\n{}", location.label());
    match result {
        Ok(forecast) => {
            println!("  {:<12} {:>8} {:>8} {:>10}", "date", "tmax", "et0", "precip");
            for row in forecast.daily_rows() {
                println!(
                    "  {:<12} {:>8} {:>8} {:>10}",
                    row.date.to_string(),
                    cell(row.temperature_max, "°C"),
                    cell(row.et0, "mm"),
                    cell(row.precipitation, "mm"),
                );
            }
        }
        Err(e) if e.is_rate_limited() => {
            println!("  Weather temporarily unavailable, retry shortly");
        }
        Err(e) => {
            tracing::warn!("Weather lookup failed for {}: {}", location.label(), e);
            println!("  {}", e.user_message());
        }
    }
}

fn cell(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, unit),
        None => "-".to_string(),
    }
}
