pub mod config;

pub use config::{
    CacheBackend, Config, ConfigValidationError, LocationConfig, ValidationResult, WeatherConfig,
};

use anyhow::Result;

/// Initialize logging
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Irrigo core initialized");
    Ok(())
}
