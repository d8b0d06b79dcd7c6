use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Durable medium for the forecast cache snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    File,
    Sqlite,
    /// No persistence; the cache starts cold on every run
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Base URL of the Open-Meteo compatible forecast API
    pub api_base_url: String,

    /// Cache freshness window in minutes
    pub ttl_minutes: u32,

    /// Minimum time between upstream requests in milliseconds
    pub min_spacing_ms: u64,

    /// Retries after a rate-limited attempt
    pub max_retries: u32,

    /// First backoff delay in milliseconds (doubles per retry)
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,

    pub forecast_days: u8,

    pub request_timeout_secs: u64,

    pub cache_backend: CacheBackend,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.open-meteo.com".to_string(),
            ttl_minutes: 30,
            min_spacing_ms: 1000,
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            forecast_days: 7,
            request_timeout_secs: 10,
            cache_backend: CacheBackend::File,
        }
    }
}

/// A monitored field location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding config.toml and the weather cache. Taken from the
    /// location the file was loaded from, never from its contents.
    #[serde(skip)]
    pub config_dir: PathBuf,

    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub locations: Vec<LocationConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            weather: WeatherConfig::default(),
            locations: Vec::new(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("irrigo")
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let config_path = default_config_dir().join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let mut config = Self::default();
            if let Some(parent) = path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(path)?;
            tracing::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        let mut config: Config =
            toml::from_str(&contents).context("Failed to parse config file")?;
        if let Some(parent) = path.parent() {
            config.config_dir = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult)> {
        let config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let weather = &self.weather;

        self.validate_url(&weather.api_base_url, "weather.api_base_url", &mut result);

        if weather.ttl_minutes == 0 {
            result.add_error("weather.ttl_minutes", "Cache TTL must be greater than 0");
        } else if weather.ttl_minutes > 1440 {
            result.add_warning(
                "weather.ttl_minutes",
                "Cache TTL is more than 24 hours; forecasts will go stale",
            );
        }

        if weather.min_spacing_ms == 0 {
            result.add_warning(
                "weather.min_spacing_ms",
                "Request spacing disabled (0 ms); upstream rate limits are likely",
            );
        }

        if weather.max_retries > 5 {
            result.add_warning(
                "weather.max_retries",
                "More than 5 retries holds the request queue for a long time",
            );
        }

        if weather.base_delay_ms > weather.max_delay_ms {
            result.add_warning(
                "weather.base_delay_ms",
                "Base delay exceeds max delay; every retry waits max_delay_ms",
            );
        }

        if weather.forecast_days == 0 || weather.forecast_days > 16 {
            result.add_error(
                "weather.forecast_days",
                "Forecast days must be between 1 and 16",
            );
        }

        if weather.request_timeout_secs == 0 {
            result.add_error(
                "weather.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        for (i, loc) in self.locations.iter().enumerate() {
            let field = format!("locations[{}]", i);
            if !loc.latitude.is_finite() || !(-90.0..=90.0).contains(&loc.latitude) {
                result.add_error(
                    format!("{}.latitude", field),
                    format!("Latitude {} is outside [-90, 90]", loc.latitude),
                );
            }
            if !loc.longitude.is_finite() || !(-180.0..=180.0).contains(&loc.longitude) {
                result.add_error(
                    format!("{}.longitude", field),
                    format!("Longitude {} is outside [-180, 180]", loc.longitude),
                );
            }
            if loc.name.trim().is_empty() {
                result.add_warning(format!("{}.name", field), "Location has no name");
            }
        }

        if self.locations.is_empty() {
            result.add_warning("locations", "No locations configured");
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Directory for cache files
    pub fn cache_dir(&self) -> PathBuf {
        self.config_dir.join("cache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            config_dir: PathBuf::from("/tmp/irrigo"),
            weather: WeatherConfig::default(),
            locations: vec![LocationConfig {
                name: "North pivot".to_string(),
                latitude: 41.5,
                longitude: -99.9,
            }],
        }
    }

    #[test]
    fn test_valid_config() {
        let result = valid_config().validate();
        assert!(result.is_valid(), "Config should be valid: {:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_default_config_only_warns_about_locations() {
        let result = Config::default().validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "locations"));
    }

    #[test]
    fn test_invalid_url() {
        let mut config = valid_config();
        config.weather.api_base_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.api_base_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = valid_config();
        config.weather.api_base_url = "ftp://api.open-meteo.com".to_string();
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_ttl_is_error() {
        let mut config = valid_config();
        config.weather.ttl_minutes = 0;
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "weather.ttl_minutes"));
    }

    #[test]
    fn test_zero_spacing_is_warning() {
        let mut config = valid_config();
        config.weather.min_spacing_ms = 0;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "weather.min_spacing_ms"));
    }

    #[test]
    fn test_out_of_range_location() {
        let mut config = valid_config();
        config.locations[0].latitude = 95.0;
        config.locations.push(LocationConfig {
            name: "Bad".to_string(),
            latitude: 0.0,
            longitude: f64::NAN,
        });
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "locations[0].latitude"));
        assert!(result.errors.iter().any(|e| e.field == "locations[1].longitude"));
    }

    #[test]
    fn test_partial_weather_section_uses_defaults() {
        let toml_str = r#"
            [weather]
            ttl_minutes = 60
            cache_backend = "sqlite"

            [[locations]]
            name = "Orchard"
            latitude = 36.7
            longitude = -119.8
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.weather.ttl_minutes, 60);
        assert_eq!(config.weather.cache_backend, CacheBackend::Sqlite);
        assert_eq!(config.weather.min_spacing_ms, 1000);
        assert_eq!(config.locations.len(), 1);
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.config_dir, dir.path().join("nested"));

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded, created);
    }

    #[test]
    fn test_moved_config_uses_its_new_directory() {
        let old_dir = tempfile::tempdir().unwrap();
        let new_dir = tempfile::tempdir().unwrap();
        let old_path = old_dir.path().join("config.toml");
        let new_path = new_dir.path().join("config.toml");

        Config::load_from(&old_path).unwrap();
        std::fs::rename(&old_path, &new_path).unwrap();

        let moved = Config::load_from(&new_path).unwrap();
        assert_eq!(moved.config_dir, new_dir.path());
        assert_eq!(moved.cache_dir(), new_dir.path().join("cache"));

        let contents = std::fs::read_to_string(&new_path).unwrap();
        assert!(!contents.contains("config_dir"));
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
