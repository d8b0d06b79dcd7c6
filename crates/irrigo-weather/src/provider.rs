//! Open-Meteo forecast provider.
//!
//! A provider makes exactly one upstream request per `fetch` call; retries
//! and caching live above it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{FetchError, WeatherError};
use crate::types::{Location, WeatherResponse};

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com";
pub const DEFAULT_FORECAST_DAYS: u8 = 7;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = "irrigo/0.1.0";

const DAILY_FIELDS: &str =
    "temperature_2m_max,temperature_2m_min,precipitation_sum,et0_fao_evapotranspiration";
const HOURLY_FIELDS: &str =
    "temperature_2m,relative_humidity_2m,precipitation,et0_fao_evapotranspiration";

/// Longest upstream error body kept in an error message
const MAX_ERROR_BODY: usize = 500;

/// One upstream attempt for a location.
pub trait WeatherFetcher: Send + Sync {
    fn fetch(
        &self,
        location: &Location,
    ) -> impl Future<Output = Result<WeatherResponse, FetchError>> + Send;
}

/// Open-Meteo error body: `{"error": true, "reason": "..."}`
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    client: Client,
    base_url: String,
    forecast_days: u8,
}

impl OpenMeteoProvider {
    pub fn new(base_url: &str, timeout: Duration, forecast_days: u8) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| WeatherError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            forecast_days,
        })
    }

    /// Provider for the public Open-Meteo endpoint with default settings.
    pub fn open_meteo() -> Result<Self, WeatherError> {
        Self::new(
            OPEN_METEO_URL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            DEFAULT_FORECAST_DAYS,
        )
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_forecast(&self, location: &Location) -> Result<WeatherResponse, FetchError> {
        let url = format!("{}/v1/forecast", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", location.latitude.to_string()),
                ("longitude", location.longitude.to_string()),
                ("daily", DAILY_FIELDS.to_string()),
                ("hourly", HOURLY_FIELDS.to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", self.forecast_days.to_string()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(FetchError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FetchError::Upstream {
                status: Some(status.as_u16()),
                message: error_message(&text),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let parsed: WeatherResponse =
            serde_json::from_slice(&body).map_err(|e| FetchError::Upstream {
                status: None,
                message: format!("invalid forecast payload: {}", e),
            })?;

        tracing::debug!(
            "Fetched forecast for {} ({} days)",
            location.label(),
            parsed.daily.time.len()
        );
        Ok(parsed)
    }
}

impl WeatherFetcher for OpenMeteoProvider {
    fn fetch(
        &self,
        location: &Location,
    ) -> impl Future<Output = Result<WeatherResponse, FetchError>> + Send {
        self.fetch_forecast(location)
    }
}

impl<T: WeatherFetcher> WeatherFetcher for Arc<T> {
    fn fetch(
        &self,
        location: &Location,
    ) -> impl Future<Output = Result<WeatherResponse, FetchError>> + Send {
        (**self).fetch(location)
    }
}

/// Prefer Open-Meteo's `reason` field, else a truncated raw body.
fn error_message(body: &str) -> String {
    if let Ok(ApiErrorBody {
        reason: Some(reason),
    }) = serde_json::from_str::<ApiErrorBody>(body)
    {
        return reason;
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}
