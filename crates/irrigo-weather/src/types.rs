use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Geographic location of a field or farm block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            name: None,
        }
    }

    pub fn named(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            name: Some(name.into()),
        }
    }

    /// Label for logs and summaries: the name if set, otherwise the coordinates.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{:.4}, {:.4}", self.latitude, self.longitude),
        }
    }
}

/// Daily columns of an Open-Meteo forecast.
///
/// Open-Meteo returns column-oriented arrays of equal length; missing
/// values are `null` in the payload and `None` here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    #[serde(default)]
    pub time: Vec<NaiveDate>,
    #[serde(default)]
    pub temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    pub temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    pub et0_fao_evapotranspiration: Vec<Option<f64>>,
}

/// Hourly columns of an Open-Meteo forecast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlySeries {
    /// Local ISO-8601 timestamps without offset (e.g. `2024-06-01T13:00`)
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation: Vec<Option<f64>>,
    #[serde(default)]
    pub et0_fao_evapotranspiration: Vec<Option<f64>>,
}

/// Parsed forecast payload as returned by the upstream API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherResponse {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub daily: DailySeries,
    #[serde(default)]
    pub hourly: HourlySeries,
}

/// One row of the daily forecast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyRow {
    pub date: NaiveDate,
    pub temperature_max: Option<f64>,
    pub temperature_min: Option<f64>,
    pub precipitation: Option<f64>,
    pub et0: Option<f64>,
}

impl WeatherResponse {
    /// Zip the daily columns into rows. Short columns yield `None` cells.
    pub fn daily_rows(&self) -> Vec<DailyRow> {
        let cell = |column: &[Option<f64>], i: usize| column.get(i).copied().flatten();
        self.daily
            .time
            .iter()
            .enumerate()
            .map(|(i, date)| DailyRow {
                date: *date,
                temperature_max: cell(&self.daily.temperature_2m_max, i),
                temperature_min: cell(&self.daily.temperature_2m_min, i),
                precipitation: cell(&self.daily.precipitation_sum, i),
                et0: cell(&self.daily.et0_fao_evapotranspiration, i),
            })
            .collect()
    }
}
