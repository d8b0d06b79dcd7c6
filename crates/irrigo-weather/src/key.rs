//! Location query keys.
//!
//! Coordinates are rounded to `KEY_PRECISION` decimal places before being
//! formatted, so two edits that land on the same point a few millimetres
//! apart share one cache entry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WeatherError;
use crate::types::Location;

/// Decimal places kept in a key (4 places ~ 11 m at the equator)
pub const KEY_PRECISION: i32 = 4;

/// Cache key derived from a location's coordinates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationKey(String);

impl LocationKey {
    /// Build the key for a location, rejecting non-finite or out-of-range coordinates.
    pub fn for_location(location: &Location) -> Result<Self, WeatherError> {
        let lat = location.latitude;
        let lon = location.longitude;

        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(WeatherError::InvalidLocation(format!(
                "latitude {} is outside [-90, 90]",
                lat
            )));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(WeatherError::InvalidLocation(format!(
                "longitude {} is outside [-180, 180]",
                lon
            )));
        }

        Ok(Self(format!(
            "{:.prec$},{:.prec$}",
            round(lat),
            round(lon),
            prec = KEY_PRECISION as usize
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn round(value: f64) -> f64 {
    let scale = 10f64.powi(KEY_PRECISION);
    let rounded = (value * scale).round() / scale;
    // -0.0 would otherwise format as "-0.0000"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
