//! Normalized weather observation.
//!
//! Whatever shape the station sends, the decoder reduces it to an
//! [`Observation`]. Every numeric field is either a finite value inside its
//! declared domain or `None`.

use std::ops::RangeInclusive;

/// Declared value domains. Readings outside these are dropped during decode.
pub mod domain {
    use std::ops::RangeInclusive;

    /// Degrees Celsius; also used for apparent, min, max and dew point.
    pub const TEMPERATURE: RangeInclusive<f64> = -100.0..=100.0;
    /// Relative humidity in percent.
    pub const HUMIDITY: RangeInclusive<f64> = 0.0..=100.0;
    /// Air pressure in hPa.
    pub const PRESSURE: RangeInclusive<f64> = 300.0..=1100.0;
    pub const WIND_DIRECTION: RangeInclusive<f64> = 0.0..=360.0;
    pub const CLOUD_COVER: RangeInclusive<f64> = 0.0..=100.0;
    /// Precipitation volume in mm for the slot's period.
    pub const PRECIPITATION: RangeInclusive<f64> = 0.0..=1000.0;
    pub const UV_INDEX: RangeInclusive<f64> = 0.0..=20.0;
    pub const VISIBILITY: RangeInclusive<f64> = 0.0..=100_000.0;
    /// Illuminance in lux.
    pub const LIGHT_LEVEL: RangeInclusive<f64> = 0.0..=100_000.0;
    pub const CONDITION_CODE: RangeInclusive<f64> = 0.0..=9999.0;
}

/// Default accepted wind speed range when a target does not configure one.
pub const DEFAULT_WIND_SPEED: RangeInclusive<f64> = 0.0..=150.0;

/// Per-target sanity bounds applied on top of [`domain`].
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    pub wind_speed: RangeInclusive<f64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            wind_speed: DEFAULT_WIND_SPEED,
        }
    }
}

/// A decoded observation for "now" or for a single forecast slot.
///
/// Forecast slots are themselves observations with empty slot lists. A slot
/// the upstream sent as something other than an object is kept as `None` so
/// that indices stay aligned with the upstream list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// Observation time, seconds since the Unix epoch.
    pub timestamp: Option<i64>,
    pub temperature: Option<f64>,
    pub temperature_min: Option<f64>,
    pub temperature_max: Option<f64>,
    pub apparent_temperature: Option<f64>,
    pub dew_point: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    /// Wind speed in the station's unit, unconverted.
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub rain_volume: Option<f64>,
    /// Precipitation over the last 24 hours, when the station reports it.
    pub rain_24h: Option<f64>,
    pub snow_volume: Option<f64>,
    pub uv_index: Option<f64>,
    pub visibility: Option<f64>,
    pub light_level: Option<f64>,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
    pub condition_code: Option<i64>,
    /// Free-text condition, e.g. "light rain".
    pub description: Option<String>,
    pub hourly: Vec<Option<Observation>>,
    pub daily: Vec<Option<Observation>>,
}

impl Observation {
    /// The hourly slot at `slot`, if the upstream sent one.
    pub fn hourly_slot(&self, slot: usize) -> Option<&Observation> {
        self.hourly.get(slot).and_then(Option::as_ref)
    }

    /// The daily slot at `slot`, if the upstream sent one.
    pub fn daily_slot(&self, slot: usize) -> Option<&Observation> {
        self.daily.get(slot).and_then(Option::as_ref)
    }

    /// True when no field at all was recognised.
    pub fn is_empty(&self) -> bool {
        *self == Observation::default()
    }
}
