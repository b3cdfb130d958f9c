//! Projection of an [`Observation`] onto the field set of one sensor.
//!
//! Mapping is total: a missing reading becomes a neutral default (zero,
//! `false` or the Unix epoch) so every sensor always carries its full schema.

use chrono::DateTime;
use chrono::Utc;

use super::observation::Observation;
use super::sensor::FieldValue;
use super::sensor::SensorKind;
use super::sensor::SensorValueSet;

/// Layout used for `observationTime`, `sunrise` and `sunset`.
pub const TIME_FORMAT: &str = "%a %b %d %Y %H:%M:%S";

const WIND_DIRECTIONS: [&str; 16] = [
    "North", "NNE", "NE", "ENE", "East", "ESE", "SE", "SSE", "South", "SSW", "SW", "WSW", "West",
    "WNW", "NW", "NNW",
];

/// 16-point compass label for a bearing in degrees. Any finite bearing is
/// accepted and wrapped; non-finite input reads as North.
pub fn wind_direction(degrees: f64) -> &'static str {
    if !degrees.is_finite() {
        return WIND_DIRECTIONS[0];
    }
    let index = (degrees.rem_euclid(360.0) * 16.0 / 360.0).round() as usize % 16;
    WIND_DIRECTIONS[index]
}

/// Round to one decimal place.
pub fn round_temperature(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Render epoch seconds in UTC using [`TIME_FORMAT`].
pub fn format_epoch(secs: i64) -> String {
    datetime(secs).format(TIME_FORMAT).to_string()
}

/// Weekday name of the given epoch seconds, in UTC.
pub fn weekday(secs: i64) -> String {
    datetime(secs).format("%A").to_string()
}

fn datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Per-target switches that change how fields are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapOptions {
    /// Report `leak` as not detected regardless of precipitation.
    pub no_leak: bool,
}

/// Build the value set for `kind` from `observation`.
///
/// For forecast kinds `observation` is the slot itself, and `slot` is only
/// recorded on the result. Never fails.
pub fn map(kind: SensorKind, observation: &Observation, slot: Option<usize>) -> SensorValueSet {
    map_with(kind, observation, slot, MapOptions::default())
}

/// [`map`] with per-target options applied.
pub fn map_with(
    kind: SensorKind,
    observation: &Observation,
    slot: Option<usize>,
    options: MapOptions,
) -> SensorValueSet {
    let mut set = SensorValueSet::new(kind, slot);
    let o = observation;

    match kind {
        SensorKind::Temperature => {
            set.fields.insert("temperature", temperature(o.temperature));
        }
        SensorKind::Humidity => {
            set.fields.insert("humidity", number(o.humidity));
        }
        SensorKind::AirPressure => {
            set.fields.insert("pressure", number(o.pressure));
        }
        SensorKind::Weather => {
            insert_conditions(&mut set, o, options);
            set.fields.insert("rain1h", number(o.rain_volume));
            set.fields.insert("rain24h", number(o.rain_24h));
            insert_daylight(&mut set, o);
            set.fields.insert("visibility", number(o.visibility));
        }
        SensorKind::HourlyForecast => {
            insert_current(&mut set, o);
            insert_conditions(&mut set, o, options);
            set.fields.insert("rain1h", number(o.rain_volume));
        }
        SensorKind::DailyForecast => {
            insert_current(&mut set, o);
            insert_conditions(&mut set, o, options);
            set.fields.insert("rain24h", number(o.rain_volume));
            set.fields
                .insert("day", FieldValue::Text(weekday(o.timestamp.unwrap_or(0))));
            insert_daylight(&mut set, o);
        }
    }

    set
}

fn insert_current(set: &mut SensorValueSet, o: &Observation) {
    set.fields.insert("temperature", temperature(o.temperature));
    set.fields.insert("humidity", number(o.humidity));
    set.fields.insert("pressure", number(o.pressure));
}

/// Fields shared by the Weather sensor and both forecast kinds.
fn insert_conditions(set: &mut SensorValueSet, o: &Observation, options: MapOptions) {
    let rain = o.rain_volume.is_some_and(|v| v > 0.0);
    let snow = o.snow_volume.is_some_and(|v| v > 0.0);
    let code = o.condition_code.unwrap_or(0);

    set.fields.insert(
        "apparentTemperature",
        temperature(o.apparent_temperature.or(o.temperature)),
    );
    set.fields.insert("clouds", number(o.cloud_cover));
    set.fields.insert("condition", FieldValue::Integer(code));
    set.fields
        .insert("conditionCategory", FieldValue::Integer(code / 100));
    set.fields.insert(
        "description",
        FieldValue::Text(o.description.clone().unwrap_or_default()),
    );
    set.fields.insert("dewPoint", temperature(o.dew_point));
    set.fields
        .insert("leak", FieldValue::Bool(!options.no_leak && (rain || snow)));
    set.fields.insert("lightLevel", number(o.light_level));
    set.fields.insert("observationTime", time(o.timestamp));
    set.fields.insert("rain", FieldValue::Bool(rain));
    set.fields.insert("snow", FieldValue::Bool(snow));
    set.fields.insert(
        "wind",
        FieldValue::Text(wind_direction(o.wind_direction.unwrap_or(0.0)).to_string()),
    );
    set.fields.insert("windSpeed", number(o.wind_speed));
}

fn insert_daylight(set: &mut SensorValueSet, o: &Observation) {
    set.fields.insert("sunrise", time(o.sunrise));
    set.fields.insert("sunset", time(o.sunset));
    set.fields
        .insert("temperatureMin", temperature(o.temperature_min));
    set.fields
        .insert("temperatureMax", temperature(o.temperature_max));
    set.fields.insert("uvIndex", number(o.uv_index));
}

fn number(value: Option<f64>) -> FieldValue {
    FieldValue::Number(value.unwrap_or(0.0))
}

fn temperature(value: Option<f64>) -> FieldValue {
    FieldValue::Number(round_temperature(value.unwrap_or(0.0)))
}

fn time(value: Option<i64>) -> FieldValue {
    FieldValue::Text(format_epoch(value.unwrap_or(0)))
}
