//! Shape-tolerant decoding of station responses.
//!
//! Stations running the same firmware have been seen sending the reading
//! flat, nested once under `weather`, or as text with whitespace inside keys
//! and numbers. Decoding tries, in order:
//!
//! 1. the body as JSON, used as-is when it carries a temperature;
//! 2. the object under `weather` when the top level has no temperature;
//! 3. the body with all whitespace removed, when it does not parse at all.
//!
//! A body that parses to a JSON string is treated as an embedded document
//! and goes through step 3.

use std::ops::RangeInclusive;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use super::observation::domain;
use super::observation::Limits;
use super::observation::Observation;

/// Longest body excerpt carried by [`DecodeError::Malformed`].
pub const EXCERPT_LEN: usize = 64;

const TEMPERATURE_KEYS: &[&str] = &["temperature", "temp"];
const TEMPERATURE_MIN_KEYS: &[&str] = &["temperature_min", "temperatureMin", "temp_min"];
const TEMPERATURE_MAX_KEYS: &[&str] = &["temperature_max", "temperatureMax", "temp_max"];
const APPARENT_KEYS: &[&str] = &["apparentTemperature", "apparent_temperature", "feels_like"];
const DEW_POINT_KEYS: &[&str] = &["dew_point", "dewPoint"];
const HUMIDITY_KEYS: &[&str] = &["humidity"];
const PRESSURE_KEYS: &[&str] = &["pressure"];
const WIND_SPEED_KEYS: &[&str] = &["windspeed", "wind_speed", "windSpeed"];
const WIND_DIRECTION_KEYS: &[&str] = &["winddirection", "wind_deg", "windDirection", "wind_bearing"];
const CLOUD_KEYS: &[&str] = &["clouds", "cloud_cover", "cloudcover"];
const RAIN_KEYS: &[&str] = &["rain"];
const RAIN_24H_KEYS: &[&str] = &["rain24h", "rain_24h"];
const SNOW_KEYS: &[&str] = &["snow"];
const UV_KEYS: &[&str] = &["uvi", "uv_index", "uvIndex"];
const VISIBILITY_KEYS: &[&str] = &["visibility"];
const LIGHT_KEYS: &[&str] = &["lightlevel", "lightLevel", "illuminance"];
const TIMESTAMP_KEYS: &[&str] = &["dt", "timestamp"];
const CONDITION_KEYS: &[&str] = &["condition_code", "condition"];

/// Keys consulted, in order, when a field holds an object rather than a number.
const NESTED_VALUE_KEYS: &[&str] = &["day", "all", "1h", "3h", "value"];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("malformed body ({size} bytes): {excerpt:?}")]
    Malformed { size: usize, excerpt: String },

    #[error("observation has no '{field}' and no other known field")]
    MissingField { field: &'static str },

    #[error("upstream reported status {code}: {message}")]
    UpstreamStatus { code: i64, message: String },
}

/// Decode a raw response body into an [`Observation`].
///
/// Never fabricates values: anything missing, non-finite or outside its
/// domain is left as `None`.
pub fn decode(body: &[u8], limits: &Limits) -> Result<Observation, DecodeError> {
    let value = match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(_) => parse_stripped(body).ok_or_else(|| malformed(body))?,
    };

    let value = match value {
        Value::String(embedded) => {
            parse_stripped(embedded.as_bytes()).ok_or_else(|| malformed(body))?
        }
        other => other,
    };

    let Value::Object(document) = value else {
        return Err(malformed(body));
    };

    check_upstream_status(&document)?;

    let observation = read_observation(select_document(&document), limits, true);
    if observation.is_empty() {
        return Err(DecodeError::MissingField {
            field: TEMPERATURE_KEYS[0],
        });
    }

    Ok(observation)
}

fn parse_stripped(body: &[u8]) -> Option<Value> {
    let stripped: String = String::from_utf8_lossy(body)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    serde_json::from_str(&stripped).ok()
}

fn malformed(body: &[u8]) -> DecodeError {
    DecodeError::Malformed {
        size: body.len(),
        excerpt: String::from_utf8_lossy(body).chars().take(EXCERPT_LEN).collect(),
    }
}

/// OpenWeather-style bodies carry their own status in `cod`.
fn check_upstream_status(document: &Map<String, Value>) -> Result<(), DecodeError> {
    let code = match document.get("cod") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    match code {
        Some(code) if code != 200 => Err(DecodeError::UpstreamStatus {
            code,
            message: document
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        _ => Ok(()),
    }
}

fn select_document(document: &Map<String, Value>) -> &Map<String, Value> {
    if first_present(document, TEMPERATURE_KEYS).is_some() {
        return document;
    }
    match document.get("weather") {
        Some(Value::Object(nested)) => nested,
        _ => document,
    }
}

fn read_observation(document: &Map<String, Value>, limits: &Limits, with_slots: bool) -> Observation {
    let temperature = first_present(document, TEMPERATURE_KEYS);

    // Daily forecasts carry {"day", "min", "max"} under the temperature key.
    let (temperature_min, temperature_max) = match temperature {
        Some(Value::Object(parts)) => (
            number(parts, &["min"], &domain::TEMPERATURE),
            number(parts, &["max"], &domain::TEMPERATURE),
        ),
        _ => (
            number(document, TEMPERATURE_MIN_KEYS, &domain::TEMPERATURE),
            number(document, TEMPERATURE_MAX_KEYS, &domain::TEMPERATURE),
        ),
    };

    let mut observation = Observation {
        timestamp: epoch(document, TIMESTAMP_KEYS),
        temperature: bounded(temperature.and_then(as_number), &domain::TEMPERATURE),
        temperature_min,
        temperature_max,
        apparent_temperature: number(document, APPARENT_KEYS, &domain::TEMPERATURE),
        dew_point: number(document, DEW_POINT_KEYS, &domain::TEMPERATURE),
        humidity: number(document, HUMIDITY_KEYS, &domain::HUMIDITY),
        pressure: number(document, PRESSURE_KEYS, &domain::PRESSURE),
        wind_speed: number(document, WIND_SPEED_KEYS, &limits.wind_speed),
        wind_direction: number(document, WIND_DIRECTION_KEYS, &domain::WIND_DIRECTION),
        cloud_cover: number(document, CLOUD_KEYS, &domain::CLOUD_COVER),
        rain_volume: number(document, RAIN_KEYS, &domain::PRECIPITATION),
        rain_24h: number(document, RAIN_24H_KEYS, &domain::PRECIPITATION),
        snow_volume: number(document, SNOW_KEYS, &domain::PRECIPITATION),
        uv_index: number(document, UV_KEYS, &domain::UV_INDEX),
        visibility: number(document, VISIBILITY_KEYS, &domain::VISIBILITY),
        light_level: number(document, LIGHT_KEYS, &domain::LIGHT_LEVEL),
        sunrise: epoch(document, &["sunrise"]),
        sunset: epoch(document, &["sunset"]),
        condition_code: condition_code(document),
        description: description(document),
        hourly: Vec::new(),
        daily: Vec::new(),
    };

    if with_slots {
        observation.hourly = read_slots(document.get("hourly"), limits);
        observation.daily = read_slots(document.get("daily"), limits);
    }

    observation
}

fn read_slots(value: Option<&Value>, limits: &Limits) -> Vec<Option<Observation>> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };

    entries
        .iter()
        .map(|entry| match entry {
            Value::Object(slot) => Some(read_observation(slot, limits, false)),
            _ => None,
        })
        .collect()
}

fn first_present<'a>(document: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| document.get(*key))
        .find(|value| !value.is_null())
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Object(parts) => first_present(parts, NESTED_VALUE_KEYS).and_then(as_number),
        _ => None,
    }
}

fn bounded(value: Option<f64>, range: &RangeInclusive<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && range.contains(v))
}

fn number(document: &Map<String, Value>, keys: &[&str], range: &RangeInclusive<f64>) -> Option<f64> {
    bounded(first_present(document, keys).and_then(as_number), range)
}

fn epoch(document: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    first_present(document, keys)
        .and_then(as_number)
        .filter(|v| v.is_finite() && *v >= 0.0 && *v <= i64::MAX as f64)
        .map(|v| v as i64)
}

fn condition_code(document: &Map<String, Value>) -> Option<i64> {
    let direct = first_present(document, CONDITION_KEYS).and_then(as_number);

    // OpenWeather lists conditions as [{"id": 500, ...}] under `weather`.
    let listed = || match document.get("weather") {
        Some(Value::Array(conditions)) => conditions
            .first()
            .and_then(|c| c.get("id"))
            .and_then(as_number),
        _ => None,
    };

    bounded(direct.or_else(listed), &domain::CONDITION_CODE)
        .filter(|v| v.fract() == 0.0)
        .map(|v| v as i64)
}

fn description(document: &Map<String, Value>) -> Option<String> {
    let text = match document.get("condition") {
        Some(Value::String(text)) if text.trim().parse::<f64>().is_err() => Some(text.as_str()),
        _ => match document.get("weather") {
            Some(Value::Array(conditions)) => conditions
                .first()
                .and_then(|c| c.get("description"))
                .and_then(Value::as_str),
            _ => None,
        },
    };
    text.map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_str(body: &str) -> Result<Observation, DecodeError> {
        decode(body.as_bytes(), &Limits::default())
    }

    #[test]
    fn test_flat_document() {
        let observation = decode_str(r#"{"temperature":21.3,"windspeed":5}"#).unwrap();
        assert_eq!(observation.temperature, Some(21.3));
        assert_eq!(observation.wind_speed, Some(5.0));
        assert_eq!(observation.humidity, None);
    }

    #[test]
    fn test_nested_weather_document() {
        let flat = decode_str(r#"{"temperature":21.3,"windspeed":5}"#).unwrap();
        let nested = decode_str(r#"{"weather":{"temperature":21.3,"windspeed":5}}"#).unwrap();
        assert_eq!(flat, nested);
    }

    #[test]
    fn test_top_level_temperature_wins_over_nested() {
        let observation =
            decode_str(r#"{"temperature":10.0,"weather":{"temperature":30.0}}"#).unwrap();
        assert_eq!(observation.temperature, Some(10.0));
    }

    #[test]
    fn test_whitespace_inside_keys_and_numbers() {
        let observation = decode_str("{\"wind speed\": 1 2, \"temp erature\": 2 0.5}").unwrap();
        assert_eq!(observation.wind_speed, Some(12.0));
        assert_eq!(observation.temperature, Some(20.5));
    }

    #[test]
    fn test_embedded_string_document() {
        let observation = decode_str(r#""{ \"windspeed\" : 7 }""#).unwrap();
        assert_eq!(observation.wind_speed, Some(7.0));
    }

    #[test]
    fn test_partial_document_without_temperature() {
        let observation = decode_str(r#"{ "windspeed" : 7 }"#).unwrap();
        assert_eq!(observation.wind_speed, Some(7.0));
        assert_eq!(observation.temperature, None);
    }

    #[test]
    fn test_malformed_text() {
        let err = decode_str("<html>502 Bad Gateway</html>").unwrap_err();
        match err {
            DecodeError::Malformed { size, excerpt } => {
                assert_eq!(size, 28);
                assert_eq!(excerpt, "<html>502 Bad Gateway</html>");
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_excerpt_is_truncated() {
        let body = "x".repeat(10_000);
        let err = decode_str(&body).unwrap_err();
        match err {
            DecodeError::Malformed { size, excerpt } => {
                assert_eq!(size, 10_000);
                assert_eq!(excerpt.len(), EXCERPT_LEN);
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert!(matches!(
            decode_str("[1, 2, 3]"),
            Err(DecodeError::Malformed { .. })
        ));
        assert!(matches!(decode_str("42"), Err(DecodeError::Malformed { .. })));
    }

    #[test]
    fn test_unknown_fields_only() {
        assert_eq!(
            decode_str(r#"{"firmware":"1.2.3"}"#),
            Err(DecodeError::MissingField {
                field: "temperature"
            })
        );
    }

    #[test]
    fn test_out_of_range_values_are_absent() {
        let limits = Limits {
            wind_speed: 0.0..=50.0,
        };
        let observation = decode(
            br#"{"temperature":18.0,"windspeed":80,"humidity":-3,"pressure":5000}"#,
            &limits,
        )
        .unwrap();

        assert_eq!(observation.temperature, Some(18.0));
        assert_eq!(observation.wind_speed, None);
        assert_eq!(observation.humidity, None);
        assert_eq!(observation.pressure, None);
    }

    #[test]
    fn test_non_finite_string_values_are_absent() {
        let observation =
            decode_str(r#"{"temperature":"NaN","humidity":"inf","pressure":"1013.2"}"#).unwrap();
        assert_eq!(observation.temperature, None);
        assert_eq!(observation.humidity, None);
        assert_eq!(observation.pressure, Some(1013.2));
    }

    #[test]
    fn test_zero_is_kept() {
        let observation = decode_str(r#"{"temperature":0,"windspeed":0}"#).unwrap();
        assert_eq!(observation.temperature, Some(0.0));
        assert_eq!(observation.wind_speed, Some(0.0));
    }

    #[test]
    fn test_upstream_status() {
        let err = decode_str(r#"{"cod":"404","message":"city not found"}"#).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UpstreamStatus {
                code: 404,
                message: "city not found".to_string()
            }
        );

        let observation = decode_str(r#"{"cod":200,"temperature":4.5}"#).unwrap();
        assert_eq!(observation.temperature, Some(4.5));
    }

    #[test]
    fn test_onecall_document() {
        let body = r#"{
            "current": null,
            "dt": 1700000000,
            "temp": 7.25,
            "feels_like": 5.1,
            "humidity": 81,
            "pressure": 1009,
            "wind_speed": 4.6,
            "wind_deg": 230,
            "clouds": 75,
            "uvi": 0.4,
            "visibility": 10000,
            "sunrise": 1699943000,
            "sunset": 1699977000,
            "rain": {"1h": 0.35},
            "weather": [{"id": 500, "main": "Rain", "description": "light rain"}],
            "hourly": [
                {"dt": 1700000000, "temp": 7.3, "humidity": 80, "rain": {"1h": 0.2}},
                "garbage",
                {"dt": 1700007200, "temp": 6.9}
            ],
            "daily": [
                {"dt": 1699959600, "temp": {"day": 8.1, "min": 3.2, "max": 9.4}, "rain": 4.1}
            ]
        }"#;

        let observation = decode_str(body).unwrap();
        assert_eq!(observation.timestamp, Some(1_700_000_000));
        assert_eq!(observation.temperature, Some(7.25));
        assert_eq!(observation.apparent_temperature, Some(5.1));
        assert_eq!(observation.wind_direction, Some(230.0));
        assert_eq!(observation.cloud_cover, Some(75.0));
        assert_eq!(observation.rain_volume, Some(0.35));
        assert_eq!(observation.condition_code, Some(500));
        assert_eq!(observation.description.as_deref(), Some("light rain"));

        assert_eq!(observation.hourly.len(), 3);
        assert_eq!(observation.hourly_slot(0).unwrap().rain_volume, Some(0.2));
        assert!(observation.hourly_slot(1).is_none());
        assert_eq!(observation.hourly_slot(2).unwrap().temperature, Some(6.9));

        let today = observation.daily_slot(0).unwrap();
        assert_eq!(today.temperature, Some(8.1));
        assert_eq!(today.temperature_min, Some(3.2));
        assert_eq!(today.temperature_max, Some(9.4));
        assert_eq!(today.rain_volume, Some(4.1));
        assert!(today.hourly.is_empty());
    }

    #[test]
    fn test_condition_text_and_code() {
        let observation =
            decode_str(r#"{"temperature":12,"condition":"Overcast","condition_code":804}"#).unwrap();
        assert_eq!(observation.condition_code, Some(804));
        assert_eq!(observation.description.as_deref(), Some("Overcast"));

        let observation = decode_str(r#"{"temperature":12,"condition":"211"}"#).unwrap();
        assert_eq!(observation.condition_code, Some(211));
        assert_eq!(observation.description, None);
    }

    #[test]
    fn test_fractional_condition_code_is_absent() {
        let observation = decode_str(r#"{"temperature":12,"condition_code":500.7}"#).unwrap();
        assert_eq!(observation.condition_code, None);

        let observation =
            decode_str(r#"{"temperature":12,"weather":[{"id":800.0,"description":"clear sky"}]}"#)
                .unwrap();
        assert_eq!(observation.condition_code, Some(800));
    }

    #[test]
    fn test_rain_24h() {
        let observation = decode_str(r#"{"temperature":12,"rain":0.4,"rain24h":6.5}"#).unwrap();
        assert_eq!(observation.rain_volume, Some(0.4));
        assert_eq!(observation.rain_24h, Some(6.5));

        let observation = decode_str(r#"{"temperature":12,"rain_24h":-1}"#).unwrap();
        assert_eq!(observation.rain_24h, None);
    }
}
