use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use strum::Display;
use strum::EnumIter;

/// The fixed set of logical sensors a target exposes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, EnumIter,
)]
pub enum SensorKind {
    Temperature,
    Humidity,
    AirPressure,
    Weather,
    HourlyForecast,
    DailyForecast,
}

impl SensorKind {
    /// Kinds that read the current conditions rather than a forecast slot.
    pub const CURRENT: [SensorKind; 4] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::AirPressure,
        SensorKind::Weather,
    ];

    pub fn is_forecast(self) -> bool {
        matches!(self, SensorKind::HourlyForecast | SensorKind::DailyForecast)
    }
}

/// Identifies one sensor of a target: a kind plus, for forecasts, a 0-based slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SensorId {
    pub kind: SensorKind,
    pub slot: Option<usize>,
}

impl SensorId {
    pub fn current(kind: SensorKind) -> Self {
        Self { kind, slot: None }
    }

    pub fn hourly(slot: usize) -> Self {
        Self {
            kind: SensorKind::HourlyForecast,
            slot: Some(slot),
        }
    }

    pub fn daily(slot: usize) -> Self {
        Self {
            kind: SensorKind::DailyForecast,
            slot: Some(slot),
        }
    }

    /// Short human label: "3h" for hourly slot 2, "1d" for daily slot 0.
    pub fn label(&self) -> String {
        match (self.kind, self.slot) {
            (SensorKind::HourlyForecast, Some(slot)) => format!("{}h", slot + 1),
            (SensorKind::DailyForecast, Some(slot)) => format!("{}d", slot + 1),
            (kind, _) => kind.to_string(),
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Some(slot) => write!(f, "{}[{}]", self.kind, slot),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Integer(i64),
    Bool(bool),
    Text(String),
}

/// Snapshot of every field of one sensor, produced fresh on each poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorValueSet {
    pub kind: SensorKind,
    pub slot: Option<usize>,
    pub fields: BTreeMap<&'static str, FieldValue>,
}

impl SensorValueSet {
    pub fn new(kind: SensorKind, slot: Option<usize>) -> Self {
        Self {
            kind,
            slot,
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> SensorId {
        SensorId {
            kind: self.kind,
            slot: self.slot,
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Numeric field value, if `key` holds a number or integer.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key)? {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}
