use serde::Deserialize;

use crate::weather::FetchParams;
use crate::weather::Limits;
use crate::weather::MapOptions;
use crate::weather::SensorId;
use crate::weather::SensorKind;

/// Stations are not polled more often than this.
pub const MIN_HEARTRATE_MINUTES: u32 = 10;
pub const MAX_HEARTRATE_MINUTES: u32 = 120;

pub const MAX_HOURLY_FORECASTS: usize = 47;
pub const MAX_DAILY_FORECASTS: usize = 7;

/// What a target's sensors show after a failed poll.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep the last good snapshot.
    #[default]
    Freeze,
    /// Overwrite every sensor with neutral defaults.
    Reset,
}

/// One configured station.
#[derive(Debug, Clone, PartialEq)]
pub struct PollTarget {
    pub id: String,
    pub heartrate_minutes: u32,
    pub fetch: FetchParams,
    pub hourly_forecasts: usize,
    pub daily_forecasts: usize,
    pub limits: Limits,
    pub failure_policy: FailurePolicy,
    /// Never report a leak, even while it rains or snows.
    pub no_leak: bool,
}

impl PollTarget {
    /// Poll cadence in heartbeat ticks. The heartrate is clamped up to
    /// [`MIN_HEARTRATE_MINUTES`] so a bad value never polls faster.
    pub fn cadence_ticks(&self, ticks_per_minute: u64) -> u64 {
        let minutes = self.heartrate_minutes.max(MIN_HEARTRATE_MINUTES) as u64;
        minutes * ticks_per_minute.max(1)
    }

    /// Whether this target polls on `tick`.
    ///
    /// The first poll lands one full cadence after start (tick 11 for a
    /// cadence of 10) and then every cadence after that.
    pub fn is_due(&self, tick: u64, ticks_per_minute: u64) -> bool {
        let cadence = self.cadence_ticks(ticks_per_minute);
        tick > cadence && tick % cadence == 1
    }

    pub fn map_options(&self) -> MapOptions {
        MapOptions {
            no_leak: self.no_leak,
        }
    }

    /// Every sensor this target feeds, current conditions first.
    pub fn sensors(&self) -> Vec<SensorId> {
        let current = SensorKind::CURRENT.into_iter().map(SensorId::current);
        let hourly = (0..self.hourly_forecasts).map(SensorId::hourly);
        let daily = (0..self.daily_forecasts).map(SensorId::daily);
        current.chain(hourly).chain(daily).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;

    pub fn target(id: &str) -> PollTarget {
        PollTarget {
            id: id.to_string(),
            heartrate_minutes: MIN_HEARTRATE_MINUTES,
            fetch: FetchParams {
                url: format!("http://{}/weather", id),
                api_key: None,
                timeout: Duration::from_secs(15),
            },
            hourly_forecasts: 0,
            daily_forecasts: 0,
            limits: Limits::default(),
            failure_policy: FailurePolicy::Freeze,
            no_leak: false,
        }
    }

    #[test]
    fn test_cadence_one_tick_per_minute() {
        let target = target("garden");
        assert_eq!(target.cadence_ticks(1), 10);

        let due: Vec<u64> = (0..=45).filter(|tick| target.is_due(*tick, 1)).collect();
        assert_eq!(due, vec![11, 21, 31, 41]);
    }

    #[test]
    fn test_cadence_never_first_ticks() {
        let target = target("garden");
        assert!(!target.is_due(0, 1));
        assert!(!target.is_due(1, 1));
        assert!(!target.is_due(10, 1));
    }

    #[test]
    fn test_cadence_clamped_to_floor() {
        let mut target = target("garden");
        target.heartrate_minutes = 2;
        assert_eq!(target.cadence_ticks(1), 10);

        target.heartrate_minutes = 30;
        assert_eq!(target.cadence_ticks(60), 1800);
        assert!(target.is_due(1801, 60));
        assert!(!target.is_due(1800, 60));
    }

    #[test]
    fn test_sensors() {
        let mut target = target("garden");
        target.hourly_forecasts = 2;
        target.daily_forecasts = 1;

        let sensors: Vec<String> = target.sensors().iter().map(|s| s.to_string()).collect();
        assert_eq!(
            sensors,
            vec![
                "Temperature",
                "Humidity",
                "AirPressure",
                "Weather",
                "HourlyForecast[0]",
                "HourlyForecast[1]",
                "DailyForecast[0]",
            ]
        );
    }

    #[test]
    fn test_failure_policy_deserialize() {
        #[derive(Deserialize)]
        struct Holder {
            on_failure: FailurePolicy,
        }

        let holder: Holder = toml::from_str(r#"on_failure = "reset""#).unwrap();
        assert_eq!(holder.on_failure, FailurePolicy::Reset);
        assert_eq!(FailurePolicy::default(), FailurePolicy::Freeze);
    }
}
