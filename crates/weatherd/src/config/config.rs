use std::collections::BTreeMap;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use toml::Spanned;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use super::diagnostics::Diagnostic;
use super::diagnostics::Error;
use super::diagnostics::LoadError;
use super::diagnostics::SourceInfo;
use super::diagnostics::ValidationError;
use super::diagnostics::Warning;
use super::partial::PartialConfig;
use super::partial::PartialTarget;
use crate::engine::PollTarget;
use crate::engine::MAX_DAILY_FORECASTS;
use crate::engine::MAX_HEARTRATE_MINUTES;
use crate::engine::MAX_HOURLY_FORECASTS;
use crate::engine::MIN_HEARTRATE_MINUTES;
use crate::weather::FetchParams;
use crate::weather::Limits;
use crate::weather::DEFAULT_WIND_SPEED;

pub const DEFAULT_CONFIG_PATH: &str = "weatherd.toml";

const DEFAULT_TIMEOUT_SECS: i64 = 15;
const TIMEOUT_SECS: RangeInclusive<i64> = 1..=60;
const INTERVAL_SECS: RangeInclusive<i64> = 1..=60;

#[derive(Debug, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub heartbeat: HeartbeatConfig,
    pub targets: BTreeMap<String, PollTarget>,
}

// LogLevel needs Deserialize because it's used in PartialLoggingConfig with toml::Spanned
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, keyed by tracing target (module path)
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build a `tracing-subscriber` filter from the level and overrides
    pub fn filter(&self) -> Targets {
        Targets::new()
            .with_default(LevelFilter::from(self.level))
            .with_targets(
                self.overrides
                    .iter()
                    .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
            )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Seconds between ticks; always divides 60
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_secs: 1 }
    }
}

impl HeartbeatConfig {
    pub fn ticks_per_minute(&self) -> u64 {
        60 / self.interval_secs.max(1)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Load configuration from multiple TOML files with import resolution
    ///
    /// Supports several files (e.g. base + secrets), `imports` within files
    /// and conflict detection across all of them. Every warning and error is
    /// collected before returning.
    ///
    /// Returns Ok((Config, warnings)) when no errors were found.
    pub fn from_files(paths: &[PathBuf]) -> Result<(Self, Vec<Diagnostic>), LoadError> {
        let configs = PartialConfig::load_with_imports(paths)?;

        let (partial, diagnostics) = PartialConfig::merge(configs);

        Self::from_partial(partial, diagnostics)
    }

    /// Convert a merged PartialConfig to a Config, validating all fields
    pub fn from_partial(
        partial: PartialConfig,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<(Self, Vec<Diagnostic>), LoadError> {
        let mut errors = Vec::new();

        let logging = partial
            .logging
            .map(|logging| LoggingConfig {
                level: logging.level.map(|s| *s.get_ref()).unwrap_or_default(),
                overrides: logging
                    .overrides
                    .map(|hm| hm.into_iter().map(|(k, v)| (k, *v.get_ref())).collect())
                    .unwrap_or_default(),
            })
            .unwrap_or_default();

        let heartbeat = HeartbeatConfig {
            interval_secs: partial
                .heartbeat
                .map(|h| validate_interval(h.interval_secs, h.source.as_ref(), &mut errors))
                .unwrap_or(HeartbeatConfig::default().interval_secs),
        };

        let mut targets = BTreeMap::new();
        for (name, partial_target) in partial.targets.unwrap_or_default() {
            match validate_target(&name, partial_target) {
                Ok(target) => {
                    targets.insert(name, target);
                }
                Err(target_errors) => errors.extend(target_errors),
            }
        }

        if targets.is_empty() && errors.is_empty() {
            diagnostics.push(Diagnostic::Warning(Warning::NoTargets));
        }

        diagnostics.extend(
            errors
                .into_iter()
                .map(|e| Diagnostic::Error(Error::Validation(e))),
        );

        if diagnostics.iter().any(Diagnostic::is_error) {
            return Err(LoadError::Invalid { diagnostics });
        }

        Ok((
            Config {
                logging,
                heartbeat,
                targets,
            },
            diagnostics,
        ))
    }
}

fn validate_interval(
    value: Option<Spanned<i64>>,
    source: Option<&SourceInfo>,
    errors: &mut Vec<ValidationError>,
) -> u64 {
    let Some(value) = value else {
        return HeartbeatConfig::default().interval_secs;
    };

    let span = value.span();
    let secs = value.into_inner();
    let message = if !INTERVAL_SECS.contains(&secs) {
        format!(
            "must be between {} and {}",
            INTERVAL_SECS.start(),
            INTERVAL_SECS.end()
        )
    } else if 60 % secs != 0 {
        "must divide 60 evenly".to_string()
    } else {
        return secs as u64;
    };

    errors.push(ValidationError {
        field_path: "heartbeat.interval_secs".to_string(),
        message,
        span: source.map(|_| span),
        source: source.cloned(),
    });
    HeartbeatConfig::default().interval_secs
}

/// Validate a partial target and convert it to a complete PollTarget
fn validate_target(name: &str, partial: PartialTarget) -> Result<PollTarget, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let source = partial.source.as_ref();

    let error = |field: &str, message: String, span: Option<std::ops::Range<usize>>| {
        ValidationError {
            field_path: format!("targets.{}.{}", name, field),
            message,
            span: span.filter(|_| source.is_some()),
            source: source.cloned(),
        }
    };

    let bounded = |errors: &mut Vec<ValidationError>,
                   field: &str,
                   value: &Option<Spanned<i64>>,
                   range: RangeInclusive<i64>,
                   default: i64| {
        match value {
            None => default,
            Some(v) if range.contains(v.get_ref()) => *v.get_ref(),
            Some(v) => {
                errors.push(error(
                    field,
                    format!("must be between {} and {}", range.start(), range.end()),
                    Some(v.span()),
                ));
                default
            }
        }
    };

    let host = match &partial.host {
        Some(host) if host.get_ref().trim().is_empty() => {
            errors.push(error("host", "host must not be empty".to_string(), Some(host.span())));
            String::new()
        }
        Some(host) if host.get_ref().contains("://") || host.get_ref().contains('/') => {
            errors.push(error(
                "host",
                "host must be a bare name or address, without scheme or path".to_string(),
                Some(host.span()),
            ));
            String::new()
        }
        Some(host) => host.get_ref().trim().to_string(),
        None => {
            let header = partial.header.clone();
            errors.push(error(
                "host",
                "host is required".to_string(),
                Some(header).filter(|h| !h.is_empty()),
            ));
            String::new()
        }
    };

    let path = match &partial.path {
        Some(path) if !path.get_ref().is_empty() && !path.get_ref().starts_with('/') => {
            errors.push(error(
                "path",
                "path must start with '/'".to_string(),
                Some(path.span()),
            ));
            String::new()
        }
        Some(path) => path.get_ref().clone(),
        None => String::new(),
    };

    let timeout_secs = bounded(
        &mut errors,
        "timeout_secs",
        &partial.timeout_secs,
        TIMEOUT_SECS,
        DEFAULT_TIMEOUT_SECS,
    );
    let heartrate_minutes = bounded(
        &mut errors,
        "heartrate_minutes",
        &partial.heartrate_minutes,
        MIN_HEARTRATE_MINUTES as i64..=MAX_HEARTRATE_MINUTES as i64,
        MIN_HEARTRATE_MINUTES as i64,
    );
    let hourly_forecasts = bounded(
        &mut errors,
        "hourly_forecasts",
        &partial.hourly_forecasts,
        0..=MAX_HOURLY_FORECASTS as i64,
        0,
    );
    let daily_forecasts = bounded(
        &mut errors,
        "daily_forecasts",
        &partial.daily_forecasts,
        0..=MAX_DAILY_FORECASTS as i64,
        0,
    );

    let wind_min = partial
        .wind_speed_min
        .as_ref()
        .map(|v| *v.get_ref())
        .unwrap_or(*DEFAULT_WIND_SPEED.start());
    let wind_max = partial
        .wind_speed_max
        .as_ref()
        .map(|v| *v.get_ref())
        .unwrap_or(*DEFAULT_WIND_SPEED.end());

    if !wind_min.is_finite() || wind_min < 0.0 {
        errors.push(error(
            "wind_speed_min",
            "must be a non-negative number".to_string(),
            partial.wind_speed_min.as_ref().map(Spanned::span),
        ));
    }
    if !wind_max.is_finite() || wind_max <= wind_min {
        errors.push(error(
            "wind_speed_max",
            format!("must be greater than wind_speed_min ({})", wind_min),
            partial
                .wind_speed_max
                .as_ref()
                .or(partial.wind_speed_min.as_ref())
                .map(Spanned::span),
        ));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let scheme = if partial.https.unwrap_or(false) {
        "https"
    } else {
        "http"
    };
    let suffix = partial.suffix.unwrap_or_default();

    Ok(PollTarget {
        id: name.to_string(),
        heartrate_minutes: heartrate_minutes as u32,
        fetch: FetchParams {
            url: format!("{}://{}{}{}", scheme, host, path, suffix),
            api_key: partial.api_key.filter(|key| !key.is_empty()),
            timeout: Duration::from_secs(timeout_secs as u64),
        },
        hourly_forecasts: hourly_forecasts as usize,
        daily_forecasts: daily_forecasts as usize,
        limits: Limits {
            wind_speed: wind_min..=wind_max,
        },
        failure_policy: partial.on_failure.unwrap_or_default(),
        no_leak: partial.no_leak.unwrap_or(false),
    })
}
