//! In-process sink for sensor values.
//!
//! The registry drains the engine's sensor channel and keeps the latest
//! snapshot per `(target, sensor)`. Readers get a consistent view through
//! [`Registry::snapshot`] without blocking the writer.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::engine::ErrorKind;
use crate::engine::SensorMessage;
use crate::engine::SensorReceiver;
use crate::weather::SensorId;
use crate::weather::SensorValueSet;

/// Everything known about one target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetState {
    pub sensors: BTreeMap<SensorId, SensorValueSet>,

    /// False until the first successful poll, and after any failed one.
    pub last_observation_valid: bool,

    pub last_poll_tick: Option<u64>,

    pub consecutive_failures: u32,

    pub last_error: Option<(ErrorKind, String)>,
}

/// Snapshot of every target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub targets: BTreeMap<String, TargetState>,
}

impl State {
    pub fn sensor(&self, target: &str, sensor: &SensorId) -> Option<&SensorValueSet> {
        self.targets.get(target)?.sensors.get(sensor)
    }
}

pub struct Registry {
    /// Readers load the Arc, the run loop stores a new one
    state: ArcSwap<State>,

    rx: Mutex<SensorReceiver>,
}

impl Registry {
    pub fn new(rx: SensorReceiver) -> Self {
        Self {
            state: ArcSwap::new(Arc::default()),
            rx: Mutex::new(rx),
        }
    }

    /// Consume sensor messages until every sender is gone
    pub async fn run(&self) {
        info!("Registry starting");

        let mut rx = self.rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.apply(msg);
        }

        info!("Registry shutting down");
    }

    /// Get a snapshot of the current state.
    pub fn snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    pub fn apply(&self, msg: SensorMessage) {
        let mut state = State::clone(&self.state.load());

        match msg {
            SensorMessage::Snapshot { target, snapshot } => {
                trace!("{}/{} updated", target, snapshot.id());
                let entry = state.targets.entry(target).or_default();
                entry.sensors.insert(snapshot.id(), snapshot);
            }
            SensorMessage::ObservationValidity {
                target,
                valid,
                tick,
            } => {
                let entry = state.targets.entry(target.clone()).or_default();
                if valid && entry.consecutive_failures > 0 {
                    info!(
                        "Target '{}' recovered after {} failed poll(s)",
                        target, entry.consecutive_failures
                    );
                }
                if valid {
                    entry.consecutive_failures = 0;
                    entry.last_error = None;
                }
                entry.last_observation_valid = valid;
                entry.last_poll_tick = Some(tick);
            }
            SensorMessage::PollFailed {
                target,
                kind,
                message,
                tick,
            } => {
                warn!(
                    "Target '{}' poll failed at tick {} ({}): {}",
                    target, tick, kind, message
                );
                let entry = state.targets.entry(target).or_default();
                entry.consecutive_failures += 1;
                entry.last_error = Some((kind, message));
            }
        }

        self.state.store(Arc::new(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;
    use crate::weather::FieldValue;
    use crate::weather::SensorKind;

    fn temperature(value: f64) -> SensorMessage {
        let mut snapshot = SensorValueSet::new(SensorKind::Temperature, None);
        snapshot
            .fields
            .insert("temperature", FieldValue::Number(value));
        SensorMessage::Snapshot {
            target: "garden".to_string(),
            snapshot,
        }
    }

    fn validity(valid: bool, tick: u64) -> SensorMessage {
        SensorMessage::ObservationValidity {
            target: "garden".to_string(),
            valid,
            tick,
        }
    }

    fn current_temperature(registry: &Registry) -> Option<f64> {
        registry
            .snapshot()
            .sensor("garden", &SensorId::current(SensorKind::Temperature))?
            .number("temperature")
    }

    #[test]
    fn test_snapshot_replaces_previous() {
        let (_tx, rx) = engine::channel();
        let registry = Registry::new(rx);

        registry.apply(temperature(12.0));
        registry.apply(temperature(13.5));
        registry.apply(validity(true, 11));

        assert_eq!(current_temperature(&registry), Some(13.5));
        let state = registry.snapshot();
        let garden = &state.targets["garden"];
        assert_eq!(garden.sensors.len(), 1);
        assert!(garden.last_observation_valid);
        assert_eq!(garden.last_poll_tick, Some(11));
    }

    #[test]
    fn test_failure_keeps_snapshots() {
        let (_tx, rx) = engine::channel();
        let registry = Registry::new(rx);

        registry.apply(temperature(12.0));
        registry.apply(validity(true, 11));
        registry.apply(SensorMessage::PollFailed {
            target: "garden".to_string(),
            kind: ErrorKind::Timeout,
            message: "request timed out after 15s".to_string(),
            tick: 21,
        });
        registry.apply(validity(false, 21));

        assert_eq!(current_temperature(&registry), Some(12.0));
        let state = registry.snapshot();
        let garden = &state.targets["garden"];
        assert!(!garden.last_observation_valid);
        assert_eq!(garden.consecutive_failures, 1);
        assert_eq!(
            garden.last_error,
            Some((ErrorKind::Timeout, "request timed out after 15s".to_string()))
        );

        registry.apply(validity(true, 31));
        let state = registry.snapshot();
        assert_eq!(state.targets["garden"].consecutive_failures, 0);
        assert_eq!(state.targets["garden"].last_error, None);
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let (_tx, rx) = engine::channel();
        let registry = Registry::new(rx);

        registry.apply(temperature(12.0));
        let before = registry.snapshot();
        registry.apply(temperature(20.0));

        assert_eq!(
            before
                .sensor("garden", &SensorId::current(SensorKind::Temperature))
                .and_then(|s| s.number("temperature")),
            Some(12.0)
        );
        assert_eq!(current_temperature(&registry), Some(20.0));
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let (tx, rx) = engine::channel();
        let registry = Arc::new(Registry::new(rx));

        let handle = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.run().await })
        };

        tx.send(temperature(7.5)).await.unwrap();
        tx.send(validity(true, 11)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(current_temperature(&registry), Some(7.5));
        assert!(registry.snapshot().targets["garden"].last_observation_valid);
    }
}
