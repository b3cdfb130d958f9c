use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::event::PollOutcome;
use super::message::SensorMessage;
use super::message::SensorSender;
use super::target::FailurePolicy;
use super::target::PollTarget;
use crate::weather::decode;
use crate::weather::map_with;
use crate::weather::Fetcher;
use crate::weather::Observation;
use crate::weather::SensorKind;
use crate::weather::SensorValueSet;

/// A target plus the gate that keeps its polls from overlapping.
struct TargetSlot {
    target: PollTarget,
    in_flight: Mutex<()>,
}

/// weatherd engine
///
/// Owns the configured targets and turns heartbeat ticks into polls: fetch,
/// decode, then map once per sensor. Results leave through the sensor
/// channel; the engine keeps no snapshots of its own.
pub struct Engine<F> {
    targets: BTreeMap<String, TargetSlot>,

    fetcher: Arc<F>,

    /// Sender for snapshots and poll notifications
    tx: SensorSender,

    ticks_per_minute: u64,
}

impl<F: Fetcher + 'static> Engine<F> {
    pub fn new(fetcher: Arc<F>, tx: SensorSender, ticks_per_minute: u64) -> Self {
        Self {
            targets: BTreeMap::new(),
            fetcher,
            tx,
            ticks_per_minute,
        }
    }

    /// Register every target from configuration
    pub fn register_targets_from_config(&mut self, cfg: &crate::config::Config) {
        for target in cfg.targets.values() {
            self.register_target(target.clone());
        }
    }

    /// Register a target with the engine
    ///
    /// A second target with the same id replaces the first.
    pub fn register_target(&mut self, target: PollTarget) {
        info!(
            "Registered target '{}' ({} every {} min, {} hourly, {} daily)",
            target.id,
            target.fetch.url,
            target.heartrate_minutes,
            target.hourly_forecasts,
            target.daily_forecasts
        );

        let id = target.id.clone();
        let slot = TargetSlot {
            target,
            in_flight: Mutex::new(()),
        };
        if self.targets.insert(id.clone(), slot).is_some() {
            warn!("Target '{}' registered twice, keeping the latest", id);
        }
    }

    pub fn targets(&self) -> impl Iterator<Item = &PollTarget> {
        self.targets.values().map(|slot| &slot.target)
    }

    /// Handle one heartbeat
    ///
    /// Polls every target due on `tick` concurrently and waits for all of
    /// them. Returns how many targets were actually polled; a target whose
    /// previous poll is still running is skipped.
    pub async fn on_heartbeat(self: &Arc<Self>, tick: u64) -> usize {
        let mut polls = JoinSet::new();

        for (id, slot) in &self.targets {
            if !slot.target.is_due(tick, self.ticks_per_minute) {
                continue;
            }

            let engine = Arc::clone(self);
            let id = id.clone();
            polls.spawn(async move { engine.poll_target(&id, tick).await });
        }

        let mut polled = 0;
        while let Some(result) = polls.join_next().await {
            match result {
                Ok(true) => polled += 1,
                Ok(false) => {}
                Err(e) => warn!("Poll task failed at tick {}: {}", tick, e),
            }
        }

        if polled > 0 {
            debug!("Tick {}: polled {} target(s)", tick, polled);
        }
        polled
    }

    /// Run one poll of `id` unless one is already in flight
    async fn poll_target(&self, id: &str, tick: u64) -> bool {
        let Some(slot) = self.targets.get(id) else {
            return false;
        };

        let Ok(_guard) = slot.in_flight.try_lock() else {
            debug!("Target '{}' still polling, skipping tick {}", id, tick);
            return false;
        };

        let target = &slot.target;
        match self.poll(target).await {
            PollOutcome::Success(observation) => {
                for snapshot in map_target(target, &observation) {
                    self.publish(SensorMessage::Snapshot {
                        target: target.id.clone(),
                        snapshot,
                    })
                    .await;
                }
                self.publish(SensorMessage::ObservationValidity {
                    target: target.id.clone(),
                    valid: true,
                    tick,
                })
                .await;
            }
            PollOutcome::Failure { kind, detail } => {
                debug!("Target '{}' failed at tick {}: {}", id, tick, detail);
                self.publish(SensorMessage::PollFailed {
                    target: target.id.clone(),
                    kind,
                    message: detail,
                    tick,
                })
                .await;

                if target.failure_policy == FailurePolicy::Reset {
                    for snapshot in neutral_snapshots(target) {
                        self.publish(SensorMessage::Snapshot {
                            target: target.id.clone(),
                            snapshot,
                        })
                        .await;
                    }
                }

                self.publish(SensorMessage::ObservationValidity {
                    target: target.id.clone(),
                    valid: false,
                    tick,
                })
                .await;
            }
        }

        true
    }

    /// Fetch and decode one observation for `target`
    pub async fn poll(&self, target: &PollTarget) -> PollOutcome {
        let response = match self.fetcher.fetch(&target.fetch).await {
            Ok(response) => response,
            Err(e) => return e.into(),
        };

        trace!(
            "Target '{}' answered {} with {} bytes",
            target.id,
            response.status,
            response.body.len()
        );

        match decode(&response.body, &target.limits) {
            Ok(observation) => PollOutcome::Success(observation),
            Err(e) => e.into(),
        }
    }

    async fn publish(&self, msg: SensorMessage) {
        if let Err(e) = self.tx.send(msg).await {
            debug!("Sensor channel closed, dropping {:?}", e.0);
        }
    }
}

/// Map `observation` onto every sensor of `target`.
///
/// Forecast sensors whose slot the observation does not carry are left out
/// entirely, so their previous snapshot stays in place.
pub fn map_target(target: &PollTarget, observation: &Observation) -> Vec<SensorValueSet> {
    let options = target.map_options();
    target
        .sensors()
        .into_iter()
        .filter_map(|sensor| match (sensor.kind, sensor.slot) {
            (SensorKind::HourlyForecast, Some(slot)) => observation
                .hourly_slot(slot)
                .map(|o| map_with(sensor.kind, o, Some(slot), options)),
            (SensorKind::DailyForecast, Some(slot)) => observation
                .daily_slot(slot)
                .map(|o| map_with(sensor.kind, o, Some(slot), options)),
            (kind, slot) => Some(map_with(kind, observation, slot, options)),
        })
        .collect()
}

/// Neutral-default snapshots for every sensor of `target`, forecasts included.
pub fn neutral_snapshots(target: &PollTarget) -> Vec<SensorValueSet> {
    let neutral = Observation::default();
    target
        .sensors()
        .into_iter()
        .map(|sensor| map_with(sensor.kind, &neutral, sensor.slot, target.map_options()))
        .collect()
}
