//! Messages from the engine to whatever consumes sensor values.
//!
//! The engine never holds snapshots itself; it only hands fresh copies over
//! this channel. Per poll, a consumer sees either every snapshot followed by
//! `ObservationValidity { valid: true }`, or one `PollFailed` (then, under the
//! reset policy, neutral snapshots) followed by `ObservationValidity { valid: false }`.

use tokio::sync::mpsc;

use super::event::ErrorKind;
use crate::weather::SensorValueSet;

#[derive(Debug, Clone, PartialEq)]
pub enum SensorMessage {
    /// New values for one sensor of `target`
    Snapshot {
        target: String,
        snapshot: SensorValueSet,
    },

    /// Whether the latest poll of `target` produced a usable observation
    ObservationValidity {
        target: String,
        valid: bool,
        tick: u64,
    },

    /// A poll of `target` failed
    PollFailed {
        target: String,
        kind: ErrorKind,
        message: String,
        tick: u64,
    },
}

impl SensorMessage {
    pub fn target(&self) -> &str {
        match self {
            SensorMessage::Snapshot { target, .. }
            | SensorMessage::ObservationValidity { target, .. }
            | SensorMessage::PollFailed { target, .. } => target,
        }
    }
}

pub type SensorSender = mpsc::Sender<SensorMessage>;
pub type SensorReceiver = mpsc::Receiver<SensorMessage>;

/// Capacity for the engine→registry channel
pub const SENSOR_CHANNEL_SIZE: usize = 1024;

pub fn channel() -> (SensorSender, SensorReceiver) {
    mpsc::channel(SENSOR_CHANNEL_SIZE)
}
