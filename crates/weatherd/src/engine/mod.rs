mod engine;
mod event;
mod message;
pub(crate) mod target;

pub use engine::map_target;
pub use engine::neutral_snapshots;
pub use engine::Engine;
pub use event::ErrorKind;
pub use event::PollOutcome;
pub use message::channel;
pub use message::SensorMessage;
pub use message::SensorReceiver;
pub use message::SensorSender;
pub use target::FailurePolicy;
pub use target::PollTarget;
pub use target::MAX_DAILY_FORECASTS;
pub use target::MAX_HEARTRATE_MINUTES;
pub use target::MAX_HOURLY_FORECASTS;
pub use target::MIN_HEARTRATE_MINUTES;
