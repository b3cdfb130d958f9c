mod decode;
mod fetch;
mod mapper;
mod observation;
mod sensor;

pub use decode::decode;
pub use decode::DecodeError;
pub use fetch::FetchError;
pub use fetch::FetchParams;
pub use fetch::Fetcher;
pub use fetch::HttpFetcher;
pub use fetch::RawResponse;
pub use fetch::ACCEPTED_STATUS;
pub use mapper::format_epoch;
pub use mapper::map;
pub use mapper::map_with;
pub use mapper::MapOptions;
pub use mapper::round_temperature;
pub use mapper::wind_direction;
pub use observation::domain;
pub use observation::Limits;
pub use observation::Observation;
pub use observation::DEFAULT_WIND_SPEED;
pub use sensor::FieldValue;
pub use sensor::SensorId;
pub use sensor::SensorKind;
pub use sensor::SensorValueSet;

#[cfg(test)]
pub use fetch::MockFetcher;
