pub mod config;
pub mod engine;
pub mod registry;
pub mod weather;

pub use config::format_diagnostics;
pub use config::Config;
pub use config::Diagnostic;
pub use config::LoadError;
pub use config::LogLevel;
pub use engine::Engine;
pub use engine::SensorMessage;
pub use registry::Registry;
pub use registry::State;
