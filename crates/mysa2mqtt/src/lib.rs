pub mod config;
pub mod integrations;
pub mod session;
pub mod thermostat;

pub use config::Config;
pub use config::LogLevel;
