//! Per-device synchronization between the Mysa cloud and Home Assistant.

mod command;
mod modes;
mod power;
#[allow(clippy::module_inception)]
mod thermostat;
mod units;

pub use command::CommandTopic;
pub use command::translate_command;
pub use modes::Capabilities;
pub use modes::ClimateAction;
pub use modes::ClimateMode;
pub use modes::DeviceClass;
pub use modes::FanMode;
pub use modes::compute_current_action;
pub use power::LoadReading;
pub use power::PowerEstimate;
pub use power::estimate_power;
pub use thermostat::EntityState;
pub use thermostat::Lifecycle;
pub use thermostat::Thermostat;
pub use thermostat::ThermostatError;
pub use thermostat::ThermostatInput;
pub use units::TemperatureUnit;
pub use units::fahrenheit_to_celsius;
pub use units::snap_to_half_degree;
