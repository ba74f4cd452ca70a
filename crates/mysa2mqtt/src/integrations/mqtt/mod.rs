mod climate;
mod client;
mod config;
mod discovery;
#[allow(clippy::module_inception)]
mod mqtt;
mod sensor;

pub use climate::Climate;
pub use climate::ClimateState;
#[cfg(test)]
pub use client::MockMqttClient;
pub use client::MqttClient;
pub use client::MqttError;
pub use client::MqttMessage;
pub use client::RumqttcClient;
pub use config::Config as MqttConfig;
pub use discovery::DeviceInfo;
pub use discovery::EntityContext;
pub use discovery::OriginInfo;
pub use discovery::discovery_topic;
pub use discovery::entity_topic;
pub use mqtt::CommandRouter;
pub use sensor::Sensor;
pub use sensor::SensorKind;

/// Payload Home Assistant interprets as "unknown" for a state topic.
pub const UNKNOWN_STATE: &str = "None";

/// Format an optional reading with two decimals, or the unknown sentinel.
pub fn format_reading(value: Option<f64>) -> String {
    match value {
        Some(value) if value.is_finite() => format!("{value:.2}"),
        _ => UNKNOWN_STATE.to_string(),
    }
}
