use tracing::trace;

use super::client::MqttClient;
use super::client::MqttError;
use super::discovery::EntityContext;
use super::discovery::SensorDiscovery;
use super::discovery::discovery_topic;
use super::discovery::entity_topic;
use crate::thermostat::TemperatureUnit;

const COMPONENT: &str = "sensor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Temperature,
    Humidity,
    Power,
}

impl SensorKind {
    fn entity(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Power => "power",
        }
    }

    fn name(self) -> &'static str {
        match self {
            SensorKind::Temperature => "Current temperature",
            SensorKind::Humidity => "Current humidity",
            SensorKind::Power => "Current power",
        }
    }

    fn unit_of_measurement(self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Humidity => "%",
            SensorKind::Power => "W",
        }
    }

    fn display_precision(self, unit: TemperatureUnit) -> u8 {
        match self {
            SensorKind::Temperature => unit.sensor_display_precision(),
            SensorKind::Humidity | SensorKind::Power => 0,
        }
    }
}

/// Read-only numeric sensor entity. Every reading is published.
#[derive(Debug)]
pub struct Sensor {
    kind: SensorKind,
    state_topic: String,
    discovery_topic: String,
    discovery: SensorDiscovery,
}

impl Sensor {
    pub fn new(context: &EntityContext, kind: SensorKind, unit: TemperatureUnit) -> Self {
        let unique_id = context.unique_id(kind.entity());
        let state_topic = entity_topic(&context.topic_prefix, &unique_id, "state");

        Self {
            kind,
            discovery_topic: discovery_topic(&context.discovery_prefix, COMPONENT, &unique_id),
            discovery: SensorDiscovery {
                name: kind.name(),
                unique_id,
                device: context.device.clone(),
                origin: context.origin.clone(),
                state_topic: state_topic.clone(),
                device_class: kind.entity(),
                state_class: "measurement",
                unit_of_measurement: kind.unit_of_measurement(),
                suggested_display_precision: kind.display_precision(unit),
                force_update: true,
            },
            state_topic,
        }
    }

    pub fn state_topic(&self) -> &str {
        &self.state_topic
    }

    pub fn discovery(&self) -> &SensorDiscovery {
        &self.discovery
    }

    /// Publish the discovery config (retained).
    pub async fn write_config<C: MqttClient + ?Sized>(&self, client: &C) -> Result<(), MqttError> {
        let payload = serde_json::to_string(&self.discovery)?;
        client.publish(&self.discovery_topic, &payload, true).await
    }

    /// Publish a reading (retained), already formatted.
    pub async fn set_state<C: MqttClient + ?Sized>(
        &self,
        client: &C,
        payload: &str,
    ) -> Result<(), MqttError> {
        trace!(sensor = self.kind.entity(), payload, "publishing sensor state");
        client.publish(&self.state_topic, payload, true).await
    }
}
