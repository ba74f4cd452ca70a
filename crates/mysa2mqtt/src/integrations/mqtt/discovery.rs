use serde::Serialize;

use crate::integrations::mysa::Device;
use crate::thermostat::ClimateMode;
use crate::thermostat::FanMode;

const MANUFACTURER: &str = "Mysa";
const ORIGIN_NAME: &str = "mysa2mqtt";
const SUPPORT_URL: &str = "https://github.com/bourquep/mysa2mqtt";

/// Topic a discovery config is published on.
///
/// Format: `{prefix}/{component}/{unique_id}/config`
pub fn discovery_topic(prefix: &str, component: &str, unique_id: &str) -> String {
    format!("{prefix}/{component}/{unique_id}/config")
}

/// State or command topic of an entity.
///
/// Format: `{prefix}/{unique_id}/{name}`, e.g. `mysa2mqtt/mysa_abc_climate/mode_state`
pub fn entity_topic(prefix: &str, unique_id: &str, name: &str) -> String {
    format!("{prefix}/{unique_id}/{name}")
}

/// Device block shared by every entity of one thermostat
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl DeviceInfo {
    pub fn from_device(
        device: &Device,
        firmware_version: Option<&str>,
        serial_number: Option<&str>,
    ) -> Self {
        Self {
            identifiers: vec![device.id.clone()],
            name: device.name.clone(),
            manufacturer: MANUFACTURER.to_string(),
            model: device.model.clone(),
            sw_version: firmware_version.map(str::to_string),
            serial_number: serial_number.map(str::to_string),
        }
    }
}

/// Identifies this bridge as the source of the discovery configs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginInfo {
    pub name: &'static str,
    pub sw_version: &'static str,
    pub support_url: &'static str,
}

impl OriginInfo {
    pub fn bridge() -> Self {
        Self {
            name: ORIGIN_NAME,
            sw_version: env!("CARGO_PKG_VERSION"),
            support_url: SUPPORT_URL,
        }
    }
}

/// Everything an entity needs to name its topics and describe its device.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityContext {
    pub device_id: String,
    pub topic_prefix: String,
    pub discovery_prefix: String,
    pub device: DeviceInfo,
    pub origin: OriginInfo,
}

impl EntityContext {
    /// Unique id of one of the device's entities, e.g. `mysa_abc_climate`.
    pub fn unique_id(&self, entity: &str) -> String {
        format!("mysa_{}_{entity}", self.device_id)
    }
}

/// Discovery payload of a `climate` entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateDiscovery {
    pub name: &'static str,
    pub unique_id: String,
    pub device: DeviceInfo,
    pub origin: OriginInfo,
    pub modes: Vec<ClimateMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_modes: Option<Vec<FanMode>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_temp: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_temp: Option<f64>,

    pub precision: f64,
    pub temp_step: f64,

    /// Always Celsius: devices report and accept Celsius only.
    pub temperature_unit: &'static str,
    pub optimistic: bool,

    pub action_topic: String,
    pub current_humidity_topic: String,
    pub current_temperature_topic: String,
    pub mode_state_topic: String,
    pub mode_command_topic: String,
    pub temperature_state_topic: String,
    pub temperature_command_topic: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_command_topic: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_mode_state_topic: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_mode_command_topic: Option<String>,
}

/// Discovery payload of a numeric `sensor` entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDiscovery {
    pub name: &'static str,
    pub unique_id: String,
    pub device: DeviceInfo,
    pub origin: OriginInfo,
    pub state_topic: String,
    pub device_class: &'static str,
    pub state_class: &'static str,
    pub unit_of_measurement: &'static str,
    pub suggested_display_precision: u8,

    /// Every reading is a new data point, even when the value repeats.
    pub force_update: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device {
            id: "abc".to_string(),
            name: "Bedroom".to_string(),
            model: "BB-V2-0".to_string(),
            voltage: Some(240.0),
            max_current: Some("12.5".to_string()),
            min_setpoint: Some(5.0),
            max_setpoint: Some(30.0),
        }
    }

    #[test]
    fn test_topics() {
        assert_eq!(
            discovery_topic("homeassistant", "climate", "mysa_abc_climate"),
            "homeassistant/climate/mysa_abc_climate/config"
        );
        assert_eq!(
            entity_topic("mysa2mqtt", "mysa_abc_climate", "mode_state"),
            "mysa2mqtt/mysa_abc_climate/mode_state"
        );
    }

    #[test]
    fn test_device_info_omits_unknown_fields() {
        let info = DeviceInfo::from_device(&device(), None, None);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["identifiers"], serde_json::json!(["abc"]));
        assert_eq!(json["manufacturer"], "Mysa");
        assert!(json.get("sw_version").is_none());
        assert!(json.get("serial_number").is_none());
    }

    #[test]
    fn test_sensor_discovery_payload() {
        let discovery = SensorDiscovery {
            name: "Current humidity",
            unique_id: "mysa_abc_humidity".to_string(),
            device: DeviceInfo::from_device(&device(), Some("3.14.2"), Some("SN-1")),
            origin: OriginInfo {
                name: ORIGIN_NAME,
                sw_version: "1.0.0",
                support_url: SUPPORT_URL,
            },
            state_topic: "mysa2mqtt/mysa_abc_humidity/state".to_string(),
            device_class: "humidity",
            state_class: "measurement",
            unit_of_measurement: "%",
            suggested_display_precision: 0,
            force_update: true,
        };

        let json = serde_json::to_string_pretty(&discovery).unwrap();
        insta::assert_snapshot!(json, @r#"
        {
          "name": "Current humidity",
          "unique_id": "mysa_abc_humidity",
          "device": {
            "identifiers": [
              "abc"
            ],
            "name": "Bedroom",
            "manufacturer": "Mysa",
            "model": "BB-V2-0",
            "sw_version": "3.14.2",
            "serial_number": "SN-1"
          },
          "origin": {
            "name": "mysa2mqtt",
            "sw_version": "1.0.0",
            "support_url": "https://github.com/bourquep/mysa2mqtt"
          },
          "state_topic": "mysa2mqtt/mysa_abc_humidity/state",
          "device_class": "humidity",
          "state_class": "measurement",
          "unit_of_measurement": "%",
          "suggested_display_precision": 0,
          "force_update": true
        }
        "#);
    }
}
