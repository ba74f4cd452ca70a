use strum::Display;
use tracing::debug;
use tracing::warn;

use super::modes::Capabilities;
use super::modes::ClimateMode;
use super::modes::FanMode;
use super::units::TemperatureUnit;
use super::units::snap_to_half_degree;
use crate::integrations::mysa::Device;
use crate::integrations::mysa::SetDeviceState;

/// Setpoint bounds used when the device does not report its own.
const DEFAULT_MIN_SETPOINT: f64 = 0.0;
const DEFAULT_MAX_SETPOINT: f64 = 100.0;

/// Command topics a climate entity can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CommandTopic {
    Mode,
    Power,
    Temperature,
    FanMode,
}

impl CommandTopic {
    /// Last segment of the MQTT topic this command arrives on.
    pub fn topic_name(self) -> &'static str {
        match self {
            CommandTopic::Mode => "mode_command",
            CommandTopic::Power => "power_command",
            CommandTopic::Temperature => "temperature_command",
            CommandTopic::FanMode => "fan_mode_command",
        }
    }

    /// Command topics exposed for a device with the given capabilities.
    pub fn exposed_by(capabilities: &Capabilities) -> Vec<CommandTopic> {
        let mut topics = vec![CommandTopic::Mode];
        if capabilities.power_command {
            topics.push(CommandTopic::Power);
        }
        topics.push(CommandTopic::Temperature);
        if capabilities.supports_fan() {
            topics.push(CommandTopic::FanMode);
        }
        topics
    }
}

/// Translate an inbound command message into a device state change.
///
/// Returns `None` when nothing should be sent to the API. Unrecognized modes and
/// fan speeds still produce a call, with the field left empty, which the API
/// treats as a no-op.
pub fn translate_command(
    topic: CommandTopic,
    message: &str,
    device: &Device,
    capabilities: &Capabilities,
    unit: TemperatureUnit,
) -> Option<SetDeviceState> {
    match topic {
        CommandTopic::Mode => {
            let mode = message
                .parse::<ClimateMode>()
                .ok()
                .filter(|mode| capabilities.supports_mode(*mode));
            if mode.is_none() {
                debug!(message, "unsupported mode requested");
            }
            Some(SetDeviceState {
                mode,
                ..Default::default()
            })
        }

        CommandTopic::Power => {
            if !capabilities.power_command {
                debug!("power command is not exposed for this device");
                return None;
            }
            let mode = match message {
                "OFF" => Some(ClimateMode::Off),
                "ON" => Some(ClimateMode::Heat),
                _ => None,
            };
            Some(SetDeviceState {
                mode,
                ..Default::default()
            })
        }

        CommandTopic::Temperature => {
            let message = message.trim();
            if message.is_empty() {
                return Some(SetDeviceState::default());
            }

            let requested = match message.parse::<f64>() {
                Ok(value) if value.is_finite() => value,
                _ => {
                    warn!(message, "ignoring non-numeric temperature command");
                    return None;
                }
            };

            let set_point = if unit.is_native() {
                requested
            } else {
                let min = device.min_setpoint.unwrap_or(DEFAULT_MIN_SETPOINT);
                let max = device.max_setpoint.unwrap_or(DEFAULT_MAX_SETPOINT);
                snap_to_half_degree(unit.to_celsius(requested)).max(min).min(max)
            };

            Some(SetDeviceState {
                set_point: Some(set_point),
                ..Default::default()
            })
        }

        CommandTopic::FanMode => {
            if !capabilities.supports_fan() {
                debug!("fan mode command is not exposed for this device");
                return None;
            }
            let fan_speed = message
                .parse::<FanMode>()
                .ok()
                .filter(|fan_mode| capabilities.supports_fan_mode(*fan_mode));
            Some(SetDeviceState {
                fan_speed,
                ..Default::default()
            })
        }
    }
}
