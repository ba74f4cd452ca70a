use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::thermostat::ClimateMode;
use crate::thermostat::FanMode;

/// A device as returned by the devices endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Device {
    pub id: String,
    pub name: String,

    /// Model string, e.g. `BB-V2-0` or `AC-V1-1`. The prefix selects the device class.
    pub model: String,

    /// Line voltage the device is wired to.
    pub voltage: Option<f64>,

    /// Rated maximum current, reported as a string by the API.
    pub max_current: Option<String>,

    pub min_setpoint: Option<f64>,
    pub max_setpoint: Option<f64>,
}

impl Device {
    /// Rated maximum current in amperes, when the reported value parses.
    pub fn rated_max_current(&self) -> Option<f64> {
        self.max_current
            .as_deref()
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Devices {
    #[serde(default)]
    pub devices_obj: HashMap<String, Device>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FirmwareDevice {
    pub installed_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceFirmwares {
    #[serde(default)]
    pub firmware: HashMap<String, FirmwareDevice>,
}

/// A single timestamped reading in a state snapshot: `{"v": 21.5}`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Reading<T> {
    pub v: T,
}

/// Point-in-time state of one device.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceState {
    pub corrected_temp: Option<Reading<f64>>,
    pub humidity: Option<Reading<f64>>,
    pub tstat_mode: Option<Reading<i64>>,
    pub fan_speed: Option<Reading<i64>>,
    pub duty: Option<Reading<f64>>,
    pub set_point: Option<Reading<f64>>,

    /// Instantaneous current. Non-zero even when the device is off.
    pub current: Option<Reading<f64>>,
}

impl DeviceState {
    pub fn temperature(&self) -> Option<f64> {
        self.corrected_temp.map(|r| r.v)
    }

    pub fn humidity(&self) -> Option<f64> {
        self.humidity.map(|r| r.v)
    }

    pub fn mode(&self) -> Option<ClimateMode> {
        self.tstat_mode.and_then(|r| ClimateMode::from_raw(r.v))
    }

    pub fn fan_mode(&self) -> Option<FanMode> {
        self.fan_speed.and_then(|r| FanMode::from_raw(r.v))
    }

    pub fn set_point(&self) -> Option<f64> {
        self.set_point.map(|r| r.v)
    }

    pub fn duty_cycle(&self) -> Option<f64> {
        self.duty.map(|r| r.v)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceStates {
    #[serde(default)]
    pub device_states_obj: HashMap<String, DeviceState>,
}

/// Periodic telemetry push for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub set_point: Option<f64>,
    pub current: Option<f64>,
    pub duty_cycle: Option<f64>,
}

/// Discrete change of mode, setpoint or fan speed.
///
/// `mode` and `fan_speed` are `None` when absent or when the raw code is not
/// recognized.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub device_id: String,
    pub mode: Option<ClimateMode>,
    pub set_point: Option<f64>,
    pub fan_speed: Option<FanMode>,
}

/// Events delivered on the realtime stream, for every device of the account.
#[derive(Debug, Clone, PartialEq)]
pub enum MysaEvent {
    StatusChanged(Status),
    StateChanged(StateChange),
}

impl MysaEvent {
    pub fn device_id(&self) -> &str {
        match self {
            MysaEvent::StatusChanged(status) => &status.device_id,
            MysaEvent::StateChanged(change) => &change.device_id,
        }
    }
}

/// Requested change to a device. Empty fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetDeviceState {
    pub set_point: Option<f64>,
    pub mode: Option<ClimateMode>,
    pub fan_speed: Option<FanMode>,
}

impl SetDeviceState {
    pub fn is_empty(&self) -> bool {
        self.set_point.is_none() && self.mode.is_none() && self.fan_speed.is_none()
    }
}

/// Authentication tokens persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MysaSession {
    pub username: String,
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
}
