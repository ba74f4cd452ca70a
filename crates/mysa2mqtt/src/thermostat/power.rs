use std::fmt;

use crate::integrations::mqtt::UNKNOWN_STATE;
use crate::integrations::mysa::Device;

/// Load telemetry carried by a single sample.
///
/// V1 hardware reports the instantaneous current draw, V2 hardware reports a
/// heating duty cycle instead. When both are present the current wins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadReading {
    /// Instantaneous current in amperes.
    Current(f64),
    /// Fraction of time the element is on, in `[0, 1]`.
    DutyCycle(f64),
    Unavailable,
}

impl LoadReading {
    pub fn from_telemetry(current: Option<f64>, duty_cycle: Option<f64>) -> Self {
        match (current, duty_cycle) {
            (Some(current), _) => Self::Current(current),
            (None, Some(duty_cycle)) => Self::DutyCycle(duty_cycle),
            (None, None) => Self::Unavailable,
        }
    }

    /// Whether the element is drawing power. A missing reading counts as idle.
    pub fn is_drawing(self) -> bool {
        match self {
            Self::Current(amps) => amps > 0.0,
            Self::DutyCycle(duty) => duty > 0.0,
            Self::Unavailable => false,
        }
    }
}

/// Power draw as published on the power sensor.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum PowerEstimate {
    Watts(f64),
    /// No reliable reading. Published as the unknown sentinel, never as zero.
    #[default]
    Unknown,
}

impl fmt::Display for PowerEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerEstimate::Watts(watts) => write!(f, "{watts:.2}"),
            PowerEstimate::Unknown => f.write_str(UNKNOWN_STATE),
        }
    }
}

/// Estimate the power draw of `device` from a load sample.
pub fn estimate_power(device: &Device, load: LoadReading) -> PowerEstimate {
    let Some(voltage) = device.voltage else {
        return PowerEstimate::Unknown;
    };

    match load {
        LoadReading::Current(amps) => PowerEstimate::Watts(voltage * amps),
        LoadReading::DutyCycle(duty) => match device.rated_max_current() {
            Some(max_current) => PowerEstimate::Watts(voltage * max_current * duty),
            None => PowerEstimate::Unknown,
        },
        LoadReading::Unavailable => PowerEstimate::Unknown,
    }
}
