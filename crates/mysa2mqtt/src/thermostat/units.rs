use serde::Deserialize;

/// Temperature unit the deployment presents to users.
///
/// Devices always work in Celsius; Fahrenheit only changes how commands are
/// interpreted and how precise the published values look.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "C", alias = "c")]
    #[value(name = "C")]
    Celsius,

    #[serde(rename = "F", alias = "f")]
    #[value(name = "F")]
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn is_native(self) -> bool {
        self == TemperatureUnit::Celsius
    }

    /// Convert a value expressed in this unit to Celsius.
    pub fn to_celsius(self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => fahrenheit_to_celsius(value),
        }
    }

    /// Precision advertised on the climate entity.
    pub fn climate_precision(self) -> f64 {
        if self.is_native() { 0.1 } else { 1.0 }
    }

    /// Target temperature step advertised on the climate entity.
    pub fn temperature_step(self) -> f64 {
        if self.is_native() { 0.5 } else { 1.0 }
    }

    /// Number of decimals suggested for the temperature sensor.
    pub fn sensor_display_precision(self) -> u8 {
        if self.is_native() { 1 } else { 0 }
    }
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Round to the nearest 0.5 °C, the device setpoint resolution.
pub fn snap_to_half_degree(celsius: f64) -> f64 {
    (celsius * 2.0).round() / 2.0
}
