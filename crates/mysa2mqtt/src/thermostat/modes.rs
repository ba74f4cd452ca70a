use serde::Serialize;
use strum::Display;
use strum::EnumString;

use super::power::LoadReading;

/// Operating mode, shared by the Mysa API and the Home Assistant climate entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClimateMode {
    Off,
    Heat,
    Cool,
    Dry,
    FanOnly,
    Auto,
}

impl ClimateMode {
    /// Map a raw `TstatMode` code as reported by the device.
    ///
    /// Unknown codes map to `None`; callers keep their previous mode in that case.
    pub fn from_raw(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Off),
            2 => Some(Self::Auto),
            3 => Some(Self::Heat),
            4 => Some(Self::Cool),
            5 => Some(Self::FanOnly),
            6 => Some(Self::Dry),
            _ => None,
        }
    }

    pub fn raw_code(self) -> i64 {
        match self {
            Self::Off => 1,
            Self::Auto => 2,
            Self::Heat => 3,
            Self::Cool => 4,
            Self::FanOnly => 5,
            Self::Dry => 6,
        }
    }
}

/// Fan speed of AC-class devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FanMode {
    Auto,
    Low,
    Medium,
    High,
    Max,
}

impl FanMode {
    /// Map a raw `FanSpeed` code. Unknown codes map to `None`.
    pub fn from_raw(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Auto),
            3 => Some(Self::Low),
            5 => Some(Self::Medium),
            7 => Some(Self::High),
            8 => Some(Self::Max),
            _ => None,
        }
    }

    pub fn raw_code(self) -> i64 {
        match self {
            Self::Auto => 1,
            Self::Low => 3,
            Self::Medium => 5,
            Self::High => 7,
            Self::Max => 8,
        }
    }
}

/// What the device is currently doing. Always derived, never commanded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClimateAction {
    #[default]
    Off,
    Heating,
    Cooling,
    Drying,
    Fan,
    Idle,
}

const HEAT_ONLY_MODES: &[ClimateMode] = &[ClimateMode::Off, ClimateMode::Heat];

const AC_MODES: &[ClimateMode] = &[
    ClimateMode::Off,
    ClimateMode::Heat,
    ClimateMode::Cool,
    ClimateMode::Dry,
    ClimateMode::FanOnly,
    ClimateMode::Auto,
];

const FAN_MODES: &[FanMode] = &[
    FanMode::Auto,
    FanMode::Low,
    FanMode::Medium,
    FanMode::High,
    FanMode::Max,
];

/// Hardware family of a thermostat, derived once from its model string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Mini-split AC controller: full mode set and fan control.
    Ac,
    /// Baseboard heater thermostat: heat only.
    Baseboard,
}

impl DeviceClass {
    pub fn from_model(model: &str) -> Self {
        if model.starts_with("AC") {
            Self::Ac
        } else {
            Self::Baseboard
        }
    }

    pub fn capabilities(self) -> &'static Capabilities {
        match self {
            Self::Ac => &AC_CAPABILITIES,
            Self::Baseboard => &BASEBOARD_CAPABILITIES,
        }
    }
}

/// Everything that differs between device classes.
///
/// Selected once per thermostat and consulted by both the command translator
/// and the action inference rule.
#[derive(Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub class: DeviceClass,

    /// Modes that may be commanded and advertised.
    pub modes: &'static [ClimateMode],

    /// Fan speeds that may be commanded; empty when the device has no fan control.
    pub fan_modes: &'static [FanMode],

    /// Whether the climate entity exposes an ON/OFF power command topic.
    pub power_command: bool,

    /// Whether heating vs. idle is inferred from current/duty telemetry.
    ///
    /// AC units do not report a usable load while heating, so they always
    /// show `heating` in heat mode.
    pub heat_action_from_load: bool,
}

static AC_CAPABILITIES: Capabilities = Capabilities {
    class: DeviceClass::Ac,
    modes: AC_MODES,
    fan_modes: FAN_MODES,
    power_command: false,
    heat_action_from_load: false,
};

static BASEBOARD_CAPABILITIES: Capabilities = Capabilities {
    class: DeviceClass::Baseboard,
    modes: HEAT_ONLY_MODES,
    fan_modes: &[],
    power_command: true,
    heat_action_from_load: true,
};

impl Capabilities {
    pub fn supports_mode(&self, mode: ClimateMode) -> bool {
        self.modes.contains(&mode)
    }

    pub fn supports_fan(&self) -> bool {
        !self.fan_modes.is_empty()
    }

    pub fn supports_fan_mode(&self, fan_mode: FanMode) -> bool {
        self.fan_modes.contains(&fan_mode)
    }
}

/// Derive the current action from the mode and the latest load telemetry.
pub fn compute_current_action(
    mode: Option<ClimateMode>,
    capabilities: &Capabilities,
    load: LoadReading,
) -> ClimateAction {
    match mode {
        Some(ClimateMode::Off) => ClimateAction::Off,
        Some(ClimateMode::Heat) if capabilities.heat_action_from_load => {
            if load.is_drawing() {
                ClimateAction::Heating
            } else {
                ClimateAction::Idle
            }
        }
        Some(ClimateMode::Heat) => ClimateAction::Heating,
        Some(ClimateMode::Cool) => ClimateAction::Cooling,
        Some(ClimateMode::FanOnly) => ClimateAction::Fan,
        Some(ClimateMode::Dry) => ClimateAction::Drying,
        Some(ClimateMode::Auto) | None => ClimateAction::Idle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_mode_table() {
        assert_eq!(ClimateMode::from_raw(1), Some(ClimateMode::Off));
        assert_eq!(ClimateMode::from_raw(2), Some(ClimateMode::Auto));
        assert_eq!(ClimateMode::from_raw(3), Some(ClimateMode::Heat));
        assert_eq!(ClimateMode::from_raw(4), Some(ClimateMode::Cool));
        assert_eq!(ClimateMode::from_raw(5), Some(ClimateMode::FanOnly));
        assert_eq!(ClimateMode::from_raw(6), Some(ClimateMode::Dry));
        assert_eq!(ClimateMode::from_raw(0), None);
        assert_eq!(ClimateMode::from_raw(99), None);

        for mode in AC_MODES {
            assert_eq!(ClimateMode::from_raw(mode.raw_code()), Some(*mode));
        }
    }

    #[test]
    fn test_raw_fan_speed_table() {
        assert_eq!(FanMode::from_raw(1), Some(FanMode::Auto));
        assert_eq!(FanMode::from_raw(3), Some(FanMode::Low));
        assert_eq!(FanMode::from_raw(5), Some(FanMode::Medium));
        assert_eq!(FanMode::from_raw(7), Some(FanMode::High));
        assert_eq!(FanMode::from_raw(8), Some(FanMode::Max));
        assert_eq!(FanMode::from_raw(2), None);
        assert_eq!(FanMode::from_raw(4), None);
    }

    #[test]
    fn test_mode_strings() {
        assert_eq!(ClimateMode::FanOnly.to_string(), "fan_only");
        assert_eq!("fan_only".parse::<ClimateMode>(), Ok(ClimateMode::FanOnly));
        assert!("FAN_ONLY".parse::<ClimateMode>().is_err());
        assert_eq!(FanMode::Medium.to_string(), "medium");
        assert_eq!(ClimateAction::Heating.to_string(), "heating");
    }

    #[test]
    fn test_device_class_from_model() {
        assert_eq!(DeviceClass::from_model("AC-V1-1"), DeviceClass::Ac);
        assert_eq!(DeviceClass::from_model("BB-V2-0"), DeviceClass::Baseboard);
        assert_eq!(DeviceClass::from_model("INF-V1-0"), DeviceClass::Baseboard);
        assert_eq!(DeviceClass::from_model(""), DeviceClass::Baseboard);
    }

    #[test]
    fn test_capabilities() {
        let bb = DeviceClass::Baseboard.capabilities();
        assert_eq!(bb.modes, &[ClimateMode::Off, ClimateMode::Heat]);
        assert!(!bb.supports_fan());
        assert!(bb.power_command);
        assert!(!bb.supports_mode(ClimateMode::Cool));

        let ac = DeviceClass::Ac.capabilities();
        assert_eq!(ac.modes.len(), 6);
        assert!(ac.supports_fan_mode(FanMode::Max));
        assert!(!ac.power_command);
    }

    #[test]
    fn test_action_baseboard_heat_uses_telemetry() {
        let bb = DeviceClass::Baseboard.capabilities();
        let heat = Some(ClimateMode::Heat);

        let cases = [
            (LoadReading::Current(0.0), ClimateAction::Idle),
            (LoadReading::Current(3.0), ClimateAction::Heating),
            (LoadReading::DutyCycle(0.0), ClimateAction::Idle),
            (LoadReading::DutyCycle(0.4), ClimateAction::Heating),
            (LoadReading::Unavailable, ClimateAction::Idle),
        ];
        for (load, expected) in cases {
            assert_eq!(compute_current_action(heat, bb, load), expected, "{load:?}");
        }
    }

    #[test]
    fn test_action_current_takes_precedence_over_duty_cycle() {
        let bb = DeviceClass::Baseboard.capabilities();
        let load = LoadReading::from_telemetry(Some(0.0), Some(0.8));
        assert_eq!(
            compute_current_action(Some(ClimateMode::Heat), bb, load),
            ClimateAction::Idle
        );
    }

    #[test]
    fn test_action_ac_heat_ignores_telemetry() {
        let ac = DeviceClass::Ac.capabilities();
        for load in [
            LoadReading::Current(0.0),
            LoadReading::DutyCycle(0.0),
            LoadReading::Unavailable,
        ] {
            assert_eq!(
                compute_current_action(Some(ClimateMode::Heat), ac, load),
                ClimateAction::Heating
            );
        }
    }

    #[test]
    fn test_action_for_other_modes() {
        for class in [DeviceClass::Ac, DeviceClass::Baseboard] {
            let caps = class.capabilities();
            let load = LoadReading::Current(5.0);
            assert_eq!(compute_current_action(Some(ClimateMode::Off), caps, load), ClimateAction::Off);
            assert_eq!(compute_current_action(Some(ClimateMode::Cool), caps, load), ClimateAction::Cooling);
            assert_eq!(compute_current_action(Some(ClimateMode::FanOnly), caps, load), ClimateAction::Fan);
            assert_eq!(compute_current_action(Some(ClimateMode::Dry), caps, load), ClimateAction::Drying);
            assert_eq!(compute_current_action(Some(ClimateMode::Auto), caps, load), ClimateAction::Idle);
            assert_eq!(compute_current_action(None, caps, load), ClimateAction::Idle);
        }
    }
}
