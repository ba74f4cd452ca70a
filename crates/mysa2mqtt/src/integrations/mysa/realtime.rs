use super::types::DeviceState;
use super::types::MysaEvent;
use super::types::StateChange;
use super::types::Status;

/// Compare two consecutive polls of one device and produce the events a push
/// stream would have delivered.
///
/// A `StateChanged` is emitted first when the mode, setpoint or fan speed raw
/// values moved (or on the first poll, when any of them is present). A
/// `StatusChanged` follows on every poll that carries both temperature and
/// humidity. Its load comes from the duty cycle alone: the snapshot `Current`
/// reads non-zero on idle devices.
pub fn diff_device_state(
    device_id: &str,
    previous: Option<&DeviceState>,
    current: &DeviceState,
) -> Vec<MysaEvent> {
    let mut events = Vec::new();

    let state_moved = match previous {
        Some(previous) => {
            previous.tstat_mode != current.tstat_mode
                || previous.set_point != current.set_point
                || previous.fan_speed != current.fan_speed
        }
        None => {
            current.tstat_mode.is_some()
                || current.set_point.is_some()
                || current.fan_speed.is_some()
        }
    };

    if state_moved {
        events.push(MysaEvent::StateChanged(StateChange {
            device_id: device_id.to_string(),
            mode: current.mode(),
            set_point: current.set_point(),
            fan_speed: current.fan_mode(),
        }));
    }

    if let (Some(temperature), Some(humidity)) = (current.temperature(), current.humidity()) {
        events.push(MysaEvent::StatusChanged(Status {
            device_id: device_id.to_string(),
            temperature,
            humidity,
            set_point: current.set_point(),
            current: None,
            duty_cycle: current.duty_cycle(),
        }));
    }

    events
}
