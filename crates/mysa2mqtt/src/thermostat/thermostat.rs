use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::command::CommandTopic;
use super::command::translate_command;
use super::modes::Capabilities;
use super::modes::ClimateAction;
use super::modes::ClimateMode;
use super::modes::DeviceClass;
use super::modes::compute_current_action;
use super::power::LoadReading;
use super::power::PowerEstimate;
use super::power::estimate_power;
use super::units::TemperatureUnit;
use crate::integrations::mqtt::Climate;
use crate::integrations::mqtt::ClimateState;
use crate::integrations::mqtt::EntityContext;
use crate::integrations::mqtt::MqttClient;
use crate::integrations::mqtt::MqttError;
use crate::integrations::mqtt::Sensor;
use crate::integrations::mqtt::SensorKind;
use crate::integrations::mqtt::format_reading;
use crate::integrations::mysa::Device;
use crate::integrations::mysa::DeviceState;
use crate::integrations::mysa::MysaApi;
use crate::integrations::mysa::MysaError;
use crate::integrations::mysa::MysaEvent;
use crate::integrations::mysa::StateChange;
use crate::integrations::mysa::Status;

#[derive(Debug, thiserror::Error)]
pub enum ThermostatError {
    #[error("Mysa API error: {0}")]
    Api(#[from] MysaError),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] MqttError),

    #[error("No state snapshot returned for device {0}")]
    MissingSnapshot(String),
}

/// Inputs delivered to a running thermostat besides vendor events.
#[derive(Debug, Clone, PartialEq)]
pub enum ThermostatInput {
    /// A message arrived on one of the climate entity's command topics.
    Command { topic: CommandTopic, payload: String },

    /// Home Assistant restarted; publish discovery and state again.
    Republish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// The externally visible state of one thermostat. Every publish is derived
/// from this record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityState {
    pub climate: ClimateState,
    pub power: PowerEstimate,
}

enum Step {
    Shutdown,
    Event(MysaEvent),
    EventsClosed,
    Input(ThermostatInput),
    InputsClosed,
}

/// Bridge between one Mysa device and its Home Assistant entities.
pub struct Thermostat<A: MysaApi, C: MqttClient> {
    api: Arc<A>,
    mqtt: Arc<C>,
    device: Device,
    capabilities: &'static Capabilities,
    unit: TemperatureUnit,

    climate: Climate,
    temperature: Sensor,
    humidity: Sensor,
    power: Sensor,

    state: EntityState,
    /// Load telemetry from the latest status, reused when a state change
    /// needs the action recomputed.
    last_load: LoadReading,
    lifecycle: Lifecycle,
    events: Option<broadcast::Receiver<MysaEvent>>,
}

impl<A: MysaApi, C: MqttClient> Thermostat<A, C> {
    pub fn new(
        api: Arc<A>,
        mqtt: Arc<C>,
        device: Device,
        context: &EntityContext,
        unit: TemperatureUnit,
    ) -> Self {
        let capabilities = DeviceClass::from_model(&device.model).capabilities();

        Self {
            climate: Climate::new(context, &device, capabilities, unit),
            temperature: Sensor::new(context, SensorKind::Temperature, unit),
            humidity: Sensor::new(context, SensorKind::Humidity, unit),
            power: Sensor::new(context, SensorKind::Power, unit),
            api,
            mqtt,
            device,
            capabilities,
            unit,
            state: EntityState::default(),
            last_load: LoadReading::Unavailable,
            lifecycle: Lifecycle::Stopped,
            events: None,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn state(&self) -> &EntityState {
        &self.state
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Command topics to route to this thermostat.
    pub fn command_topics(&self) -> Vec<(CommandTopic, String)> {
        self.climate.command_topics()
    }

    /// Fetch a snapshot, publish discovery and the initial state, then begin
    /// receiving realtime events. A no-op when already started.
    ///
    /// On failure the thermostat is left stopped and the error is returned.
    pub async fn start(&mut self) -> Result<(), ThermostatError> {
        if self.lifecycle != Lifecycle::Stopped {
            debug!("thermostat already started");
            return Ok(());
        }

        self.lifecycle = Lifecycle::Starting;
        match self.try_start().await {
            Ok(()) => {
                self.lifecycle = Lifecycle::Running;
                info!(name = %self.device.name, "thermostat started");
                Ok(())
            }
            Err(e) => {
                self.events = None;
                self.lifecycle = Lifecycle::Stopped;
                Err(e)
            }
        }
    }

    async fn try_start(&mut self) -> Result<(), ThermostatError> {
        let mut snapshot = self.api.get_device_states().await?;
        let state = snapshot
            .device_states_obj
            .remove(&self.device.id)
            .ok_or_else(|| ThermostatError::MissingSnapshot(self.device.id.clone()))?;
        self.apply_snapshot(&state);

        self.write_configs().await?;
        self.publish_all(true).await?;

        self.events = Some(self.api.subscribe());
        self.api.start_realtime_updates(&self.device.id).await?;
        Ok(())
    }

    /// Stop receiving events and mark the sensor readings unknown.
    /// A no-op when not running.
    ///
    /// Mode and action keep their last published values.
    pub async fn stop(&mut self) -> Result<(), ThermostatError> {
        if self.lifecycle != Lifecycle::Running {
            return Ok(());
        }

        self.lifecycle = Lifecycle::Stopping;
        self.events = None;

        let result = self.try_stop().await;
        self.lifecycle = Lifecycle::Stopped;
        info!(name = %self.device.name, "thermostat stopped");
        result
    }

    async fn try_stop(&mut self) -> Result<(), ThermostatError> {
        let realtime = self.api.stop_realtime_updates(&self.device.id).await;

        self.state.power = PowerEstimate::Unknown;
        self.last_load = LoadReading::Unavailable;
        let mqtt = self.mqtt.as_ref();
        self.power.set_state(mqtt, &self.state.power.to_string()).await?;
        self.temperature.set_state(mqtt, &format_reading(None)).await?;
        self.humidity.set_state(mqtt, &format_reading(None)).await?;

        realtime?;
        Ok(())
    }

    fn apply_snapshot(&mut self, snapshot: &DeviceState) {
        let climate = &mut self.state.climate;

        climate.current_temperature = snapshot.temperature();
        climate.current_humidity = snapshot.humidity();
        climate.mode = snapshot.mode().or(climate.mode);
        climate.fan_mode = snapshot.fan_mode().or(climate.fan_mode);

        // The snapshot current reads non-zero even on idle devices; only the
        // duty cycle is trusted here, and power starts out unknown.
        let load = LoadReading::from_telemetry(None, snapshot.duty_cycle());
        climate.action = compute_current_action(climate.mode, self.capabilities, load);
        climate.target_temperature = if climate.mode == Some(ClimateMode::Off) {
            None
        } else {
            snapshot.set_point()
        };

        self.last_load = load;
        self.state.power = PowerEstimate::Unknown;
    }

    /// Apply one event from the vendor stream. Events for other devices, and
    /// events arriving while not running, are ignored.
    pub async fn handle_event(&mut self, event: MysaEvent) -> Result<(), ThermostatError> {
        if self.lifecycle != Lifecycle::Running || event.device_id() != self.device.id {
            return Ok(());
        }

        match event {
            MysaEvent::StatusChanged(status) => {
                self.apply_status(&status);
                self.publish_all(false).await?;
            }
            MysaEvent::StateChanged(change) => {
                self.apply_state_change(&change);
                self.climate
                    .publish(self.mqtt.as_ref(), &self.state.climate, false)
                    .await?;
            }
        }
        Ok(())
    }

    fn apply_status(&mut self, status: &Status) {
        let load = LoadReading::from_telemetry(status.current, status.duty_cycle);
        self.last_load = load;

        let climate = &mut self.state.climate;
        climate.action = compute_current_action(climate.mode, self.capabilities, load);
        climate.current_temperature = Some(status.temperature);
        climate.current_humidity = Some(status.humidity);
        climate.target_temperature = if climate.mode == Some(ClimateMode::Off) {
            None
        } else {
            status.set_point.or(climate.target_temperature)
        };

        self.state.power = estimate_power(&self.device, load);
    }

    fn apply_state_change(&mut self, change: &StateChange) {
        let climate = &mut self.state.climate;

        match change.mode {
            Some(ClimateMode::Off) => {
                climate.mode = Some(ClimateMode::Off);
                climate.action = ClimateAction::Off;
                climate.target_temperature = None;
                climate.fan_mode = None;
            }
            Some(mode @ (ClimateMode::Heat | ClimateMode::Cool | ClimateMode::Auto)) => {
                climate.mode = Some(mode);
                // Baseboards wait for the next status to tell heating from idle.
                if self.capabilities.class == DeviceClass::Ac {
                    climate.action =
                        compute_current_action(climate.mode, self.capabilities, self.last_load);
                }
                climate.target_temperature = change.set_point.or(climate.target_temperature);
                climate.fan_mode = change.fan_speed.or(climate.fan_mode);
            }
            Some(mode @ (ClimateMode::Dry | ClimateMode::FanOnly)) => {
                climate.mode = Some(mode);
                climate.action =
                    compute_current_action(climate.mode, self.capabilities, self.last_load);
                climate.fan_mode = change.fan_speed.or(climate.fan_mode);
            }
            None => {
                debug!("state change with unrecognized mode, keeping current state");
            }
        }
    }

    /// Translate a command message and send it to the device. The resulting
    /// state arrives later through the event stream.
    pub async fn handle_command(
        &self,
        topic: CommandTopic,
        payload: &str,
    ) -> Result<(), ThermostatError> {
        let Some(change) =
            translate_command(topic, payload, &self.device, self.capabilities, self.unit)
        else {
            return Ok(());
        };

        debug!(%topic, payload, ?change, "sending command");
        self.api.set_device_state(&self.device.id, change).await?;
        Ok(())
    }

    /// Publish discovery and the full state again. Ignored unless running.
    pub async fn republish(&mut self) -> Result<(), ThermostatError> {
        if self.lifecycle != Lifecycle::Running {
            return Ok(());
        }
        self.write_configs().await?;
        self.publish_all(true).await
    }

    async fn write_configs(&mut self) -> Result<(), MqttError> {
        let mqtt = self.mqtt.as_ref();
        self.climate.write_config(mqtt).await?;
        self.temperature.write_config(mqtt).await?;
        self.humidity.write_config(mqtt).await?;
        self.power.write_config(mqtt).await
    }

    async fn publish_all(&mut self, force: bool) -> Result<(), ThermostatError> {
        let mqtt = self.mqtt.as_ref();
        let climate = &self.state.climate;

        self.climate.publish(mqtt, climate, force).await?;
        self.temperature
            .set_state(mqtt, &format_reading(climate.current_temperature))
            .await?;
        self.humidity
            .set_state(mqtt, &format_reading(climate.current_humidity))
            .await?;
        self.power
            .set_state(mqtt, &self.state.power.to_string())
            .await?;
        Ok(())
    }

    /// Process events and inputs one at a time until shutdown is signalled,
    /// then stop.
    ///
    /// Handler failures are logged and never end the loop.
    pub async fn run(
        mut self,
        mut inputs: mpsc::Receiver<ThermostatInput>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut inputs_open = true;

        while !*shutdown.borrow() {
            let step = tokio::select! {
                biased;
                _ = shutdown.changed() => Step::Shutdown,
                event = next_event(&mut self.events) => match event {
                    Some(event) => Step::Event(event),
                    None => Step::EventsClosed,
                },
                input = inputs.recv(), if inputs_open => match input {
                    Some(input) => Step::Input(input),
                    None => Step::InputsClosed,
                },
            };

            match step {
                Step::Shutdown => break,
                Step::Event(event) => {
                    if let Err(e) = self.handle_event(event).await {
                        warn!(error = %e, "failed to apply device event");
                    }
                }
                Step::EventsClosed => {
                    warn!("device event stream closed");
                    self.events = None;
                }
                Step::Input(ThermostatInput::Command { topic, payload }) => {
                    if let Err(e) = self.handle_command(topic, &payload).await {
                        warn!(error = %e, %topic, "failed to send command");
                    }
                }
                Step::Input(ThermostatInput::Republish) => {
                    if let Err(e) = self.republish().await {
                        warn!(error = %e, "failed to republish discovery");
                    }
                }
                Step::InputsClosed => inputs_open = false,
            }
        }

        if let Err(e) = self.stop().await {
            warn!(error = %e, "failed to stop thermostat cleanly");
        }
    }
}

/// Next event for any device, or `None` once the stream is closed. Never
/// resolves when there is no subscription.
async fn next_event(events: &mut Option<broadcast::Receiver<MysaEvent>>) -> Option<MysaEvent> {
    let Some(events) = events.as_mut() else {
        return std::future::pending().await;
    };

    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event stream lagged, some device events were dropped");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}
