use std::collections::HashMap;

use tracing::debug;

use super::UNKNOWN_STATE;
use super::client::MqttClient;
use super::client::MqttError;
use super::discovery::ClimateDiscovery;
use super::discovery::EntityContext;
use super::discovery::discovery_topic;
use super::discovery::entity_topic;
use super::format_reading;
use crate::integrations::mysa::Device;
use crate::thermostat::Capabilities;
use crate::thermostat::ClimateAction;
use crate::thermostat::ClimateMode;
use crate::thermostat::CommandTopic;
use crate::thermostat::FanMode;
use crate::thermostat::TemperatureUnit;

const COMPONENT: &str = "climate";

/// Values shown by the climate entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClimateState {
    pub mode: Option<ClimateMode>,
    pub action: ClimateAction,
    pub fan_mode: Option<FanMode>,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub current_humidity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StateTopic {
    Action,
    CurrentHumidity,
    CurrentTemperature,
    ModeState,
    TemperatureState,
    FanModeState,
}

impl StateTopic {
    fn name(self) -> &'static str {
        match self {
            StateTopic::Action => "action",
            StateTopic::CurrentHumidity => "current_humidity",
            StateTopic::CurrentTemperature => "current_temperature",
            StateTopic::ModeState => "mode_state",
            StateTopic::TemperatureState => "temperature_state",
            StateTopic::FanModeState => "fan_mode_state",
        }
    }

    fn payload(self, state: &ClimateState) -> String {
        match self {
            StateTopic::Action => state.action.to_string(),
            StateTopic::CurrentHumidity => format_reading(state.current_humidity),
            StateTopic::CurrentTemperature => format_reading(state.current_temperature),
            StateTopic::ModeState => state
                .mode
                .map_or_else(|| UNKNOWN_STATE.to_string(), |mode| mode.to_string()),
            StateTopic::TemperatureState => format_reading(state.target_temperature),
            StateTopic::FanModeState => state
                .fan_mode
                .map_or_else(|| UNKNOWN_STATE.to_string(), |fan| fan.to_string()),
        }
    }
}

/// Home Assistant climate entity of one thermostat.
///
/// Remembers what was last published on each state topic and only sends
/// values that changed, unless asked to force a full publish.
#[derive(Debug)]
pub struct Climate {
    unique_id: String,
    topic_prefix: String,
    discovery_topic: String,
    discovery: ClimateDiscovery,
    state_topics: Vec<StateTopic>,
    command_topics: Vec<CommandTopic>,
    published: HashMap<StateTopic, String>,
}

impl Climate {
    pub fn new(
        context: &EntityContext,
        device: &Device,
        capabilities: &Capabilities,
        unit: TemperatureUnit,
    ) -> Self {
        let unique_id = context.unique_id(COMPONENT);
        let topic = |name: &str| entity_topic(&context.topic_prefix, &unique_id, name);

        let command_topics = CommandTopic::exposed_by(capabilities);
        let exposes = |command: CommandTopic| command_topics.contains(&command);

        let mut state_topics = vec![
            StateTopic::Action,
            StateTopic::CurrentHumidity,
            StateTopic::CurrentTemperature,
            StateTopic::ModeState,
            StateTopic::TemperatureState,
        ];
        if capabilities.supports_fan() {
            state_topics.push(StateTopic::FanModeState);
        }

        let discovery = ClimateDiscovery {
            name: "Thermostat",
            unique_id: unique_id.clone(),
            device: context.device.clone(),
            origin: context.origin.clone(),
            modes: capabilities.modes.to_vec(),
            fan_modes: capabilities
                .supports_fan()
                .then(|| capabilities.fan_modes.to_vec()),
            min_temp: device.min_setpoint,
            max_temp: device.max_setpoint,
            precision: unit.climate_precision(),
            temp_step: unit.temperature_step(),
            temperature_unit: "C",
            optimistic: true,
            action_topic: topic(StateTopic::Action.name()),
            current_humidity_topic: topic(StateTopic::CurrentHumidity.name()),
            current_temperature_topic: topic(StateTopic::CurrentTemperature.name()),
            mode_state_topic: topic(StateTopic::ModeState.name()),
            mode_command_topic: topic(CommandTopic::Mode.topic_name()),
            temperature_state_topic: topic(StateTopic::TemperatureState.name()),
            temperature_command_topic: topic(CommandTopic::Temperature.topic_name()),
            power_command_topic: exposes(CommandTopic::Power)
                .then(|| topic(CommandTopic::Power.topic_name())),
            fan_mode_state_topic: capabilities
                .supports_fan()
                .then(|| topic(StateTopic::FanModeState.name())),
            fan_mode_command_topic: exposes(CommandTopic::FanMode)
                .then(|| topic(CommandTopic::FanMode.topic_name())),
        };

        Self {
            discovery_topic: discovery_topic(&context.discovery_prefix, COMPONENT, &unique_id),
            unique_id,
            topic_prefix: context.topic_prefix.clone(),
            discovery,
            state_topics,
            command_topics,
            published: HashMap::new(),
        }
    }

    pub fn discovery(&self) -> &ClimateDiscovery {
        &self.discovery
    }

    /// Command topics this entity listens on, with their full MQTT topic.
    pub fn command_topics(&self) -> Vec<(CommandTopic, String)> {
        self.command_topics
            .iter()
            .map(|command| {
                let topic = entity_topic(&self.topic_prefix, &self.unique_id, command.topic_name());
                (*command, topic)
            })
            .collect()
    }

    /// Publish the discovery config (retained).
    ///
    /// Forgets what was previously published so the next state publish is complete.
    pub async fn write_config<C: MqttClient + ?Sized>(&mut self, client: &C) -> Result<(), MqttError> {
        let payload = serde_json::to_string(&self.discovery)?;
        debug!(topic = %self.discovery_topic, "publishing climate discovery");
        client.publish(&self.discovery_topic, &payload, true).await?;
        self.published.clear();
        Ok(())
    }

    /// Publish state values (retained). Only changed values are sent unless `force`.
    pub async fn publish<C: MqttClient + ?Sized>(
        &mut self,
        client: &C,
        state: &ClimateState,
        force: bool,
    ) -> Result<(), MqttError> {
        for state_topic in &self.state_topics {
            let payload = state_topic.payload(state);
            if !force && self.published.get(state_topic) == Some(&payload) {
                continue;
            }

            let topic = entity_topic(&self.topic_prefix, &self.unique_id, state_topic.name());
            client.publish(&topic, &payload, true).await?;
            self.published.insert(*state_topic, payload);
        }
        Ok(())
    }
}
