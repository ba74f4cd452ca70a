use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::MqttClient;
use super::client::MqttError;
use super::client::MqttMessage;
use crate::thermostat::CommandTopic;
use crate::thermostat::ThermostatInput;

/// Payload of the Home Assistant birth message.
const BIRTH_PAYLOAD: &str = "online";

struct Route {
    command: CommandTopic,
    inbox: mpsc::Sender<ThermostatInput>,
}

/// Routes inbound MQTT messages to the thermostat that owns the topic.
///
/// Also watches the Home Assistant status topic and asks every thermostat to
/// republish its discovery configs when Home Assistant comes back online.
pub struct CommandRouter<C: MqttClient> {
    client: Arc<C>,
    status_topic: String,
    routes: HashMap<String, Route>,
    inboxes: Vec<mpsc::Sender<ThermostatInput>>,
}

impl<C: MqttClient> CommandRouter<C> {
    pub fn new(client: Arc<C>, discovery_prefix: &str) -> Self {
        Self {
            client,
            status_topic: format!("{discovery_prefix}/status"),
            routes: HashMap::new(),
            inboxes: Vec::new(),
        }
    }

    /// Register the command topics of one thermostat.
    pub fn register(
        &mut self,
        commands: Vec<(CommandTopic, String)>,
        inbox: mpsc::Sender<ThermostatInput>,
    ) {
        for (command, topic) in commands {
            self.routes.insert(
                topic,
                Route {
                    command,
                    inbox: inbox.clone(),
                },
            );
        }
        self.inboxes.push(inbox);
    }

    /// Subscribe to every registered command topic and the birth topic.
    pub async fn subscribe(&self) -> Result<(), MqttError> {
        for topic in self.routes.keys() {
            debug!(topic, "subscribing to command topic");
            self.client.subscribe(topic).await?;
        }
        self.client.subscribe(&self.status_topic).await
    }

    /// Forward one inbound message to its thermostat. Never waits on a busy
    /// thermostat: a full inbox drops the message.
    pub fn dispatch(&self, message: MqttMessage) {
        let payload = message.payload_str();

        if message.topic == self.status_topic {
            if payload == BIRTH_PAYLOAD {
                info!("Home Assistant is online, republishing discovery");
                for inbox in &self.inboxes {
                    deliver(inbox, ThermostatInput::Republish, &message.topic);
                }
            }
            return;
        }

        let Some(route) = self.routes.get(&message.topic) else {
            debug!(topic = %message.topic, "ignoring message on unknown topic");
            return;
        };

        debug!(topic = %message.topic, %payload, "received command");
        let input = ThermostatInput::Command {
            topic: route.command,
            payload: payload.into_owned(),
        };
        deliver(&route.inbox, input, &message.topic);
    }

    /// Dispatch inbound messages until the stream ends or shutdown is signalled.
    pub async fn run(
        self,
        mut messages: mpsc::UnboundedReceiver<MqttMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                message = messages.recv() => match message {
                    Some(message) => self.dispatch(message),
                    None => {
                        warn!("MQTT message stream closed");
                        break;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }
        debug!("command router exiting");
    }
}

fn deliver(inbox: &mpsc::Sender<ThermostatInput>, input: ThermostatInput, topic: &str) {
    match inbox.try_send(input) {
        Ok(()) => {}
        Err(TrySendError::Full(input)) => {
            warn!(topic, ?input, "thermostat is busy, dropping message");
        }
        Err(TrySendError::Closed(_)) => {
            warn!(topic, "thermostat is no longer running, dropping message");
        }
    }
}
