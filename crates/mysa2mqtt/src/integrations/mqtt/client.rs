use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::EventLoop;
use rumqttc::MqttOptions;
use rumqttc::Outgoing;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::MqttConfig;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_PACKET_SIZE: usize = 2 * 1024 * 1024;
const REQUEST_CAPACITY: usize = 10;

/// MQTT message received from a subscription
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl MqttMessage {
    /// Payload as text; invalid UTF-8 is replaced rather than rejected.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Failed to serialize discovery payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outbound side of the broker connection, implemented by [`RumqttcClient`]
/// and by a recording mock in tests.
#[async_trait]
pub trait MqttClient: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), MqttError>;

    /// Publish a text payload, optionally retained.
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), MqttError>;
}

#[cfg(test)]
pub use mock::MockMqttClient;


/// Broker connection backed by rumqttc
pub struct RumqttcClient {
    client: AsyncClient,
    event_loop_task: JoinHandle<()>,
}

impl RumqttcClient {
    /// Create a client and start driving its event loop.
    ///
    /// Inbound publishes for subscribed topics are delivered on the returned
    /// receiver. The broker connection is (re)established in the background.
    pub fn connect(config: &MqttConfig) -> (Self, mpsc::UnboundedReceiver<MqttMessage>) {
        let (client, event_loop) = AsyncClient::new(mqtt_options(config), REQUEST_CAPACITY);
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let broker = format!("{}:{}", config.host, config.port);

        let event_loop_task = tokio::spawn(forward_events(event_loop, message_tx, broker));

        (
            Self {
                client,
                event_loop_task,
            },
            message_rx,
        )
    }

    /// Flush queued publishes and close the broker connection.
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        self.client.disconnect().await?;
        if tokio::time::timeout(DISCONNECT_TIMEOUT, &mut self.event_loop_task)
            .await
            .is_err()
        {
            warn!("timed out waiting for the MQTT connection to close");
        }
        Ok(())
    }
}

fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(config.client_name.clone(), config.host.clone(), config.port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
    // Persistent session: the broker keeps command subscriptions across reconnects
    options.set_clean_session(false);

    if let Some(username) = &config.username {
        options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
    }
    options
}

/// Poll the event loop until the client disconnects or nobody reads messages.
async fn forward_events(
    mut event_loop: EventLoop,
    messages: mpsc::UnboundedSender<MqttMessage>,
    broker: String,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = MqttMessage {
                    topic: publish.topic.to_string(),
                    payload: publish.payload.to_vec(),
                };
                if messages.send(message).is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => info!(%broker, "connected to MQTT broker"),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(%broker, error = %e, "MQTT connection error, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
    debug!("MQTT event loop exiting");
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn subscribe(&self, topic: &str) -> Result<(), MqttError> {
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), MqttError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())
            .await?;
        Ok(())
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        self.event_loop_task.abort();
    }
}
