use serde::Deserialize;

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_client_name() -> String {
    "mysa2mqtt".to_string()
}

fn default_topic_prefix() -> String {
    "mysa2mqtt".to_string()
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

/// Configuration for the MQTT broker connection and topic layout
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// MQTT broker hostname or IP address
    #[serde(default = "default_host")]
    pub host: String,

    /// MQTT broker port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional username for authentication
    pub username: Option<String>,

    /// Optional password for authentication
    pub password: Option<String>,

    /// MQTT client ID
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Prefix of every entity state and command topic
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Home Assistant discovery prefix (default: "homeassistant")
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            client_name: default_client_name(),
            topic_prefix: default_topic_prefix(),
            discovery_prefix: default_discovery_prefix(),
        }
    }
}
