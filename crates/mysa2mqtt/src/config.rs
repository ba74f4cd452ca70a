//! Configuration file parsing and structures.
//!
//! mysa2mqtt reads a TOML file with one table per concern. Secrets may be
//! left out of the file and supplied on the command line or through the
//! environment instead, see [`Overrides`].

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing_subscriber::filter::{LevelFilter, Targets};

use crate::integrations::mqtt::MqttConfig;
use crate::integrations::mysa::DEFAULT_BASE_URL;
use crate::thermostat::TemperatureUnit;

/// Config file read when no path is given explicitly.
pub const DEFAULT_CONFIG_PATH: &str = "mysa2mqtt.toml";

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub logging: LoggingConfig,
    pub mqtt: MqttConfig,
    pub mysa: MysaConfig,
    pub thermostat: ThermostatConfig,
}

#[derive(
    Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    pub format: LogFormat,

    /// Per-target levels, e.g. `rumqttc = "warn"`
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the subscriber filter: the global level plus per-target overrides.
    pub fn targets(&self) -> Targets {
        Targets::new()
            .with_default(LevelFilter::from(self.level))
            .with_targets(
                self.overrides
                    .iter()
                    .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
            )
    }
}

/// Mysa account and API settings
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MysaConfig {
    pub username: Option<String>,

    /// Only needed when no valid session is stored
    pub password: Option<String>,

    pub session_file: PathBuf,
    pub api_base_url: String,

    /// Period of the realtime state poll
    pub poll_interval_secs: u64,
}

impl Default for MysaConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            session_file: PathBuf::from("session.json"),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_secs: 30,
        }
    }
}

impl MysaConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Username and password for a fresh login.
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        let username = self
            .username
            .as_deref()
            .ok_or(ConfigError::MissingCredential("mysa.username"))?;
        let password = self
            .password
            .as_deref()
            .ok_or(ConfigError::MissingCredential("mysa.password"))?;
        Ok((username, password))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThermostatConfig {
    pub temperature_unit: TemperatureUnit,
}

/// Values given on the command line or in the environment. Each one that is
/// set replaces the corresponding file value.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
    pub mqtt_host: Option<String>,
    pub mqtt_port: Option<u16>,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_client_name: Option<String>,
    pub mqtt_topic_prefix: Option<String>,
    pub mysa_username: Option<String>,
    pub mysa_password: Option<String>,
    pub mysa_session_file: Option<PathBuf>,
    pub temperature_unit: Option<TemperatureUnit>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Load an explicitly named file, or the default one when it exists.
    ///
    /// Without a config file every setting comes from defaults and overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_file_or_default(DEFAULT_CONFIG_PATH),
        }
    }

    /// Like [`Config::from_file`], but a missing file yields the defaults.
    pub fn from_file_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::from_file(path) {
            Err(ConfigError::Io(_, e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            result => result,
        }
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
        if let Some(host) = overrides.mqtt_host {
            self.mqtt.host = host;
        }
        if let Some(port) = overrides.mqtt_port {
            self.mqtt.port = port;
        }
        if let Some(username) = overrides.mqtt_username {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = overrides.mqtt_password {
            self.mqtt.password = Some(password);
        }
        if let Some(client_name) = overrides.mqtt_client_name {
            self.mqtt.client_name = client_name;
        }
        if let Some(topic_prefix) = overrides.mqtt_topic_prefix {
            self.mqtt.topic_prefix = topic_prefix;
        }
        if let Some(username) = overrides.mysa_username {
            self.mysa.username = Some(username);
        }
        if let Some(password) = overrides.mysa_password {
            self.mysa.password = Some(password);
        }
        if let Some(session_file) = overrides.mysa_session_file {
            self.mysa.session_file = session_file;
        }
        if let Some(unit) = overrides.temperature_unit {
            self.thermostat.temperature_unit = unit;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required setting `{0}`")]
    MissingCredential(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.topic_prefix, "mysa2mqtt");
        assert_eq!(config.mysa.session_file, PathBuf::from("session.json"));
        assert_eq!(config.mysa.api_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.mysa.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.thermostat.temperature_unit, TemperatureUnit::Celsius);
    }

    #[test]
    fn test_parse_logging_overrides() {
        let toml = r#"
            [logging]
            level = "debug"
            format = "json"

            [logging.overrides]
            rumqttc = "warn"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.overrides.get("rumqttc"), Some(&LogLevel::Warn));

        let targets = config.logging.targets();
        assert!(targets.would_enable("mysa2mqtt", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("rumqttc::state", &tracing::Level::INFO));
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let toml = r#"
            [mqtt]
            password = "from-file"

            [mysa]
            username = "file@example.com"

            [thermostat]
            temperature_unit = "F"
        "#;

        let mut config: Config = toml::from_str(toml).unwrap();
        config.apply_overrides(Overrides {
            mqtt_password: Some("from-env".to_string()),
            mysa_password: Some("secret".to_string()),
            log_level: Some(LogLevel::Trace),
            ..Overrides::default()
        });

        assert_eq!(config.mqtt.password.as_deref(), Some("from-env"));
        assert_eq!(config.mysa.username.as_deref(), Some("file@example.com"));
        assert_eq!(config.logging.level, LogLevel::Trace);
        assert_eq!(config.thermostat.temperature_unit, TemperatureUnit::Fahrenheit);
        assert_eq!(
            config.mysa.credentials().unwrap(),
            ("file@example.com", "secret")
        );
    }

    #[test]
    fn test_missing_password_is_reported() {
        let config: Config = toml::from_str("[mysa]\nusername = \"me\"").unwrap();
        assert!(matches!(
            config.mysa.credentials(),
            Err(ConfigError::MissingCredential("mysa.password"))
        ));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[mqtt]\nbroker = \"localhost\"");
        assert!(result.is_err());
    }
}
