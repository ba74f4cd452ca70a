use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::Instrument;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use mysa2mqtt::config::DEFAULT_CONFIG_PATH;
use mysa2mqtt::config::LogFormat;
use mysa2mqtt::config::LoggingConfig;
use mysa2mqtt::config::Overrides;
use mysa2mqtt::integrations::mqtt::CommandRouter;
use mysa2mqtt::integrations::mqtt::DeviceInfo;
use mysa2mqtt::integrations::mqtt::EntityContext;
use mysa2mqtt::integrations::mqtt::OriginInfo;
use mysa2mqtt::integrations::mqtt::RumqttcClient;
use mysa2mqtt::integrations::mysa::HttpMysaClient;
use mysa2mqtt::session::load_session;
use mysa2mqtt::session::save_session;
use mysa2mqtt::thermostat::TemperatureUnit;
use mysa2mqtt::thermostat::Thermostat;
use mysa2mqtt::Config;
use mysa2mqtt::LogLevel;

const INPUT_CAPACITY: usize = 32;

/// Expose Mysa thermostats to Home Assistant over MQTT
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file [default: mysa2mqtt.toml, when present]
    #[arg(short, long, env = "M2M_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "M2M_LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,

    #[arg(long, env = "M2M_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    #[arg(long, env = "M2M_MQTT_HOST")]
    mqtt_host: Option<String>,

    #[arg(long, env = "M2M_MQTT_PORT")]
    mqtt_port: Option<u16>,

    #[arg(long, env = "M2M_MQTT_USERNAME")]
    mqtt_username: Option<String>,

    #[arg(long, env = "M2M_MQTT_PASSWORD", hide_env_values = true)]
    mqtt_password: Option<String>,

    #[arg(long, env = "M2M_MQTT_CLIENT_NAME")]
    mqtt_client_name: Option<String>,

    #[arg(long, env = "M2M_MQTT_TOPIC_PREFIX")]
    mqtt_topic_prefix: Option<String>,

    #[arg(long, env = "M2M_MYSA_USERNAME")]
    mysa_username: Option<String>,

    #[arg(long, env = "M2M_MYSA_PASSWORD", hide_env_values = true)]
    mysa_password: Option<String>,

    #[arg(long, env = "M2M_MYSA_SESSION_FILE")]
    mysa_session_file: Option<PathBuf>,

    #[arg(long, env = "M2M_TEMPERATURE_UNIT", value_enum)]
    temperature_unit: Option<TemperatureUnit>,
}

impl From<Args> for Overrides {
    fn from(args: Args) -> Self {
        Self {
            log_level: args.log_level,
            log_format: args.log_format,
            mqtt_host: args.mqtt_host,
            mqtt_port: args.mqtt_port,
            mqtt_username: args.mqtt_username,
            mqtt_password: args.mqtt_password,
            mqtt_client_name: args.mqtt_client_name,
            mqtt_topic_prefix: args.mqtt_topic_prefix,
            mysa_username: args.mysa_username,
            mysa_password: args.mysa_password,
            mysa_session_file: args.mysa_session_file,
            temperature_unit: args.temperature_unit,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config_path = args.config.clone();

    let mut config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mysa2mqtt: {e}");
            return ExitCode::FAILURE;
        }
    };
    config.apply_overrides(args.into());

    init_logging(&config.logging);
    let config_file = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    tracing::info!(config = %config_file.display(), "mysa2mqtt starting");

    match run(config).await {
        Ok(()) => {
            tracing::info!("mysa2mqtt shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format_args!("{e:#}"), "mysa2mqtt failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let pretty = (logging.format == LogFormat::Pretty).then(tracing_subscriber::fmt::layer);
    let json = (logging.format == LogFormat::Json)
        .then(|| tracing_subscriber::fmt::layer().json().with_current_span(true));

    tracing_subscriber::registry()
        .with(pretty)
        .with(json)
        .with(logging.targets())
        .init();
}

async fn run(config: Config) -> anyhow::Result<()> {
    let session = load_session(&config.mysa.session_file).await;
    let mysa = HttpMysaClient::builder()
        .base_url(config.mysa.api_base_url.clone())
        .poll_interval(config.mysa.poll_interval())
        .session(session)
        .build()
        .context("failed to create Mysa client")?;

    let mut session_changes = mysa.session_changes();
    let session_file = config.mysa.session_file.clone();
    tokio::spawn(async move {
        while session_changes.changed().await.is_ok() {
            let session = session_changes.borrow_and_update().clone();
            if let Err(e) = save_session(session.as_ref(), &session_file).await {
                tracing::warn!(error = %e, path = %session_file.display(), "failed to persist session");
            }
        }
    });

    if !mysa.is_authenticated() {
        let (username, password) = config.mysa.credentials()?;
        tracing::info!(username, "logging in to Mysa");
        mysa.login(username, password)
            .await
            .context("failed to log in to Mysa")?;
    }

    let (devices, firmwares) = tokio::try_join!(mysa.get_devices(), mysa.get_device_firmwares())
        .context("failed to fetch devices")?;

    let mut devices: Vec<_> = devices.devices_obj.into_values().collect();
    devices.sort_by(|a, b| a.id.cmp(&b.id));
    tracing::info!(count = devices.len(), "discovered devices");

    let mut serial_numbers = Vec::with_capacity(devices.len());
    for device in &devices {
        match mysa.get_device_serial_number(&device.id).await {
            Ok(serial) => serial_numbers.push(Some(serial)),
            Err(e) => {
                tracing::warn!(device_id = %device.id, error = %e, "failed to fetch serial number");
                serial_numbers.push(None);
            }
        }
    }

    let (mqtt, messages) = RumqttcClient::connect(&config.mqtt);
    let mqtt = Arc::new(mqtt);
    let mysa = Arc::new(mysa);
    let unit = config.thermostat.temperature_unit;

    let mut router = CommandRouter::new(mqtt.clone(), &config.mqtt.discovery_prefix);
    let mut thermostats = Vec::with_capacity(devices.len());
    for (device, serial) in devices.into_iter().zip(serial_numbers) {
        let firmware = firmwares
            .firmware
            .get(&device.id)
            .map(|firmware| firmware.installed_version.as_str());
        let context = EntityContext {
            device_id: device.id.clone(),
            topic_prefix: config.mqtt.topic_prefix.clone(),
            discovery_prefix: config.mqtt.discovery_prefix.clone(),
            device: DeviceInfo::from_device(&device, firmware, serial.as_deref()),
            origin: OriginInfo::bridge(),
        };

        let thermostat = Thermostat::new(mysa.clone(), mqtt.clone(), device, &context, unit);
        let (inbox, inputs) = mpsc::channel(INPUT_CAPACITY);
        router.register(thermostat.command_topics(), inbox);
        thermostats.push((thermostat, inputs));
    }

    router
        .subscribe()
        .await
        .context("failed to subscribe to command topics")?;

    for index in 0..thermostats.len() {
        let (thermostat, _) = &mut thermostats[index];
        let span = tracing::info_span!("thermostat", device_id = %thermostat.device().id);
        let device_id = thermostat.device().id.clone();

        if let Err(e) = thermostat.start().instrument(span).await {
            for (started, _) in &mut thermostats[..index] {
                if let Err(e) = started.stop().await {
                    tracing::warn!(device_id = %started.device().id, error = %e, "failed to stop thermostat");
                }
            }
            return Err(e).with_context(|| format!("failed to start thermostat {device_id}"));
        }
    }
    tracing::info!("all thermostats started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();
    for (thermostat, inputs) in thermostats {
        let span = tracing::info_span!("thermostat", device_id = %thermostat.device().id);
        tasks.spawn(thermostat.run(inputs, shutdown_rx.clone()).instrument(span));
    }
    tasks.spawn(router.run(messages, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("received shutdown signal, stopping thermostats");

    // Receivers only go away when their task has already finished
    let _ = shutdown_tx.send(true);
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            tracing::warn!(error = %e, "task ended abnormally");
        }
    }

    if let Some(mut mqtt) = Arc::into_inner(mqtt) {
        mqtt.disconnect()
            .await
            .context("failed to disconnect from MQTT broker")?;
    }

    Ok(())
}
