use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use btleplug::api::Manager as _;
use btleplug::platform::Manager;
use clap::Parser;
use log::{info, warn};
use tokio::sync::mpsc;

mod advertisement;
mod broadcast;
mod channel;
mod cipher;
mod config;
mod debounce;
mod error;
mod manager;
mod messages;
mod metrics;
mod monitor;
mod mqtt;
mod protocol;
mod puck;
mod scanner;
mod toggle;

use broadcast::Broadcaster;
use channel::UdpCommandChannel;
use metrics::{LogMetrics, Metrics};

#[derive(Parser, Debug)]
#[command(version, about = "Toggles a smart plug relay from a BLE light puck")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "light_puck=info".to_string());
    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .init();

    let cli = Cli::parse();
    let config = config::AppConfig::load(&cli.config)?;

    let puck_addresses = config.puck_addresses();
    if puck_addresses.is_empty() {
        warn!("No light puck addresses configured, nothing will be toggled");
    }
    info!("Pucks: {:?}", puck_addresses);

    let mqtt_client = match config.mqtt.as_ref() {
        Some(mqtt_config) => {
            let (client, mut eventloop) = mqtt::MqttMetrics::new(mqtt_config);
            tokio::spawn(async move {
                mqtt::MqttMetrics::event_loop(&mut eventloop).await;
            });
            Some(client)
        }
        None => None,
    };
    let metrics: Arc<dyn Metrics> = match &mqtt_client {
        Some(client) => Arc::new(client.clone()),
        None => Arc::new(LogMetrics),
    };

    let endpoint = config.device_endpoint();
    let target = tokio::net::lookup_host(endpoint.as_str())
        .await
        .with_context(|| format!("resolving {}", endpoint))?
        .next()
        .with_context(|| format!("no address for {}", endpoint))?;
    info!("Controlling plug at {}", target);
    let channel = UdpCommandChannel::new(target);
    let relay = config.relay_client();

    let (replicas, timeout) = config.blast_settings();
    let controller = Arc::new(toggle::ToggleController::new(
        Broadcaster::new(channel.clone(), replicas, timeout),
        relay.clone(),
        metrics.clone(),
    ));

    let (monitor_replicas, monitor_timeout, schedule) = config.monitor_settings();
    let monitor = monitor::HealthMonitor::new(
        Broadcaster::new(channel, monitor_replicas, monitor_timeout),
        relay,
        metrics.clone(),
        schedule,
    );

    let (tx, rx) = mpsc::channel(config.toggle_queue_size());
    let handler = puck::PuckHandler::new(puck_addresses, metrics.clone(), tx);

    let bt_manager = Manager::new().await?;
    let central = bt_manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .context("no bluetooth adapter found")?;

    let scanner = scanner::Scanner::new(
        central,
        handler,
        metrics,
        config.scan_window(),
        config.max_empty_windows(),
    );

    let core = manager::Manager::new(
        scanner,
        toggle::ToggleDispatcher::new(controller),
        rx,
        monitor,
    );
    let result = core.run_loop().await;

    if let Some(client) = &mqtt_client {
        client.disconnect().await?;
    }

    result
}
