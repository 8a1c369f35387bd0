use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, bail};
use log::info;
use mac_address::MacAddress;
use serde_derive::Deserialize;

use crate::broadcast::{DEFAULT_REPLICAS, DEFAULT_TIMEOUT};
use crate::channel::DEFAULT_PORT;
use crate::monitor::MonitorSchedule;
use crate::protocol::RelayClient;

pub const ENV_DEVICE_ADDRESS: &str = "LIGHT_IP_ADDRESS";
pub const ENV_DEVICE_ID: &str = "LIGHT_CHILD_ID";
pub const ENV_PUCK_ADDRESSES: &str = "LIGHT_PUCK_MAC_ADDRESSES";

#[derive(Deserialize, Debug, Default, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub pucks: PuckConfig,
    pub blast: Option<BlastConfig>,
    pub monitor: Option<MonitorConfig>,
    pub scan: Option<ScanConfig>,
    pub toggle: Option<ToggleConfig>,
    pub mqtt: Option<MqttConfig>,
}

/// The smart plug being switched.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct DeviceConfig {
    /// Host name or IP address
    pub address: Option<String>,
    pub port: Option<u16>,
    pub device_id: Option<String>,
    /// Appended to `device_id` to address one outlet
    pub child_suffix: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct PuckConfig {
    pub addresses: Option<Vec<MacAddress>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct BlastConfig {
    pub replicas: Option<usize>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct MonitorConfig {
    pub replicas: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub backoff_seconds: Option<u64>,
    pub interval_seconds: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ScanConfig {
    pub window_seconds: Option<u64>,
    pub max_empty_windows: Option<u32>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ToggleConfig {
    pub queue_size: Option<usize>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    pub topic_path: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}

impl AppConfig {
    /// Reads the TOML file if there is one, then layers the environment on
    /// top. A missing file is fine as long as the environment fills the gaps.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::de::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            info!("No config file at {}, using environment", path.display());
            AppConfig::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(address) = lookup(ENV_DEVICE_ADDRESS) {
            self.device.address = Some(address);
        }
        if let Some(device_id) = lookup(ENV_DEVICE_ID) {
            self.device.device_id = Some(device_id);
        }
        if let Some(addresses) = lookup(ENV_PUCK_ADDRESSES) {
            let parsed = addresses
                .split(',')
                .map(str::trim)
                .filter(|address| !address.is_empty())
                .map(|address| {
                    address
                        .parse::<MacAddress>()
                        .with_context(|| format!("invalid puck address {:?}", address))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            self.pucks.addresses = Some(parsed);
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.device.address.as_deref().is_none_or(str::is_empty) {
            bail!("device address is required ([device] address or {ENV_DEVICE_ADDRESS})");
        }
        if self.device.device_id.as_deref().is_none_or(str::is_empty) {
            bail!("device id is required ([device] device_id or {ENV_DEVICE_ID})");
        }
        Ok(())
    }

    /// `host:port` of the plug, not yet resolved.
    pub fn device_endpoint(&self) -> String {
        format!(
            "{}:{}",
            self.device.address.as_deref().unwrap_or_default(),
            self.device.port.unwrap_or(DEFAULT_PORT)
        )
    }

    pub fn relay_client(&self) -> RelayClient {
        RelayClient::new(
            self.device.device_id.clone().unwrap_or_default(),
            self.device
                .child_suffix
                .clone()
                .unwrap_or_else(|| "00".to_string()),
        )
    }

    pub fn puck_addresses(&self) -> Vec<MacAddress> {
        self.pucks.addresses.clone().unwrap_or_default()
    }

    pub fn blast_settings(&self) -> (usize, Duration) {
        let blast = self.blast.clone().unwrap_or_default();
        (
            blast.replicas.unwrap_or(DEFAULT_REPLICAS),
            blast
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        )
    }

    pub fn monitor_settings(&self) -> (usize, Duration, MonitorSchedule) {
        let monitor = self.monitor.clone().unwrap_or_default();
        let defaults = MonitorSchedule::default();
        (
            monitor.replicas.unwrap_or(1),
            Duration::from_secs(monitor.timeout_seconds.unwrap_or(10)),
            MonitorSchedule {
                backoff: monitor
                    .backoff_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.backoff),
                interval: monitor
                    .interval_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.interval),
            },
        )
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_secs(
            self.scan
                .as_ref()
                .and_then(|scan| scan.window_seconds)
                .unwrap_or(10),
        )
    }

    pub fn max_empty_windows(&self) -> u32 {
        self.scan
            .as_ref()
            .and_then(|scan| scan.max_empty_windows)
            .unwrap_or(2)
    }

    pub fn toggle_queue_size(&self) -> usize {
        self.toggle
            .as_ref()
            .and_then(|toggle| toggle.queue_size)
            .unwrap_or(16)
            .max(1)
    }
}
