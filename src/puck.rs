use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, error, info, warn};
use mac_address::MacAddress;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::advertisement::{self, PuckTelemetry};
use crate::debounce::ButtonDebouncer;
use crate::error::TelemetryError;
use crate::messages::PressEvent;
use crate::metrics::{Metrics, puck_tag};
use crate::scanner::DiscoveryHandler;

/// Scan-side half of the pipeline: decodes puck advertisements and queues
/// presses for the toggle dispatcher.
pub struct PuckHandler {
    allowed: HashSet<MacAddress>,
    debouncer: ButtonDebouncer,
    metrics: Arc<dyn Metrics>,
    presses: mpsc::Sender<PressEvent>,
}

impl PuckHandler {
    pub fn new(
        allowed: impl IntoIterator<Item = MacAddress>,
        metrics: Arc<dyn Metrics>,
        presses: mpsc::Sender<PressEvent>,
    ) -> Self {
        PuckHandler {
            allowed: allowed.into_iter().collect(),
            debouncer: ButtonDebouncer::new(),
            metrics,
            presses,
        }
    }

    fn queue_press(&self, event: PressEvent, tags: &[String]) {
        match self.presses.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.metrics.increment("toggle_dropped", tags);
                warn!("Toggle queue full, dropping press from {}", event.address);
            }
            Err(TrySendError::Closed(_)) => {
                error!("Toggle dispatcher gone, dropping press from {}", event.address);
            }
        }
    }
}

impl DiscoveryHandler for PuckHandler {
    fn handle_discovery(&mut self, address: MacAddress, raw: &[u8]) {
        if !self.allowed.contains(&address) {
            return;
        }

        let tags = vec![puck_tag(&address)];
        self.metrics.increment("discovery", &tags);
        debug!("Light puck discovery: {}", address);

        let telemetry = match PuckTelemetry::from_service_data(&advertisement::parse(raw)) {
            Ok(telemetry) => telemetry,
            Err(err) => {
                self.metrics.increment("parse_data_failed", &tags);
                warn!(
                    "Light puck failed to parse data: address={} raw_data_hex={} ({})",
                    address,
                    hex(raw),
                    err
                );
                return;
            }
        };

        info!(
            "Light puck data: address={} battery={} temperature={:.1} button_pressed={} button_press_count={}",
            address,
            telemetry.sensor.battery_percent,
            telemetry.sensor.temperature_f,
            telemetry.button.pressed,
            telemetry.button.counter
        );
        self.metrics
            .gauge("battery", telemetry.sensor.battery_percent as f64, &tags);
        self.metrics
            .gauge("temperature", telemetry.sensor.temperature_f as f64, &tags);

        match self.debouncer.process(address, telemetry.button) {
            Ok(None) => {}
            Ok(Some(presses)) => {
                self.metrics.count("button_pressed", presses as f64, &tags);
                self.queue_press(PressEvent { address, presses }, &tags);
            }
            Err(err @ TelemetryError::InvalidPressed(_)) => {
                self.metrics.increment("invalid_button_pressed", &tags);
                warn!("Invalid button pressed value from {}: {}", address, err);
            }
            Err(err @ TelemetryError::ChecksumMismatch { .. }) => {
                self.metrics.increment("invalid_button_checksum", &tags);
                warn!("Invalid button checksum value from {}: {}", address, err);
            }
            Err(err) => {
                self.metrics.increment("parse_data_failed", &tags);
                warn!("Light puck failed to parse data from {}: {}", address, err);
            }
        }
    }
}

fn hex(raw: &[u8]) -> String {
    raw.iter().map(|b| format!("{:02x}", b)).collect()
}
