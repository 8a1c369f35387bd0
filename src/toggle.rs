use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info};
use mac_address::MacAddress;
use tokio::sync::{Mutex, mpsc};

use crate::broadcast::Broadcaster;
use crate::channel::CommandChannel;
use crate::error::{ToggleFailure, ToggleStage};
use crate::messages::PressEvent;
use crate::metrics::Metrics;
use crate::protocol::RelayClient;

/// Flips the relay: read its state, then command the opposite.
pub struct ToggleController<C> {
    broadcaster: Broadcaster<C>,
    relay: RelayClient,
    metrics: Arc<dyn Metrics>,
}

impl<C: CommandChannel> ToggleController<C> {
    pub fn new(broadcaster: Broadcaster<C>, relay: RelayClient, metrics: Arc<dyn Metrics>) -> Self {
        ToggleController {
            broadcaster,
            relay,
            metrics,
        }
    }

    /// Returns the state the relay was commanded into.
    pub async fn toggle(&self) -> Result<bool, ToggleFailure> {
        info!("Toggle start");
        let result = self.query_then_command().await;
        if let Err(err) = &result {
            self.metrics.increment("toggle_error", &[]);
            error!("Toggle error: {}", err);
        }
        result
    }

    async fn query_then_command(&self) -> Result<bool, ToggleFailure> {
        let status = self
            .broadcaster
            .race_send(&self.relay.query_status())
            .await
            .map_err(|source| ToggleFailure {
                stage: ToggleStage::Query,
                source,
            })?;
        self.metrics.increment("toggle_info", &[]);

        let on = self
            .relay
            .relay_state(&status)
            .map_err(|source| ToggleFailure {
                stage: ToggleStage::Query,
                source,
            })?;
        debug!("Light on: {}", on);

        let target = !on;
        info!("Toggle {}", if target { "on" } else { "off" });
        self.broadcaster
            .race_send(&self.relay.set_relay_state(target))
            .await
            .map_err(|source| ToggleFailure {
                stage: ToggleStage::Command,
                source,
            })?;
        self.metrics
            .increment(if target { "toggle_on" } else { "toggle_off" }, &[]);

        Ok(target)
    }

    /// Tries twice. A second failure is recorded and swallowed.
    pub async fn toggle_with_retry(&self) {
        if self.toggle().await.is_ok() {
            return;
        }
        if self.toggle().await.is_err() {
            self.metrics.increment("toggle_retry_error", &[]);
            error!("Toggle retry error");
        }
    }
}

/// Runs toggles off the discovery path, one at a time per puck.
pub struct ToggleDispatcher<C> {
    controller: Arc<ToggleController<C>>,
    in_flight: HashMap<MacAddress, Arc<Mutex<()>>>,
}

impl<C: CommandChannel + 'static> ToggleDispatcher<C> {
    pub fn new(controller: Arc<ToggleController<C>>) -> Self {
        ToggleDispatcher {
            controller,
            in_flight: HashMap::new(),
        }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<PressEvent>) {
        while let Some(event) = rx.recv().await {
            debug!(
                "Dispatching toggle for {} ({} presses)",
                event.address, event.presses
            );
            let lock = self.in_flight.entry(event.address).or_default().clone();
            let controller = self.controller.clone();
            tokio::spawn(async move {
                let _serial = lock.lock().await;
                controller.toggle_with_retry().await;
            });
        }
        debug!("Press queue closed");
    }
}
