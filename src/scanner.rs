use std::sync::Arc;
use std::time::Duration;

use btleplug::api::bleuuid::BleUuid;
use btleplug::api::{Central as _, CentralEvent, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, PeripheralId};
use futures::StreamExt as _;
use log::{debug, error, info, warn};
use mac_address::MacAddress;

use crate::advertisement::encode_service_data;
use crate::metrics::Metrics;

/// Receives advertisements one at a time, in arrival order.
pub trait DiscoveryHandler: Send {
    fn handle_discovery(&mut self, address: MacAddress, raw: &[u8]);
}

/// Counts consecutive scan windows without any advertisement.
#[derive(Debug)]
pub struct ScanWatchdog {
    max_empty_windows: u32,
    empty_windows: u32,
}

impl ScanWatchdog {
    pub fn new(max_empty_windows: u32) -> Self {
        ScanWatchdog {
            max_empty_windows,
            empty_windows: 0,
        }
    }

    /// Returns true when the scan should be restarted.
    pub fn end_window(&mut self, advertisements: usize) -> bool {
        if advertisements > 0 {
            self.empty_windows = 0;
            return false;
        }
        self.empty_windows += 1;
        if self.empty_windows > self.max_empty_windows {
            self.empty_windows = 0;
            return true;
        }
        false
    }
}

/// Re-serialises btleplug's decoded service data into raw advertisement
/// elements. Only 16-bit service ids survive, in ascending order.
pub fn advertisement_bytes<'a, U: BleUuid + 'a>(
    service_data: impl IntoIterator<Item = (&'a U, &'a Vec<u8>)>,
) -> Vec<u8> {
    let mut entries: Vec<(u16, &[u8])> = service_data
        .into_iter()
        .filter_map(|(uuid, value)| Some((uuid.to_ble_u16()?, value.as_slice())))
        .collect();
    entries.sort_by_key(|(id, _)| *id);
    encode_service_data(entries)
}

pub struct Scanner<H> {
    adapter: Adapter,
    handler: H,
    metrics: Arc<dyn Metrics>,
    window: Duration,
    watchdog: ScanWatchdog,
}

impl<H: DiscoveryHandler> Scanner<H> {
    pub fn new(
        adapter: Adapter,
        handler: H,
        metrics: Arc<dyn Metrics>,
        window: Duration,
        max_empty_windows: u32,
    ) -> Self {
        Scanner {
            adapter,
            handler,
            metrics,
            window,
            watchdog: ScanWatchdog::new(max_empty_windows),
        }
    }

    async fn address_of(&self, id: &PeripheralId) -> Result<MacAddress, btleplug::Error> {
        let peripheral = self.adapter.peripheral(id).await?;
        Ok(MacAddress::new(peripheral.address().into_inner()))
    }

    async fn restart_scan(&self) {
        if let Err(err) = self.adapter.stop_scan().await {
            warn!("Error stopping scan: {:?}", err);
        }
        if let Err(err) = self.adapter.start_scan(ScanFilter::default()).await {
            error!("Error restarting scan: {:?}", err);
        }
    }

    pub async fn stop(&self) {
        if let Err(err) = self.adapter.stop_scan().await {
            warn!("Error stopping scan: {:?}", err);
        }
    }

    /// Feeds advertisements to the handler until the adapter's event stream
    /// ends.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        self.metrics.increment("scan_start", &[]);
        info!("Scan started");

        let mut window = tokio::time::interval(self.window);
        window.tick().await;
        let mut seen = 0usize;

        loop {
            tokio::select! {
                event = events.next() => {
                    match event {
                        Some(CentralEvent::ServiceDataAdvertisement { id, service_data }) => {
                            seen += 1;
                            match self.address_of(&id).await {
                                Ok(address) => {
                                    let raw = advertisement_bytes(&service_data);
                                    self.handler.handle_discovery(address, &raw);
                                }
                                Err(err) => debug!("Unknown peripheral {:?}: {:?}", id, err),
                            }
                        }
                        Some(_) => {}
                        None => {
                            warn!("No more events");
                            break;
                        }
                    }
                }
                _ = window.tick() => {
                    self.metrics.increment("scan", &[]);
                    if self.watchdog.end_window(seen) {
                        self.metrics.increment("scan_not_finding_devices", &[]);
                        warn!("Scanner not finding devices, restarting scan");
                        self.restart_scan().await;
                    }
                    seen = 0;
                }
            }
        }
        Ok(())
    }
}
