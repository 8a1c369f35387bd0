use log::{error, info};
use tokio::sync::mpsc;

use crate::channel::UdpCommandChannel;
use crate::messages::PressEvent;
use crate::monitor::HealthMonitor;
use crate::puck::PuckHandler;
use crate::scanner::Scanner;
use crate::toggle::ToggleDispatcher;

/// Owns the long-running loops: the scan loop on the current task, the
/// toggle dispatcher and the health monitor on their own tasks.
pub struct Manager {
    scanner: Scanner<PuckHandler>,
    dispatcher: ToggleDispatcher<UdpCommandChannel>,
    presses: mpsc::Receiver<PressEvent>,
    monitor: HealthMonitor<UdpCommandChannel>,
}

impl Manager {
    pub fn new(
        scanner: Scanner<PuckHandler>,
        dispatcher: ToggleDispatcher<UdpCommandChannel>,
        presses: mpsc::Receiver<PressEvent>,
        monitor: HealthMonitor<UdpCommandChannel>,
    ) -> Self {
        Manager {
            scanner,
            dispatcher,
            presses,
            monitor,
        }
    }

    pub async fn run_loop(self) -> anyhow::Result<()> {
        let Manager {
            mut scanner,
            dispatcher,
            presses,
            monitor,
        } = self;

        let dispatch_handle = tokio::spawn(dispatcher.run(presses));
        let monitor_handle = tokio::spawn(async move { monitor.run().await });

        let result = tokio::select! {
            result = scanner.run() => {
                if let Err(err) = &result {
                    error!("Error handling BTLE events: {:?}", err);
                }
                result
            }
            signal = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                signal.map_err(anyhow::Error::from)
            }
        };

        scanner.stop().await;
        monitor_handle.abort();
        dispatch_handle.abort();
        info!("Exiting manager event loop");

        result
    }
}
