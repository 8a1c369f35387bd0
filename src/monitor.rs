use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use crate::broadcast::Broadcaster;
use crate::channel::CommandChannel;
use crate::error::ProtocolError;
use crate::metrics::Metrics;
use crate::protocol::RelayClient;

#[derive(Debug, Clone, Copy)]
pub struct MonitorSchedule {
    pub backoff: Duration,
    pub interval: Duration,
}

impl Default for MonitorSchedule {
    fn default() -> Self {
        MonitorSchedule {
            backoff: Duration::from_secs(1),
            interval: Duration::from_secs(300),
        }
    }
}

/// Periodically proves the plug answers status queries.
pub struct HealthMonitor<C> {
    broadcaster: Broadcaster<C>,
    relay: RelayClient,
    metrics: Arc<dyn Metrics>,
    schedule: MonitorSchedule,
}

impl<C: CommandChannel> HealthMonitor<C> {
    pub fn new(
        broadcaster: Broadcaster<C>,
        relay: RelayClient,
        metrics: Arc<dyn Metrics>,
        schedule: MonitorSchedule,
    ) -> Self {
        HealthMonitor {
            broadcaster,
            relay,
            metrics,
            schedule,
        }
    }

    pub async fn run(&self) {
        info!("Monitor started");
        loop {
            self.check_until_healthy().await;
            tokio::time::sleep(self.schedule.interval).await;
        }
    }

    /// Retries until the plug reports a firmware version. Returns the number
    /// of attempts it took.
    pub async fn check_until_healthy(&self) -> u32 {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.check().await {
                Ok(version) => {
                    info!("Monitor passed (firmware {})", version);
                    self.metrics.increment("monitor.passed", &[]);
                    break;
                }
                Err(ProtocolError::MissingField(field)) => {
                    error!("Monitor failed: reply missing {}", field);
                    self.metrics.increment("monitor.failed", &[]);
                }
                Err(err) => {
                    error!("Monitor error: {}", err);
                    self.metrics.increment("monitor.error", &[]);
                }
            }
            tokio::time::sleep(self.schedule.backoff).await;
        }

        info!("Monitor attempts needed: {}", attempts);
        self.metrics
            .gauge("monitor.attempts_needed", attempts as f64, &[]);
        attempts
    }

    async fn check(&self) -> Result<String, ProtocolError> {
        let response = self
            .broadcaster
            .race_send(&self.relay.query_status())
            .await?;
        response
            .firmware_version()
            .map(str::to_string)
            .ok_or(ProtocolError::MissingField("sw_ver"))
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::Mutex;

    use super::*;
    use crate::metrics::testing::RecordingMetrics;
    use crate::protocol::{Command, Response, SysInfo, SystemResponse};

    #[derive(Clone, Copy, Debug)]
    enum Reply {
        Timeout,
        NoVersion,
        Healthy,
    }

    /// Plays back replies in order, then keeps answering healthy.
    struct Script(Mutex<Vec<Reply>>);

    impl CommandChannel for Script {
        fn send(
            &self,
            _command: &Command,
            _timeout: Duration,
        ) -> impl Future<Output = Result<Response, ProtocolError>> + Send {
            let mut replies = self.0.lock().unwrap();
            let reply = if replies.is_empty() {
                Reply::Healthy
            } else {
                replies.remove(0)
            };
            async move {
                let sw_ver = match reply {
                    Reply::Timeout => return Err(ProtocolError::Timeout),
                    Reply::NoVersion => String::new(),
                    Reply::Healthy => "1.0.12".to_string(),
                };
                Ok(Response {
                    system: SystemResponse {
                        get_sysinfo: Some(SysInfo {
                            sw_ver,
                            children: vec![],
                        }),
                        set_relay_state: None,
                    },
                })
            }
        }
    }

    fn monitor(replies: Vec<Reply>, metrics: &Arc<RecordingMetrics>) -> HealthMonitor<Script> {
        HealthMonitor::new(
            Broadcaster::new(Script(Mutex::new(replies)), 1, Duration::from_secs(1)),
            RelayClient::new("8006ABCD", "00"),
            metrics.clone(),
            MonitorSchedule {
                backoff: Duration::from_millis(1),
                interval: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn test_healthy_on_first_attempt() {
        let metrics = Arc::new(RecordingMetrics::default());
        assert_eq!(monitor(vec![], &metrics).check_until_healthy().await, 1);
        assert_eq!(metrics.count_of("monitor.passed"), 1);
        assert_eq!(metrics.values_of("monitor.attempts_needed"), vec![1.0]);
    }

    #[tokio::test]
    async fn test_retries_through_errors_and_missing_version() {
        let metrics = Arc::new(RecordingMetrics::default());
        let replies = vec![Reply::Timeout, Reply::NoVersion, Reply::Timeout];

        assert_eq!(monitor(replies, &metrics).check_until_healthy().await, 4);
        assert_eq!(metrics.count_of("monitor.error"), 2);
        assert_eq!(metrics.count_of("monitor.failed"), 1);
        assert_eq!(metrics.count_of("monitor.passed"), 1);
        assert_eq!(metrics.values_of("monitor.attempts_needed"), vec![4.0]);
    }

    #[tokio::test]
    async fn test_run_keeps_cycling() {
        let metrics = Arc::new(RecordingMetrics::default());
        let monitor = monitor(vec![Reply::Timeout], &metrics);

        let _ = tokio::time::timeout(Duration::from_millis(200), monitor.run()).await;
        assert!(metrics.count_of("monitor.passed") >= 2);
        assert_eq!(metrics.values_of("monitor.attempts_needed")[0], 2.0);
    }
}
