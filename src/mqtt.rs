use std::time::Duration;

use log::{debug, error, warn};
use rumqttc::{MqttOptions, QoS};

use crate::config;
use crate::metrics::{METRIC_PREFIX, MetricEvent, Metrics};

/// Publishes metric events to an MQTT broker.
#[derive(Debug, Clone)]
pub struct MqttMetrics {
    client: rumqttc::AsyncClient,
    publisher_id: String,
    topic_path: String,
}

impl MqttMetrics {
    pub fn new(config: &config::MqttConfig) -> (Self, rumqttc::EventLoop) {
        let publisher_id = config
            .publisher_id
            .clone()
            .unwrap_or_else(|| "light-puck".to_string());

        let mut mqttoptions = MqttOptions::new(
            publisher_id.clone(),
            config.host.clone(),
            config.port.unwrap_or(1883),
        );

        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.unwrap_or(5)));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            mqttoptions.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(mqttoptions, 64);

        (
            MqttMetrics {
                client,
                publisher_id,
                topic_path: config.topic_path.clone().unwrap_or("monitor".to_string()),
            },
            eventloop,
        )
    }

    fn topic(&self, name: &str) -> String {
        format!(
            "{}/{}/metrics/{}",
            self.topic_path,
            self.publisher_id,
            sanitize_name(name)
        )
    }

    /// Drives the connection. Publishes only leave the process while this runs.
    pub async fn event_loop(eventloop: &mut rumqttc::EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    debug!("Connection acknowledged");
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error polling MQTT event loop: {:?}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        debug!("Disconnecting MQTT client");
        self.client.disconnect().await
    }
}

impl Metrics for MqttMetrics {
    fn record(&self, event: MetricEvent) {
        let name = format!("{}.{}", METRIC_PREFIX, event.name);
        let payload = match serde_json::to_string(&MetricEvent {
            name: name.clone(),
            ..event
        }) {
            Ok(payload) => payload,
            Err(err) => {
                error!("Error serializing metric {}: {:?}", name, err);
                return;
            }
        };

        if let Err(err) = self
            .client
            .try_publish(self.topic(&name), QoS::AtMostOnce, false, payload)
        {
            warn!("Dropping metric {}: {:?}", name, err);
        }
    }
}

fn sanitize_name(name: &str) -> String {
    // Keep dots so metric names read naturally in the topic tree
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
}
