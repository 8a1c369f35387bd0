use log::debug;
use mac_address::MacAddress;
use serde_derive::Serialize;

pub const METRIC_PREFIX: &str = "lightpuck";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MetricEvent {
    pub kind: MetricKind,
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
}

/// Sink for counters and gauges. Recording must never block the caller.
pub trait Metrics: Send + Sync {
    fn record(&self, event: MetricEvent);

    fn count(&self, name: &str, value: f64, tags: &[String]) {
        self.record(MetricEvent {
            kind: MetricKind::Counter,
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
        });
    }

    fn increment(&self, name: &str, tags: &[String]) {
        self.count(name, 1.0, tags);
    }

    fn gauge(&self, name: &str, value: f64, tags: &[String]) {
        self.record(MetricEvent {
            kind: MetricKind::Gauge,
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
        });
    }
}

/// Used when no MQTT broker is configured.
#[derive(Debug, Default)]
pub struct LogMetrics;

impl Metrics for LogMetrics {
    fn record(&self, event: MetricEvent) {
        debug!(
            "{}.{} {:?} {} {:?}",
            METRIC_PREFIX, event.name, event.kind, event.value, event.tags
        );
    }
}

/// `puck:<last two octets>`, e.g. `puck:eeff` for `AA:BB:CC:DD:EE:FF`.
pub fn puck_tag(address: &MacAddress) -> String {
    let bytes = address.bytes();
    format!("puck:{:02x}{:02x}", bytes[4], bytes[5])
}
