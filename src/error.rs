use std::fmt;

use thiserror::Error;

/// Failures talking to the smart plug.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("timed out waiting for a reply")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("malformed reply: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("no reply from any of {replicas} replicas")]
    NoResponse { replicas: usize },

    #[error("child {0} missing from status reply")]
    MissingChild(String),

    #[error("status reply missing {0}")]
    MissingField(&'static str),
}

/// Reasons an advertisement from a puck is dropped.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("service {0:#06x} not advertised")]
    MissingService(u16),

    #[error("service {service:#06x} carries {actual} bytes, expected {expected}")]
    BadLength {
        service: u16,
        expected: usize,
        actual: usize,
    },

    #[error("invalid pressed flag {0}")]
    InvalidPressed(u8),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleStage {
    Query,
    Command,
}

impl fmt::Display for ToggleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToggleStage::Query => write!(f, "status query"),
            ToggleStage::Command => write!(f, "relay command"),
        }
    }
}

#[derive(Error, Debug)]
#[error("toggle failed during {stage}: {source}")]
pub struct ToggleFailure {
    pub stage: ToggleStage,
    #[source]
    pub source: ProtocolError,
}
