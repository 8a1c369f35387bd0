//! Request and reply shapes of the smart plug's JSON control protocol.

use serde_derive::{Deserialize, Serialize};

use crate::cipher;
use crate::error::ProtocolError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Command {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    pub system: SystemCommand,
}

/// Addresses one outlet of a multi-outlet device.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Context {
    pub child_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SystemCommand {
    GetSysinfo {},
    SetRelayState { state: u8 },
}

impl Command {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(cipher::encode(&serde_json::to_vec(self)?))
    }

    #[cfg(test)]
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(&cipher::decode_latin1(bytes))?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Response {
    #[serde(default)]
    pub system: SystemResponse,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SystemResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_sysinfo: Option<SysInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_relay_state: Option<Ack>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SysInfo {
    #[serde(default)]
    pub sw_ver: String,
    #[serde(default)]
    pub children: Vec<ChildInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChildInfo {
    pub id: String,
    pub state: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Ack {
    #[serde(default)]
    pub err_code: i64,
}

impl Response {
    #[cfg(test)]
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(cipher::encode(&serde_json::to_vec(self)?))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(&cipher::decode_latin1(bytes))?)
    }

    /// Firmware version from a status reply, if present and non-empty.
    pub fn firmware_version(&self) -> Option<&str> {
        self.system
            .get_sysinfo
            .as_ref()
            .map(|info| info.sw_ver.as_str())
            .filter(|version| !version.is_empty())
    }
}

/// Builds commands for one relay channel and reads its state back out of
/// status replies.
#[derive(Debug, Clone)]
pub struct RelayClient {
    device_id: String,
    child_suffix: String,
}

impl RelayClient {
    pub fn new(device_id: impl Into<String>, child_suffix: impl Into<String>) -> Self {
        RelayClient {
            device_id: device_id.into(),
            child_suffix: child_suffix.into(),
        }
    }

    pub fn child_id(&self) -> String {
        format!("{}{}", self.device_id, self.child_suffix)
    }

    pub fn query_status(&self) -> Command {
        Command {
            context: None,
            system: SystemCommand::GetSysinfo {},
        }
    }

    pub fn set_relay_state(&self, on: bool) -> Command {
        Command {
            context: Some(Context {
                child_ids: vec![self.child_id()],
            }),
            system: SystemCommand::SetRelayState { state: on as u8 },
        }
    }

    /// Whether the relay is energized according to a status reply.
    ///
    /// Firmware reports children either by suffix alone or by the full
    /// device id plus suffix; both are accepted.
    pub fn relay_state(&self, response: &Response) -> Result<bool, ProtocolError> {
        let info = response
            .system
            .get_sysinfo
            .as_ref()
            .ok_or(ProtocolError::MissingField("system.get_sysinfo"))?;

        let child_id = self.child_id();
        let child = info
            .children
            .iter()
            .find(|child| child.id == self.child_suffix || child.id == child_id)
            .ok_or(ProtocolError::MissingChild(child_id))?;

        Ok(child.state == 1)
    }
}
