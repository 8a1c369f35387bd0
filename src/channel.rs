use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use tokio::net::UdpSocket;

use crate::error::ProtocolError;
use crate::protocol::{Command, Response};

pub const DEFAULT_PORT: u16 = 9999;

const MAX_DATAGRAM: usize = 65507;

/// One request/reply exchange with the device. Implementations never retry.
pub trait CommandChannel: Send + Sync {
    fn send(
        &self,
        command: &Command,
        timeout: Duration,
    ) -> impl Future<Output = Result<Response, ProtocolError>> + Send;
}

/// Sends each command from its own ephemeral UDP socket.
///
/// The socket lives inside the returned future, so it is closed when the
/// exchange completes, fails, times out or is dropped mid-flight.
#[derive(Debug, Clone)]
pub struct UdpCommandChannel {
    target: SocketAddr,
}

impl UdpCommandChannel {
    pub fn new(target: SocketAddr) -> Self {
        UdpCommandChannel { target }
    }

    async fn exchange(&self, request: &[u8]) -> Result<Response, ProtocolError> {
        let bind_addr: SocketAddr = if self.target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.target).await?;
        socket.send(request).await?;
        debug!("Sent command to {}", self.target);

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let len = socket.recv(&mut buf).await?;
        debug!("Received {} byte response from {}", len, self.target);

        Response::decode(&buf[..len])
    }
}

impl CommandChannel for UdpCommandChannel {
    async fn send(&self, command: &Command, timeout: Duration) -> Result<Response, ProtocolError> {
        let request = command.encode()?;
        match tokio::time::timeout(timeout, self.exchange(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChildInfo, RelayClient, SysInfo, SystemCommand, SystemResponse};

    fn status_reply() -> Response {
        Response {
            system: SystemResponse {
                get_sysinfo: Some(SysInfo {
                    sw_ver: "1.0.12".to_string(),
                    children: vec![ChildInfo {
                        id: "00".to_string(),
                        state: 1,
                    }],
                }),
                set_relay_state: None,
            },
        }
    }

    #[tokio::test]
    async fn test_round_trip_against_loopback_device() {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let channel = UdpCommandChannel::new(device.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (len, from) = device.recv_from(&mut buf).await.unwrap();
            let command = Command::decode(&buf[..len]).unwrap();
            assert_eq!(command.system, SystemCommand::GetSysinfo {});
            device
                .send_to(&status_reply().encode().unwrap(), from)
                .await
                .unwrap();
        });

        let command = RelayClient::new("AB", "00").query_status();
        let response = channel
            .send(&command, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response, status_reply());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_when_device_is_silent() {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let channel = UdpCommandChannel::new(device.local_addr().unwrap());

        let command = RelayClient::new("AB", "00").query_status();
        let result = channel.send(&command, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn test_garbage_reply_is_malformed() {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let channel = UdpCommandChannel::new(device.local_addr().unwrap());

        tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (_, from) = device.recv_from(&mut buf).await.unwrap();
            device.send_to(b"\x01\x02\x03", from).await.unwrap();
        });

        let command = RelayClient::new("AB", "00").query_status();
        let result = channel.send(&command, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }
}
