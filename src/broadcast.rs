//! Fan one command out over many concurrent exchanges and keep the first
//! good reply. The device drops a share of datagrams, so a burst of
//! duplicates is far more likely to get through than a single request.

use std::time::Duration;

use futures::StreamExt as _;
use futures::stream::FuturesUnordered;
use log::{debug, info};

use crate::channel::CommandChannel;
use crate::error::ProtocolError;
use crate::protocol::{Command, Response};

pub const DEFAULT_REPLICAS: usize = 30;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Broadcaster<C> {
    channel: C,
    replicas: usize,
    timeout: Duration,
}

impl<C: CommandChannel> Broadcaster<C> {
    pub fn new(channel: C, replicas: usize, timeout: Duration) -> Self {
        Broadcaster {
            channel,
            replicas: replicas.max(1),
            timeout,
        }
    }

    /// Returns the first successful reply among `replicas` identical
    /// exchanges sharing one deadline.
    ///
    /// Every exchange still in flight is dropped before this returns, which
    /// releases its socket. Dropping the returned future has the same effect.
    pub async fn race_send(&self, command: &Command) -> Result<Response, ProtocolError> {
        info!("Blast command: {:?}", command.system);

        let mut inflight: FuturesUnordered<_> = (0..self.replicas)
            .map(|_| self.channel.send(command, self.timeout))
            .collect();

        let mut failed = 0usize;
        let outcome = tokio::time::timeout(self.timeout, async {
            while let Some(result) = inflight.next().await {
                match result {
                    Ok(response) => return Some(response),
                    Err(err) => {
                        failed += 1;
                        debug!("Blast replica failed: {}", err);
                    }
                }
            }
            None
        })
        .await
        .ok()
        .flatten();

        let pending = inflight.len();
        drop(inflight);
        debug!(
            "Blast result: done={} failed={} pending={}",
            self.replicas - pending,
            failed,
            pending
        );

        outcome.ok_or(ProtocolError::NoResponse {
            replicas: self.replicas,
        })
    }
}
