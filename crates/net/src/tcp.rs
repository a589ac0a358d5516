//! TCP connector

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use ocli_core::error::TransportError;
use ocli_core::transport::Connector;

use crate::channel::FramedChannel;

/// Opens one TCP connection per channel
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: SocketAddr,
    ttl: u32,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr, ttl: u32, connect_timeout: Duration) -> Self {
        Self {
            addr,
            ttl,
            connect_timeout,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Channel = FramedChannel<TcpStream>;

    async fn connect(&self) -> Result<Self::Channel, TransportError> {
        tracing::debug!(addr = %self.addr, ttl = self.ttl, "Connecting");
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout.as_millis() as u64))?
            .map_err(|e| TransportError::Connect {
                endpoint: self.endpoint(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        Ok(FramedChannel::new(stream, self.ttl))
    }

    fn endpoint(&self) -> String {
        self.addr.to_string()
    }
}
