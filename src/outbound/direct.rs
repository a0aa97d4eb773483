//! Direct outbound (no proxy)

use super::{OutboundProxy, PacketConnection, ProxyConnection, ProxyType};
use crate::common::Metadata;
use crate::{Error, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::{TcpStream, UdpSocket};
use tracing::debug;

/// Direct connection (no proxy)
pub struct Direct {
    name: String,
    udp: bool,
}

impl Direct {
    pub fn new() -> Self {
        Self::with_name("DIRECT".to_string())
    }

    pub fn with_name(name: String) -> Self {
        Direct {
            name,
            udp: true,
        }
    }

    pub fn with_udp(mut self, udp: bool) -> Self {
        self.udp = udp;
        self
    }
}

impl Default for Direct {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutboundProxy for Direct {
    fn name(&self) -> &str {
        &self.name
    }

    fn proxy_type(&self) -> ProxyType {
        ProxyType::Direct
    }

    fn support_udp(&self) -> bool {
        self.udp
    }

    async fn dial_tcp(&self, metadata: &Metadata) -> Result<Box<dyn ProxyConnection>> {
        let addr = metadata.remote_address();
        debug!("Direct connecting to {}", addr);

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::connection(format!("Failed to connect to {}: {}", addr, e)))?;

        debug!("Direct connected to {}", addr);
        Ok(Box::new(stream))
    }

    async fn dial_udp(&self, metadata: &Metadata) -> Result<Box<dyn PacketConnection>> {
        if !self.udp {
            return Err(Error::unsupported(format!("{} has UDP disabled", self.name)));
        }

        let bind = match metadata.dst_ip {
            Some(ip) if ip.is_ipv6() => "[::]:0",
            _ => "0.0.0.0:0",
        };
        let socket = UdpSocket::bind(bind).await?;
        debug!("Direct UDP bound on {}", socket.local_addr()?);
        Ok(Box::new(DirectPacketConn { socket }))
    }
}

/// Plain UDP socket
struct DirectPacketConn {
    socket: UdpSocket,
}

#[async_trait]
impl PacketConnection for DirectPacketConn {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        Ok(self.socket.send_to(buf, target).await?)
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        Ok(self.socket.recv_from(buf).await?)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}
