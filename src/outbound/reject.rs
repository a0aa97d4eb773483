//! Reject outbound (block connections)

use super::{OutboundProxy, PacketConnection, ProxyConnection, ProxyType};
use crate::common::Metadata;
use crate::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep, Sleep};
use tracing::debug;

/// How long REJECT-DROP keeps a connection hanging
const DROP_DELAY: Duration = Duration::from_secs(30);

/// Reject connection - immediately closes or drops
pub struct Reject {
    name: String,
    drop: bool,
}

impl Reject {
    pub fn new(drop: bool) -> Self {
        let name = if drop { "REJECT-DROP" } else { "REJECT" };
        Self::with_name(name.to_string(), drop)
    }

    pub fn with_name(name: String, drop: bool) -> Self {
        Reject { name, drop }
    }
}

#[async_trait]
impl OutboundProxy for Reject {
    fn name(&self) -> &str {
        &self.name
    }

    fn proxy_type(&self) -> ProxyType {
        if self.drop {
            ProxyType::RejectDrop
        } else {
            ProxyType::Reject
        }
    }

    fn support_udp(&self) -> bool {
        true
    }

    async fn dial_tcp(&self, metadata: &Metadata) -> Result<Box<dyn ProxyConnection>> {
        debug!("{} connection to {}", self.name, metadata.remote_address());

        if self.drop {
            Ok(Box::new(DropConn {
                delay: Box::pin(sleep(DROP_DELAY)),
            }))
        } else {
            Ok(Box::new(RejectConn))
        }
    }

    async fn dial_udp(&self, metadata: &Metadata) -> Result<Box<dyn PacketConnection>> {
        debug!("{} UDP to {}", self.name, metadata.remote_address());
        Ok(Box::new(NopPacketConn))
    }
}

/// A connection that immediately returns EOF
struct RejectConn;

impl AsyncRead for RejectConn {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for RejectConn {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// A connection that hangs for `DROP_DELAY` before returning EOF
struct DropConn {
    delay: Pin<Box<Sleep>>,
}

impl AsyncRead for DropConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.delay.as_mut().poll(cx).map(Ok)
    }
}

impl AsyncWrite for DropConn {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Swallows writes, never yields a datagram
struct NopPacketConn;

#[async_trait]
impl PacketConnection for NopPacketConn {
    async fn send_to(&self, buf: &[u8], _target: SocketAddr) -> Result<usize> {
        Ok(buf.len())
    }

    async fn recv_from(&self, _buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        futures::future::pending::<()>().await;
        Err(Error::connection("rejected"))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_reject_creation() {
        let reject = Reject::new(false);
        assert_eq!(reject.name(), "REJECT");
        assert_eq!(reject.proxy_type(), ProxyType::Reject);

        let drop = Reject::new(true);
        assert_eq!(drop.name(), "REJECT-DROP");
        assert_eq!(drop.proxy_type(), ProxyType::RejectDrop);

        let named = Reject::with_name("block".to_string(), false);
        assert_eq!(named.name(), "block");
    }

    #[tokio::test]
    async fn test_reject_returns_eof() {
        let metadata = Metadata::tcp().with_host("ads.example.com".to_string()).with_dst_port(443);
        let mut conn = Reject::new(false).dial_tcp(&metadata).await.unwrap();
        conn.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let mut buf = Vec::new();
        assert_eq!(conn.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_hangs() {
        let metadata = Metadata::tcp().with_host("ads.example.com".to_string()).with_dst_port(443);
        let mut conn = Reject::new(true).dial_tcp(&metadata).await.unwrap();
        assert_eq!(conn.write(b"data").await.unwrap(), 4);

        let mut buf = [0u8; 8];
        let early = tokio::time::timeout(Duration::from_millis(50), conn.read(&mut buf)).await;
        assert!(early.is_err());
    }

    #[tokio::test]
    async fn test_reject_udp_swallows() {
        let conn = Reject::new(false).dial_udp(&Metadata::udp()).await.unwrap();
        let target: SocketAddr = "1.1.1.1:53".parse().unwrap();
        assert_eq!(conn.send_to(b"query", target).await.unwrap(), 5);

        let mut buf = [0u8; 8];
        let pending = tokio::time::timeout(Duration::from_millis(20), conn.recv_from(&mut buf)).await;
        assert!(pending.is_err());
    }
}
