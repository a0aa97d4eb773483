//! Outbound adapters
//!
//! Built-in leaf adapters (DIRECT, REJECT, REJECT-DROP) and the contract
//! every outbound, including proxy groups, implements.

mod direct;
mod reject;

pub use direct::Direct;
pub use reject::Reject;

use crate::common::Metadata;
use crate::config::ProxyConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Delay reported when nothing has been measured
pub const UNKNOWN_DELAY: Duration = Duration::from_millis(u16::MAX as u64);

/// Proxy type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyType {
    Direct,
    Reject,
    RejectDrop,
    Pass,
    Relay,
    Selector,
    Fallback,
    URLTest,
    LoadBalance,
    Shadowsocks,
    Vmess,
    Trojan,
    Hysteria2,
    Http,
    Socks5,
    Vless,
}

impl ProxyType {
    /// Built-in adapters and proxy groups
    ///
    /// Their aliveness is not tracked, so a selection of one of these is
    /// never failed over.
    pub fn is_group(self) -> bool {
        match self {
            ProxyType::Direct
            | ProxyType::Reject
            | ProxyType::RejectDrop
            | ProxyType::Pass
            | ProxyType::Relay
            | ProxyType::Selector
            | ProxyType::Fallback
            | ProxyType::URLTest
            | ProxyType::LoadBalance => true,
            ProxyType::Shadowsocks
            | ProxyType::Vmess
            | ProxyType::Trojan
            | ProxyType::Hysteria2
            | ProxyType::Http
            | ProxyType::Socks5
            | ProxyType::Vless => false,
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Direct => write!(f, "Direct"),
            ProxyType::Reject => write!(f, "Reject"),
            ProxyType::RejectDrop => write!(f, "RejectDrop"),
            ProxyType::Pass => write!(f, "Pass"),
            ProxyType::Relay => write!(f, "Relay"),
            ProxyType::Selector => write!(f, "Selector"),
            ProxyType::Fallback => write!(f, "Fallback"),
            ProxyType::URLTest => write!(f, "URLTest"),
            ProxyType::LoadBalance => write!(f, "LoadBalance"),
            ProxyType::Shadowsocks => write!(f, "Shadowsocks"),
            ProxyType::Vmess => write!(f, "VMess"),
            ProxyType::Trojan => write!(f, "Trojan"),
            ProxyType::Hysteria2 => write!(f, "Hysteria2"),
            ProxyType::Http => write!(f, "HTTP"),
            ProxyType::Socks5 => write!(f, "SOCKS5"),
            ProxyType::Vless => write!(f, "VLESS"),
        }
    }
}

impl TryFrom<&str> for ProxyType {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(ProxyType::Direct),
            "reject" => Ok(ProxyType::Reject),
            "reject-drop" => Ok(ProxyType::RejectDrop),
            "pass" => Ok(ProxyType::Pass),
            "relay" => Ok(ProxyType::Relay),
            "select" | "selector" => Ok(ProxyType::Selector),
            "fallback" => Ok(ProxyType::Fallback),
            "url-test" => Ok(ProxyType::URLTest),
            "load-balance" => Ok(ProxyType::LoadBalance),
            "ss" | "shadowsocks" => Ok(ProxyType::Shadowsocks),
            "vmess" => Ok(ProxyType::Vmess),
            "trojan" => Ok(ProxyType::Trojan),
            "hysteria2" | "hy2" => Ok(ProxyType::Hysteria2),
            "http" => Ok(ProxyType::Http),
            "socks5" | "socks" => Ok(ProxyType::Socks5),
            "vless" => Ok(ProxyType::Vless),
            _ => Err(Error::config(format!("Unknown proxy type: {}", s))),
        }
    }
}

/// Liveness and latency of one proxy
///
/// Written by health checks, read on the dial path.
#[derive(Debug)]
pub struct ProxyHealth {
    alive: AtomicBool,
    delay_ms: AtomicU64,
}

impl ProxyHealth {
    pub fn new() -> Self {
        ProxyHealth {
            alive: AtomicBool::new(true),
            delay_ms: AtomicU64::new(UNKNOWN_DELAY.as_millis() as u64),
        }
    }

    /// Record one probe; `None` marks the proxy dead
    pub fn record(&self, delay: Option<Duration>) {
        match delay {
            Some(delay) => self.set(true, delay),
            None => self.set(false, UNKNOWN_DELAY),
        }
    }

    pub fn set(&self, alive: bool, delay: Duration) {
        let ms = (delay.as_millis() as u64).min(UNKNOWN_DELAY.as_millis() as u64);
        self.delay_ms.store(ms, Ordering::Relaxed);
        self.alive.store(alive, Ordering::Release);
    }

    pub fn alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn last_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Relaxed))
    }
}

impl Default for ProxyHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for outbound proxy connections
#[async_trait]
pub trait OutboundProxy: Send + Sync {
    /// Get proxy name
    fn name(&self) -> &str;

    /// Get proxy type
    fn proxy_type(&self) -> ProxyType;

    /// Check if UDP is supported
    fn support_udp(&self) -> bool;

    /// Health record, if this proxy is health checked
    fn health(&self) -> Option<&ProxyHealth> {
        None
    }

    fn alive(&self) -> bool {
        self.health().map(|h| h.alive()).unwrap_or(true)
    }

    fn last_delay(&self) -> Duration {
        self.health().map(|h| h.last_delay()).unwrap_or(UNKNOWN_DELAY)
    }

    /// Dial TCP connection through this proxy
    async fn dial_tcp(&self, metadata: &Metadata) -> Result<Box<dyn ProxyConnection>>;

    /// Open a UDP association through this proxy
    async fn dial_udp(&self, _metadata: &Metadata) -> Result<Box<dyn PacketConnection>> {
        Err(Error::unsupported(format!("{} does not support UDP", self.name())))
    }

    /// Proxy a group delegates to; `None` for leaf adapters
    fn unwrap(&self, _metadata: &Metadata, _touch: bool) -> Option<Arc<dyn OutboundProxy>> {
        None
    }

    /// Close the proxy (cleanup resources)
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Trait for proxy connections
pub trait ProxyConnection: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + Unpin> ProxyConnection for T {}

/// Datagram association
#[async_trait]
pub trait PacketConnection: Send + Sync {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize>;

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    fn local_addr(&self) -> Result<SocketAddr>;
}

/// Proxy manager holding all named outbounds
pub struct ProxyManager {
    proxies: HashMap<String, Arc<dyn OutboundProxy>>,
}

impl ProxyManager {
    pub fn new(configs: &[ProxyConfig]) -> Result<Self> {
        let mut proxies: HashMap<String, Arc<dyn OutboundProxy>> = HashMap::new();

        // Always add built-in proxies
        proxies.insert("DIRECT".to_string(), Arc::new(Direct::new()));
        proxies.insert("REJECT".to_string(), Arc::new(Reject::new(false)));
        proxies.insert("REJECT-DROP".to_string(), Arc::new(Reject::new(true)));

        for config in configs {
            if proxies.contains_key(&config.name) {
                return Err(Error::config(format!("Duplicate proxy name: {}", config.name)));
            }
            let proxy = Self::create_proxy(config)?;
            proxies.insert(config.name.clone(), proxy);
        }

        Ok(ProxyManager { proxies })
    }

    fn create_proxy(config: &ProxyConfig) -> Result<Arc<dyn OutboundProxy>> {
        let proxy_type = ProxyType::try_from(config.proxy_type.as_str())?;

        match proxy_type {
            ProxyType::Direct => Ok(Arc::new(
                Direct::with_name(config.name.clone()).with_udp(config.udp.unwrap_or(true)),
            )),
            ProxyType::Reject => Ok(Arc::new(Reject::with_name(config.name.clone(), false))),
            ProxyType::RejectDrop => Ok(Arc::new(Reject::with_name(config.name.clone(), true))),
            other => Err(Error::unsupported(format!(
                "proxy {}: {} adapters are not available",
                config.name, other
            ))),
        }
    }

    /// Register an outbound built elsewhere (proxy groups)
    pub fn insert(&mut self, name: &str, proxy: Arc<dyn OutboundProxy>) -> Result<()> {
        if self.proxies.contains_key(name) {
            return Err(Error::config(format!("Duplicate proxy name: {}", name)));
        }
        self.proxies.insert(name.to_string(), proxy);
        Ok(())
    }

    /// Get proxy by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn OutboundProxy>> {
        self.proxies.get(name)
    }

    /// Check if a proxy with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.proxies.contains_key(name)
    }

    /// Get all proxy names
    pub fn names(&self) -> Vec<&String> {
        self.proxies.keys().collect()
    }

    /// Get number of proxies
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Iterate over proxies
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn OutboundProxy>)> {
        self.proxies.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy_config(name: &str, proxy_type: &str) -> ProxyConfig {
        ProxyConfig {
            name: name.to_string(),
            proxy_type: proxy_type.to_string(),
            udp: None,
        }
    }

    #[test]
    fn test_proxy_type_parsing() {
        assert_eq!(ProxyType::try_from("ss").unwrap(), ProxyType::Shadowsocks);
        assert_eq!(ProxyType::try_from("select").unwrap(), ProxyType::Selector);
        assert_eq!(ProxyType::try_from("URL-TEST").unwrap(), ProxyType::URLTest);
        assert_eq!(ProxyType::try_from("hy2").unwrap(), ProxyType::Hysteria2);
        assert!(ProxyType::try_from("unknown").is_err());
    }

    #[test]
    fn test_group_types() {
        for t in [
            ProxyType::Direct,
            ProxyType::Reject,
            ProxyType::Pass,
            ProxyType::Relay,
            ProxyType::Selector,
            ProxyType::Fallback,
            ProxyType::URLTest,
            ProxyType::LoadBalance,
        ] {
            assert!(t.is_group(), "{} should be a group type", t);
        }
        assert!(!ProxyType::Shadowsocks.is_group());
        assert!(!ProxyType::Vless.is_group());
    }

    #[test]
    fn test_proxy_health() {
        let health = ProxyHealth::new();
        assert!(health.alive());
        assert_eq!(health.last_delay(), UNKNOWN_DELAY);

        health.record(Some(Duration::from_millis(42)));
        assert!(health.alive());
        assert_eq!(health.last_delay(), Duration::from_millis(42));

        health.record(None);
        assert!(!health.alive());
        assert_eq!(health.last_delay(), UNKNOWN_DELAY);

        health.set(true, Duration::from_secs(3600));
        assert_eq!(health.last_delay(), UNKNOWN_DELAY);
    }

    #[test]
    fn test_proxy_manager() {
        let manager = ProxyManager::new(&[
            proxy_config("direct-alt", "direct"),
            proxy_config("block", "reject"),
        ])
        .unwrap();
        assert_eq!(manager.len(), 5);
        assert_eq!(manager.get("direct-alt").unwrap().proxy_type(), ProxyType::Direct);
        assert_eq!(manager.get("block").unwrap().name(), "block");
        assert!(manager.contains("REJECT-DROP"));
    }

    #[test]
    fn test_proxy_manager_rejects_bad_entries() {
        assert!(ProxyManager::new(&[proxy_config("DIRECT", "direct")]).is_err());
        assert!(matches!(
            ProxyManager::new(&[proxy_config("hk", "ss")]),
            Err(Error::Unsupported(_))
        ));
        assert!(ProxyManager::new(&[proxy_config("x", "carrier-pigeon")]).is_err());
    }
}
