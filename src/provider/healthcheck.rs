//! Health Check System
//!
//! Periodically probes every health-tracked candidate and records the
//! result into its [`ProxyHealth`](crate::outbound::ProxyHealth). Runs out of
//! band; the dial path only reads the recorded values.

use crate::common::Metadata;
use crate::outbound::OutboundProxy;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;
use url::Url;

/// Upper bound for one probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Measures the delay of one proxy
#[async_trait]
pub trait DelayProber: Send + Sync {
    async fn probe(&self, proxy: &Arc<dyn OutboundProxy>, url: &str) -> Result<Duration>;
}

/// Times a TCP dial through the proxy to the test URL's host
pub struct TcpConnectProber {
    timeout: Duration,
}

impl TcpConnectProber {
    pub fn new(timeout: Duration) -> Self {
        TcpConnectProber { timeout }
    }
}

impl Default for TcpConnectProber {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl DelayProber for TcpConnectProber {
    async fn probe(&self, proxy: &Arc<dyn OutboundProxy>, url: &str) -> Result<Duration> {
        let (host, port) = probe_target(url)?;
        let metadata = Metadata::tcp().with_host(host).with_dst_port(port);

        let start = Instant::now();
        match tokio::time::timeout(self.timeout, proxy.dial_tcp(&metadata)).await {
            Ok(Ok(_conn)) => Ok(start.elapsed()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::connection(format!(
                "probe timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

/// Host and port of an `http(s)://` test URL
///
/// IPv6 hosts keep their brackets so the result can be dialed as-is.
fn probe_target(url: &str) -> Result<(String, u16)> {
    let parsed =
        Url::parse(url).map_err(|e| Error::config(format!("invalid test URL {}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::config(format!(
            "unsupported test URL scheme: {}",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| Error::config(format!("test URL has no host: {}", url)))?;
    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| Error::config(format!("test URL has no port: {}", url)))?;
    Ok((host.to_string(), port))
}

/// Health check configuration and state
pub struct HealthCheck {
    url: String,
    interval: Duration,
    lazy: bool,
    proxies: Vec<Arc<dyn OutboundProxy>>,
    prober: RwLock<Option<Arc<dyn DelayProber>>>,
    epoch: Instant,
    /// Milliseconds since `epoch` plus one; zero means never touched
    last_touch: AtomicU64,
    running: AtomicBool,
    shutdown: broadcast::Sender<()>,
}

impl HealthCheck {
    pub fn new(
        url: String,
        interval: Duration,
        lazy: bool,
        proxies: Vec<Arc<dyn OutboundProxy>>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);

        HealthCheck {
            url,
            interval,
            lazy,
            proxies,
            prober: RwLock::new(None),
            epoch: Instant::now(),
            last_touch: AtomicU64::new(0),
            running: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Get health check URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Check if auto health check is enabled
    pub fn is_auto(&self) -> bool {
        self.interval > Duration::ZERO
    }

    pub fn set_prober(&self, prober: Arc<dyn DelayProber>) {
        *self.prober.write() = Some(prober);
    }

    /// Run health check for all proxies
    pub async fn check(&self) {
        let Some(prober) = self.prober.read().clone() else {
            debug!("No prober configured for {}, skipping health check", self.url);
            return;
        };

        let futures: Vec<_> = self
            .proxies
            .iter()
            .filter(|proxy| proxy.health().is_some() && !proxy.proxy_type().is_group())
            .map(|proxy| {
                let prober = prober.clone();
                async move {
                    let result = prober.probe(proxy, &self.url).await;
                    (proxy, result)
                }
            })
            .collect();

        let results = futures::future::join_all(futures).await;

        for (proxy, result) in results {
            let Some(health) = proxy.health() else {
                continue;
            };
            match result {
                Ok(delay) => {
                    debug!("{}: {}ms", proxy.name(), delay.as_millis());
                    health.record(Some(delay));
                }
                Err(e) => {
                    debug!("{}: unreachable: {}", proxy.name(), e);
                    health.record(None);
                }
            }
        }
    }

    /// Start background health check loop
    pub async fn start(&self) {
        if !self.is_auto() || self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Lazy checks only run for groups in recent use
                    if !self.lazy || self.touched_within(self.interval) {
                        self.check().await;
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// Touch to mark as recently used
    pub fn touch(&self) {
        let now = self.epoch.elapsed().as_millis() as u64 + 1;
        self.last_touch.store(now, Ordering::Relaxed);
    }

    fn touched_within(&self, window: Duration) -> bool {
        let last = self.last_touch.load(Ordering::Relaxed);
        if last == 0 {
            return false;
        }
        let now = self.epoch.elapsed().as_millis() as u64 + 1;
        now.saturating_sub(last) < window.as_millis() as u64
    }

    /// Close health check
    pub fn close(&self) {
        let _ = self.shutdown.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::{Direct, ProxyConnection, ProxyHealth, ProxyType};
    use std::collections::HashMap;

    struct Node {
        name: String,
        health: ProxyHealth,
    }

    #[async_trait]
    impl OutboundProxy for Node {
        fn name(&self) -> &str {
            &self.name
        }

        fn proxy_type(&self) -> ProxyType {
            ProxyType::Shadowsocks
        }

        fn support_udp(&self) -> bool {
            false
        }

        fn health(&self) -> Option<&ProxyHealth> {
            Some(&self.health)
        }

        async fn dial_tcp(&self, _metadata: &Metadata) -> Result<Box<dyn ProxyConnection>> {
            Err(Error::connection("not dialable"))
        }
    }

    /// Canned results per proxy name
    struct FixedProber(HashMap<&'static str, Option<u64>>);

    #[async_trait]
    impl DelayProber for FixedProber {
        async fn probe(&self, proxy: &Arc<dyn OutboundProxy>, _url: &str) -> Result<Duration> {
            match self.0.get(proxy.name()).copied().flatten() {
                Some(ms) => Ok(Duration::from_millis(ms)),
                None => Err(Error::connection("timeout")),
            }
        }
    }

    fn node(name: &str) -> Arc<dyn OutboundProxy> {
        Arc::new(Node {
            name: name.to_string(),
            health: ProxyHealth::new(),
        })
    }

    #[tokio::test]
    async fn test_check_records_health() {
        let proxies = vec![node("hk"), node("jp"), Arc::new(Direct::new()) as Arc<dyn OutboundProxy>];
        let hc = HealthCheck::new(
            "http://www.gstatic.com/generate_204".to_string(),
            Duration::from_secs(300),
            false,
            proxies.clone(),
        );

        // Without a prober nothing changes
        hc.check().await;
        assert_eq!(proxies[0].last_delay(), crate::outbound::UNKNOWN_DELAY);

        hc.set_prober(Arc::new(FixedProber(HashMap::from([("hk", Some(120)), ("jp", None)]))));
        hc.check().await;

        assert!(proxies[0].alive());
        assert_eq!(proxies[0].last_delay(), Duration::from_millis(120));
        assert!(!proxies[1].alive());
        // Built-ins are not probed
        assert!(proxies[2].alive());
    }

    #[test]
    fn test_touch_window() {
        let hc = HealthCheck::new(String::new(), Duration::from_secs(60), true, Vec::new());
        assert!(!hc.touched_within(Duration::from_secs(60)));
        hc.touch();
        assert!(hc.touched_within(Duration::from_secs(60)));
    }

    #[test]
    fn test_probe_target() {
        assert_eq!(
            probe_target("http://www.gstatic.com/generate_204").unwrap(),
            ("www.gstatic.com".to_string(), 80)
        );
        assert_eq!(
            probe_target("https://cp.cloudflare.com").unwrap(),
            ("cp.cloudflare.com".to_string(), 443)
        );
        assert_eq!(
            probe_target("http://user@127.0.0.1:8080/ping?x=1").unwrap(),
            ("127.0.0.1".to_string(), 8080)
        );
        assert_eq!(
            probe_target("http://[::1]:9090/").unwrap(),
            ("[::1]".to_string(), 9090)
        );
        // Empty port falls back to the scheme default
        assert_eq!(
            probe_target("http://www.gstatic.com:/generate_204").unwrap(),
            ("www.gstatic.com".to_string(), 80)
        );
        assert_eq!(
            probe_target("HTTPS://Example.COM:443/").unwrap(),
            ("example.com".to_string(), 443)
        );
        assert!(probe_target("ftp://example.com").is_err());
        assert!(probe_target("http://").is_err());
        assert!(probe_target("http://host:port").is_err());
        assert!(probe_target("http://a:1:2/").is_err());
        assert!(probe_target("www.gstatic.com/generate_204").is_err());
    }

    #[tokio::test]
    async fn test_tcp_connect_prober() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let direct: Arc<dyn OutboundProxy> = Arc::new(Direct::new());
        let prober = TcpConnectProber::default();
        let delay = prober
            .probe(&direct, &format!("http://127.0.0.1:{}/generate_204", port))
            .await
            .unwrap();
        assert!(delay < DEFAULT_PROBE_TIMEOUT);
    }
}
