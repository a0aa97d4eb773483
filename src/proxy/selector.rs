//! Selector proxy group - Manual proxy selection
//!
//! The user picks a proxy by name. With `auto-backup` enabled a dead pick is
//! bypassed in favour of the fastest live candidate until it recovers.

use super::{GroupOption, ProxyGroup, Single};
use crate::common::Metadata;
use crate::outbound::{OutboundProxy, PacketConnection, ProxyConnection, ProxyType, Reject};
use crate::provider::{get_providers_proxies, ProxyProvider};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Selector proxy group for manual selection
pub struct Selector {
    name: String,
    providers: Vec<Arc<dyn ProxyProvider>>,
    selected: RwLock<String>,
    auto_backup: bool,
    disable_udp: bool,
    single: Single<Arc<dyn OutboundProxy>>,
    /// Used only when the providers are empty
    reject: Arc<dyn OutboundProxy>,
}

impl Selector {
    /// Initial selection is the first candidate
    pub fn new(option: GroupOption, providers: Vec<Arc<dyn ProxyProvider>>) -> Result<Self> {
        let first = get_providers_proxies(&providers, false)
            .first()
            .map(|p| p.name().to_string())
            .ok_or_else(|| Error::config(format!("proxy group {} has no proxies", option.name)))?;

        Ok(Selector {
            name: option.name,
            providers,
            selected: RwLock::new(first),
            auto_backup: option.auto_backup,
            disable_udp: option.disable_udp,
            single: Single::new(option.debounce),
            reject: Arc::new(Reject::new(false)),
        })
    }

    /// Name chosen by the user, which may differ from the proxy in effect
    pub fn selected(&self) -> String {
        self.selected.read().clone()
    }

    /// Proxy to carry the next connection
    pub fn resolve(&self, touch: bool) -> Arc<dyn OutboundProxy> {
        self.single.run(|| self.select(touch)).0
    }

    fn select(&self, touch: bool) -> Arc<dyn OutboundProxy> {
        let proxies = get_providers_proxies(&self.providers, touch);
        let Some(first) = proxies.first() else {
            warn!("Proxy group {} has no proxies, rejecting", self.name);
            return self.reject.clone();
        };

        let selected = self.selected.read().clone();
        let Some(chosen) = proxies.iter().find(|p| p.name() == selected) else {
            debug!(
                "{}: selection {} is gone, using {}",
                self.name,
                selected,
                first.name()
            );
            return first.clone();
        };

        if chosen.proxy_type().is_group() || chosen.alive() || !self.auto_backup {
            return chosen.clone();
        }

        let mut fastest: Option<&Arc<dyn OutboundProxy>> = None;
        for proxy in proxies.iter().filter(|p| p.name() != selected && p.alive()) {
            match fastest {
                Some(best) if best.last_delay() <= proxy.last_delay() => {}
                _ => fastest = Some(proxy),
            }
        }

        match fastest {
            Some(proxy) => {
                debug!("{}: {} is down, backing up to {}", self.name, selected, proxy.name());
                proxy.clone()
            }
            None => {
                debug!("{}: no live proxy, using {}", self.name, first.name());
                first.clone()
            }
        }
    }
}

#[async_trait]
impl OutboundProxy for Selector {
    fn name(&self) -> &str {
        &self.name
    }

    fn proxy_type(&self) -> ProxyType {
        ProxyType::Selector
    }

    fn support_udp(&self) -> bool {
        if self.disable_udp {
            return false;
        }
        self.resolve(false).support_udp()
    }

    async fn dial_tcp(&self, metadata: &Metadata) -> Result<Box<dyn ProxyConnection>> {
        let proxy = self.resolve(true);
        debug!("{} dialing {} via {}", self.name, metadata.remote_address(), proxy.name());
        proxy.dial_tcp(metadata).await
    }

    async fn dial_udp(&self, metadata: &Metadata) -> Result<Box<dyn PacketConnection>> {
        if self.disable_udp {
            return Err(Error::unsupported(format!("{} has UDP disabled", self.name)));
        }
        self.resolve(true).dial_udp(metadata).await
    }

    fn unwrap(&self, _metadata: &Metadata, touch: bool) -> Option<Arc<dyn OutboundProxy>> {
        Some(self.resolve(touch))
    }
}

impl ProxyGroup for Selector {
    fn now(&self) -> String {
        self.resolve(false).name().to_string()
    }

    fn set(&self, name: &str) -> Result<()> {
        let known = get_providers_proxies(&self.providers, false)
            .iter()
            .any(|p| p.name() == name);
        if !known {
            return Err(Error::ProxyNotFound(name.to_string()));
        }

        *self.selected.write() = name.to_string();
        self.single.reset();
        info!("{} selected {}", self.name, name);
        Ok(())
    }

    fn providers(&self) -> &[Arc<dyn ProxyProvider>] {
        &self.providers
    }
}
