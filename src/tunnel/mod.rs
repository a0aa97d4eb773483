//! Tunnel core - routes connections through proxies

use crate::common::Metadata;
use crate::config::{Config, ProxyGroupConfig};
use crate::outbound::{OutboundProxy, PacketConnection, ProxyConnection, ProxyManager};
use crate::provider::{InlineProvider, ProxyProvider, TcpConnectProber};
use crate::proxy::{GroupOption, ProxyGroup, Selector, DEFAULT_TEST_URL};
use crate::rule::geosite::GeoSiteStore;
use crate::rule::RuleEngine;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Group used in global mode; created when the configuration has none
pub const GLOBAL_GROUP: &str = "GLOBAL";

/// Tunnel mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TunnelMode {
    /// Use rules for routing
    #[default]
    Rule,
    /// All traffic to global proxy
    Global,
    /// All traffic direct
    Direct,
}

impl TryFrom<&str> for TunnelMode {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "rule" => Ok(TunnelMode::Rule),
            "global" => Ok(TunnelMode::Global),
            "direct" => Ok(TunnelMode::Direct),
            _ => Err(Error::config(format!("Unknown tunnel mode: {}", s))),
        }
    }
}

/// Outcome of routing one connection
#[derive(Clone)]
pub struct Route {
    /// Adapter named by the rule (possibly a group)
    pub adapter: Arc<dyn OutboundProxy>,
    pub rule: String,
    pub rule_payload: String,
}

/// Tunnel core - owns the rules and every named outbound
pub struct Tunnel {
    /// Proxy manager, groups included
    proxies: ProxyManager,
    groups: HashMap<String, Arc<dyn ProxyGroup>>,
    providers: Vec<Arc<dyn ProxyProvider>>,
    /// Rule engine
    rules: RuleEngine,
    /// Current mode
    mode: RwLock<TunnelMode>,
}

impl Tunnel {
    /// Build proxies, groups and rules from configuration
    pub fn new(config: &Config, store: Arc<GeoSiteStore>, database: &Path) -> Result<Self> {
        let proxies = ProxyManager::new(&config.proxies)?;

        let mut builder = GroupBuilder {
            configs: config
                .proxy_groups
                .iter()
                .map(|g| (g.name.as_str(), g))
                .collect(),
            path: Vec::new(),
            proxies,
            groups: HashMap::new(),
            providers: Vec::new(),
        };
        for group in &config.proxy_groups {
            builder.build(&group.name)?;
        }
        if !builder.proxies.contains(GLOBAL_GROUP) {
            builder.build_global(config)?;
        }

        let rules = RuleEngine::new(&config.rules, store, database)?;
        for target in rules.targets() {
            if !builder.proxies.contains(target) {
                return Err(Error::config(format!("rule target {} not found", target)));
            }
        }

        info!(
            "Loaded {} proxies, {} groups, {} rules",
            builder.proxies.len(),
            builder.groups.len(),
            rules.rule_count()
        );

        Ok(Tunnel {
            proxies: builder.proxies,
            groups: builder.groups,
            providers: builder.providers,
            rules,
            mode: RwLock::new(config.tunnel_mode()?),
        })
    }

    /// Start health checks
    pub async fn initial(&self) {
        for provider in &self.providers {
            provider.initial().await;
        }
    }

    /// Stop health checks
    pub async fn close(&self) {
        for provider in &self.providers {
            provider.close().await;
        }
    }

    /// Pick the adapter for a connection
    pub fn route(&self, metadata: &Metadata) -> Result<Route> {
        let (proxy_name, rule_desc) = match self.mode() {
            TunnelMode::Direct => ("DIRECT".to_string(), "MODE:DIRECT".to_string()),
            TunnelMode::Global => (GLOBAL_GROUP.to_string(), "MODE:GLOBAL".to_string()),
            TunnelMode::Rule => self.rules.match_rules(metadata),
        };
        let (rule, rule_payload) = split_rule(&rule_desc);

        let adapter = self
            .proxies
            .get(&proxy_name)
            .cloned()
            .ok_or_else(|| Error::ProxyNotFound(proxy_name))?;

        Ok(Route {
            adapter,
            rule,
            rule_payload,
        })
    }

    /// Adapter names from the routed one down to the leaf that dials
    pub fn chain(&self, metadata: &Metadata) -> Result<Vec<String>> {
        let mut current = self.route(metadata)?.adapter;
        let mut chain = vec![current.name().to_string()];

        // Groups form a DAG, so the walk is bounded by the proxy count
        for _ in 0..self.proxies.len() {
            match current.unwrap(metadata, false) {
                Some(next) => {
                    chain.push(next.name().to_string());
                    current = next;
                }
                None => break,
            }
        }
        Ok(chain)
    }

    /// Route and dial a TCP connection
    pub async fn dial_tcp(&self, metadata: &Metadata) -> Result<Box<dyn ProxyConnection>> {
        let route = self.route(metadata)?;
        debug!(
            "{} -> {} via {} (rule: {} {})",
            metadata.source_detail(),
            metadata.remote_address(),
            route.adapter.name(),
            route.rule,
            route.rule_payload
        );

        match route.adapter.dial_tcp(metadata).await {
            Ok(conn) => {
                info!(
                    "Connected {} -> {} via {}",
                    metadata.source_detail(),
                    metadata.remote_address(),
                    route.adapter.name()
                );
                Ok(conn)
            }
            Err(e) => {
                warn!(
                    "Failed {} -> {} via {}: {}",
                    metadata.source_detail(),
                    metadata.remote_address(),
                    route.adapter.name(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Route and open a UDP association
    pub async fn dial_udp(&self, metadata: &Metadata) -> Result<Box<dyn PacketConnection>> {
        let route = self.route(metadata)?;
        if !route.adapter.support_udp() {
            return Err(Error::unsupported(format!(
                "{} does not support UDP",
                route.adapter.name()
            )));
        }
        route.adapter.dial_udp(metadata).await
    }

    /// Set tunnel mode
    pub fn set_mode(&self, mode: TunnelMode) {
        *self.mode.write() = mode;
        info!("Tunnel mode changed to {:?}", mode);
    }

    /// Get current mode
    pub fn mode(&self) -> TunnelMode {
        *self.mode.read()
    }

    /// Get proxy manager reference
    pub fn proxies(&self) -> &ProxyManager {
        &self.proxies
    }

    pub fn group(&self, name: &str) -> Option<&Arc<dyn ProxyGroup>> {
        self.groups.get(name)
    }

    pub fn groups(&self) -> &HashMap<String, Arc<dyn ProxyGroup>> {
        &self.groups
    }

    pub fn providers(&self) -> &[Arc<dyn ProxyProvider>] {
        &self.providers
    }

    /// Get rule engine reference
    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }
}

/// Builds groups depth first so members exist before the groups using them
struct GroupBuilder<'a> {
    configs: HashMap<&'a str, &'a ProxyGroupConfig>,
    /// Groups currently being built, outermost first
    path: Vec<&'a str>,
    proxies: ProxyManager,
    groups: HashMap<String, Arc<dyn ProxyGroup>>,
    providers: Vec<Arc<dyn ProxyProvider>>,
}

impl<'a> GroupBuilder<'a> {
    fn build(&mut self, name: &'a str) -> Result<()> {
        if self.groups.contains_key(name) {
            return Ok(());
        }
        if self.path.contains(&name) {
            let mut cycle = self.path.join(" -> ");
            cycle.push_str(" -> ");
            cycle.push_str(name);
            return Err(Error::config(format!("proxy group loop: {}", cycle)));
        }
        let config: &'a ProxyGroupConfig = self
            .configs
            .get(name)
            .copied()
            .ok_or_else(|| Error::config(format!("proxy group {} not found", name)))?;

        self.path.push(name);
        let mut members = Vec::with_capacity(config.proxies.len());
        for member in &config.proxies {
            if self.configs.contains_key(member.as_str()) {
                self.build(member)?;
            }
            let proxy = self.proxies.get(member).cloned().ok_or_else(|| {
                Error::config(format!("proxy group {}: proxy {} not found", name, member))
            })?;
            members.push(proxy);
        }
        self.path.pop();

        let option = GroupOption {
            name: config.name.clone(),
            auto_backup: config.auto_backup,
            disable_udp: config.disable_udp,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_TEST_URL.to_string()),
            interval: Duration::from_secs(config.interval.unwrap_or(0)),
            lazy: config.lazy,
            ..Default::default()
        };
        self.add_selector(option, members)
    }

    /// Selector over the built-ins and every configured proxy and group
    fn build_global(&mut self, config: &Config) -> Result<()> {
        let names = ["DIRECT", "REJECT"]
            .into_iter()
            .chain(config.proxies.iter().map(|p| p.name.as_str()))
            .chain(config.proxy_groups.iter().map(|g| g.name.as_str()));

        let members = names
            .filter_map(|name| self.proxies.get(name).cloned())
            .collect::<Vec<_>>();

        let option = GroupOption {
            name: GLOBAL_GROUP.to_string(),
            interval: Duration::ZERO,
            ..Default::default()
        };
        self.add_selector(option, members)
    }

    fn add_selector(
        &mut self,
        option: GroupOption,
        members: Vec<Arc<dyn OutboundProxy>>,
    ) -> Result<()> {
        let mut provider = InlineProvider::new(
            option.name.clone(),
            members,
            option.url.clone(),
            option.interval,
            option.lazy,
        );
        if option.interval > Duration::ZERO {
            provider = provider.with_prober(Arc::new(TcpConnectProber::default()));
        }
        let provider: Arc<dyn ProxyProvider> = Arc::new(provider);

        let name = option.name.clone();
        let selector = Arc::new(Selector::new(option, vec![provider.clone()])?);
        self.proxies.insert(&name, selector.clone())?;
        debug!("Proxy group {} built with {} proxies", name, provider.count());
        self.groups.insert(name, selector);
        self.providers.push(provider);
        Ok(())
    }
}

fn split_rule(rule_desc: &str) -> (String, String) {
    if rule_desc.eq_ignore_ascii_case("default") {
        return ("MATCH".to_string(), String::new());
    }

    if let Some((rule, payload)) = rule_desc.split_once(',') {
        return (rule.to_string(), payload.to_string());
    }

    if let Some((rule, payload)) = rule_desc.split_once(':') {
        return (rule.to_string(), payload.to_string());
    }

    (rule_desc.to_string(), String::new())
}
