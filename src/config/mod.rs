//! Configuration module

use crate::outbound::ProxyType;
use crate::tunnel::TunnelMode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Database file used when `geosite-database` is not set
pub const DEFAULT_GEOSITE_DATABASE: &str = "geosite.dat";

/// Names that always exist and cannot be redefined
pub const BUILTIN_PROXIES: [&str; 3] = ["DIRECT", "REJECT", "REJECT-DROP"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Mode (rule, global, direct)
    pub mode: Option<String>,

    /// External controller address
    #[serde(rename = "external-controller")]
    pub external_controller: Option<String>,

    /// External controller secret
    pub secret: Option<String>,

    /// GeoSite database path, relative paths resolve against the home dir
    #[serde(rename = "geosite-database")]
    pub geosite_database: Option<String>,

    /// Decoded GeoSite records kept in memory; 0 disables the record cache
    #[serde(rename = "geosite-cache-size")]
    pub geosite_cache_size: Option<usize>,

    /// Proxy definitions
    pub proxies: Vec<ProxyConfig>,

    /// Proxy groups
    #[serde(rename = "proxy-groups")]
    pub proxy_groups: Vec<ProxyGroupConfig>,

    /// Rules
    pub rules: Vec<String>,
}

impl Config {
    /// Load configuration from file (synchronous)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from file (async)
    pub async fn load_async<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        Self::from_str(&content)
    }

    /// Load from string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.tunnel_mode()?;

        let mut names: HashSet<&str> = BUILTIN_PROXIES.iter().copied().collect();

        for proxy in &self.proxies {
            proxy.validate()?;
            if !names.insert(&proxy.name) {
                return Err(Error::config(format!("Duplicate proxy name: {}", proxy.name)));
            }
        }

        for group in &self.proxy_groups {
            group.validate()?;
            if !names.insert(&group.name) {
                return Err(Error::config(format!("Duplicate proxy name: {}", group.name)));
            }
        }

        Ok(())
    }

    /// Parsed `mode`
    pub fn tunnel_mode(&self) -> Result<TunnelMode> {
        match self.mode.as_deref() {
            Some(mode) => TunnelMode::try_from(mode),
            None => Ok(TunnelMode::default()),
        }
    }

    /// GeoSite database location
    pub fn geosite_path(&self, home_dir: Option<&Path>) -> PathBuf {
        let path = PathBuf::from(
            self.geosite_database
                .as_deref()
                .unwrap_or(DEFAULT_GEOSITE_DATABASE),
        );
        match home_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: Some("info".to_string()),
            mode: Some("rule".to_string()),
            external_controller: None,
            secret: None,
            geosite_database: None,
            geosite_cache_size: None,
            proxies: Vec::new(),
            proxy_groups: Vec::new(),
            rules: Vec::new(),
        }
    }
}

/// Proxy configuration
///
/// Only the built-in adapter types can be instantiated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy name
    pub name: String,

    /// Proxy type
    #[serde(rename = "type")]
    pub proxy_type: String,

    /// Allow UDP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp: Option<bool>,
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("Proxy name cannot be empty"));
        }
        ProxyType::try_from(self.proxy_type.as_str())?;
        Ok(())
    }
}

/// Proxy group configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyGroupConfig {
    /// Group name
    pub name: String,

    /// Group type (only `select` is available)
    #[serde(rename = "type")]
    pub group_type: String,

    /// Proxies and groups in this group, in order
    #[serde(default)]
    pub proxies: Vec<String>,

    /// Fall back to the fastest live proxy when the selection is down
    #[serde(rename = "auto-backup", default)]
    pub auto_backup: bool,

    #[serde(rename = "disable-udp", default)]
    pub disable_udp: bool,

    /// URL for health checks
    pub url: Option<String>,

    /// Health check interval in seconds; 0 disables checks
    pub interval: Option<u64>,

    /// Only check while the group is in use
    #[serde(default = "default_true")]
    pub lazy: bool,
}

impl ProxyGroupConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("Proxy group name cannot be empty"));
        }
        match ProxyType::try_from(self.group_type.as_str())? {
            ProxyType::Selector => {}
            other => {
                return Err(Error::unsupported(format!(
                    "proxy group {}: {} groups are not available",
                    self.name, other
                )));
            }
        }
        if self.proxies.is_empty() {
            return Err(Error::config(format!("Proxy group {} has no proxies", self.name)));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
