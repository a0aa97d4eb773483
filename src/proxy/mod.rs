//! Proxy groups
//!
//! A group is itself an outbound: dialing it dials whichever candidate it
//! currently resolves to.

mod selector;
mod single;

pub use selector::Selector;
pub use single::Single;

use crate::outbound::OutboundProxy;
use crate::provider::{get_providers_proxies, ProxyProvider};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Default test URL
pub const DEFAULT_TEST_URL: &str = "http://www.gstatic.com/generate_204";

/// How long a resolved proxy is reused before resolving again
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

/// Inspection view of a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSnapshot {
    #[serde(rename = "type")]
    pub group_type: String,
    pub now: String,
    pub all: Vec<String>,
}

/// Trait for proxy groups
pub trait ProxyGroup: OutboundProxy {
    /// Name of the proxy currently in effect
    fn now(&self) -> String;

    /// Set selected proxy
    fn set(&self, name: &str) -> Result<()>;

    /// Get providers
    fn providers(&self) -> &[Arc<dyn ProxyProvider>];

    /// Get all proxy names in this group
    fn all(&self) -> Vec<String> {
        get_providers_proxies(self.providers(), false)
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    fn describe(&self) -> GroupSnapshot {
        GroupSnapshot {
            group_type: self.proxy_type().to_string(),
            now: self.now(),
            all: self.all(),
        }
    }
}

/// Group option from configuration
#[derive(Debug, Clone)]
pub struct GroupOption {
    pub name: String,
    pub auto_backup: bool,
    pub disable_udp: bool,
    pub debounce: Duration,
    pub url: String,
    pub interval: Duration,
    pub lazy: bool,
}

impl Default for GroupOption {
    fn default() -> Self {
        GroupOption {
            name: String::new(),
            auto_backup: false,
            disable_udp: false,
            debounce: DEFAULT_DEBOUNCE,
            url: DEFAULT_TEST_URL.to_string(),
            interval: Duration::from_secs(300),
            lazy: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json() {
        let snapshot = GroupSnapshot {
            group_type: "Selector".to_string(),
            now: "DIRECT".to_string(),
            all: vec!["DIRECT".to_string(), "REJECT".to_string()],
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["type"], "Selector");
        assert_eq!(json["now"], "DIRECT");
        assert_eq!(json["all"][1], "REJECT");
    }

    #[test]
    fn test_group_option_default() {
        let option = GroupOption::default();
        assert_eq!(option.debounce, DEFAULT_DEBOUNCE);
        assert_eq!(option.url, DEFAULT_TEST_URL);
        assert!(option.lazy);
        assert!(!option.auto_backup);
    }
}
