//! clash-route - rule routing core for clash-style proxy clients
//!
//! Routes connections by GeoSite domain lists and Selector proxy groups:
//! - GeoSite database lookup with lazy, cached record decoding
//! - `GEOSITE` and `MATCH` rules evaluated in order
//! - Selector groups with auto-backup failover and debounced resolution
//! - Health checks feeding proxy liveness
//! - REST API for inspecting rules and switching selections
//!
//! # Architecture
//!
//! ```text
//!                     +----------------+
//!                     |   hub/ (API)   |
//!                     +-------+--------+
//!                             |
//!        +--------------------+
//!        |                    |
//! +------v------+     +-------v-------+
//! |   config/   |     |    tunnel/    |
//! +-------------+     +-------+-------+
//!                             |
//!        +--------------------+-------------------+
//!        |                    |                   |
//! +------v------+     +-------v-------+   +------v------+
//! |   proxy/    |     |   outbound/   |   |    rule/    |
//! |  (groups)   |     |  (built-ins)  |   |  (geosite)  |
//! +------+------+     +---------------+   +-------------+
//!        |
//! +------v------+
//! |  provider/  |
//! | (health)    |
//! +-------------+
//! ```

pub mod common;
pub mod config;
pub mod hub;
pub mod outbound;
pub mod provider;
pub mod proxy;
pub mod rule;
pub mod tunnel;

pub use common::error::{Error, Result};
pub use config::Config;

use hub::AppState;
use parking_lot::RwLock as SyncRwLock;
use rule::geosite::{Domain, GeoSiteStore, OsFileReader, DEFAULT_SITE_CACHE_SIZE};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tunnel::{Tunnel, TunnelMode};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Routing state shared by the gateway and the REST API
pub struct Core {
    config: RwLock<Config>,
    home_dir: Option<PathBuf>,
    store: Arc<GeoSiteStore>,
    database: PathBuf,
    tunnel: SyncRwLock<Arc<Tunnel>>,
}

impl Core {
    /// Build the GeoSite store and the first tunnel
    pub fn new(config: Config, home_dir: Option<PathBuf>) -> Result<Self> {
        let cache_size = config.geosite_cache_size.unwrap_or(DEFAULT_SITE_CACHE_SIZE);
        let store = Arc::new(GeoSiteStore::with_reader(Arc::new(OsFileReader), cache_size));
        let database = config.geosite_path(home_dir.as_deref());
        info!("GeoSite database: {}", database.display());

        let tunnel = Tunnel::new(&config, store.clone(), &database)?;

        Ok(Core {
            config: RwLock::new(config),
            home_dir,
            store,
            database,
            tunnel: SyncRwLock::new(Arc::new(tunnel)),
        })
    }

    /// Tunnel in effect right now
    pub fn tunnel(&self) -> Arc<Tunnel> {
        self.tunnel.read().clone()
    }

    /// Get current configuration
    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    pub fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }

    /// Replace rules, proxies and groups, and drop cached GeoSite data
    ///
    /// The old tunnel stays in effect if the new configuration is invalid.
    /// Controller address and secret are not changed.
    pub async fn reload(&self, config: Config) -> Result<()> {
        config.validate()?;
        let mut current = self.config.write().await;

        let database = config.geosite_path(self.home_dir.as_deref());
        if database != self.database {
            warn!(
                "geosite-database changed to {}, restart to apply",
                database.display()
            );
        }

        let tunnel = Arc::new(Tunnel::new(&config, self.store.clone(), &self.database)?);
        self.store.reload();

        let old = std::mem::replace(&mut *self.tunnel.write(), tunnel.clone());
        old.close().await;
        tunnel.initial().await;

        *current = config;
        info!("Configuration reloaded");
        Ok(())
    }

    /// Switch the tunnel mode of the running tunnel
    pub async fn set_mode(&self, mode: &str) -> Result<TunnelMode> {
        let parsed = TunnelMode::try_from(mode)?;
        let mut current = self.config.write().await;
        self.tunnel().set_mode(parsed);
        current.mode = Some(mode.to_lowercase());
        Ok(parsed)
    }

    /// Domains of a GeoSite list, `CODE` or `CODE@attr`
    pub fn lookup(&self, token: &str) -> Result<Arc<[Domain]>> {
        self.store.lookup_with_attributes(&self.database, token)
    }

    pub fn geosite_database(&self) -> &Path {
        &self.database
    }
}

/// Gateway instance managing all components
pub struct Gateway {
    core: Arc<Core>,
    api_addr: Option<SocketAddr>,
    api_secret: String,
}

impl Gateway {
    /// Create a new Gateway from configuration
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_home_dir(config, None).await
    }

    /// Create a Gateway resolving relative paths against `home_dir`
    pub async fn with_home_dir(config: Config, home_dir: Option<PathBuf>) -> Result<Self> {
        info!("Initializing clash-route v{}", VERSION);

        let api_addr = parse_api_addr(&config);
        let api_secret = config.secret.clone().unwrap_or_default();
        let core = Arc::new(Core::new(config, home_dir)?);

        Ok(Gateway {
            core,
            api_addr,
            api_secret,
        })
    }

    /// Start health checks and the REST API, then wait for Ctrl-C
    pub async fn run(&self) -> Result<()> {
        info!("Starting gateway...");
        self.tunnel().initial().await;

        let mut handles = Vec::new();

        if let Some(addr) = self.api_addr {
            let state = self.app_state();
            let handle = tokio::spawn(async move {
                if let Err(e) = hub::start_server(state, addr).await {
                    warn!("REST API server error: {}", e);
                }
            });
            handles.push(handle);
            info!("REST API server started on {}", addr);
        }

        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal");

        for handle in handles {
            handle.abort();
        }
        self.tunnel().close().await;

        info!("Gateway stopped");
        Ok(())
    }

    /// State for the REST API; sees tunnels swapped in by `reload`
    pub fn app_state(&self) -> AppState {
        AppState::new(self.api_secret.clone(), self.core.clone())
    }

    /// Get current configuration
    pub async fn config(&self) -> Config {
        self.core.config().await
    }

    /// See [`Core::reload`]
    pub async fn reload(&self, config: Config) -> Result<()> {
        self.core.reload(config).await
    }

    /// Domains of a GeoSite list, `CODE` or `CODE@attr`
    pub fn lookup(&self, token: &str) -> Result<Arc<[Domain]>> {
        self.core.lookup(token)
    }

    /// Get tunnel reference
    pub fn tunnel(&self) -> Arc<Tunnel> {
        self.core.tunnel()
    }

    pub fn geosite_database(&self) -> &Path {
        self.core.geosite_database()
    }
}

fn parse_api_addr(config: &Config) -> Option<SocketAddr> {
    let addr = config.external_controller.as_deref()?;
    match addr.parse() {
        Ok(addr) => Some(addr),
        Err(_) => {
            warn!("Invalid external-controller address {}, API disabled", addr);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_parse_api_addr() {
        let mut config = Config::default();
        assert_eq!(parse_api_addr(&config), None);

        config.external_controller = Some("127.0.0.1:9090".to_string());
        assert_eq!(parse_api_addr(&config), Some("127.0.0.1:9090".parse().unwrap()));

        config.external_controller = Some("localhost".to_string());
        assert_eq!(parse_api_addr(&config), None);
    }

    #[tokio::test]
    async fn test_reload_swaps_tunnel() {
        let config = Config::from_str("rules:\n  - MATCH,REJECT\n").unwrap();
        let gateway = Gateway::new(config).await.unwrap();
        let state = gateway.app_state();
        assert_eq!(state.tunnel().rules().rule_count(), 1);

        let bad = Config::from_str("rules:\n  - MATCH,nowhere\n").unwrap();
        assert!(gateway.reload(bad).await.is_err());
        assert_eq!(gateway.tunnel().rules().rules()[0].proxy, "REJECT");

        let next = Config::from_str(
            "proxy-groups:\n  - { name: P, type: select, proxies: [DIRECT] }\nrules:\n  - GEOSITE,cn,P\n  - MATCH,DIRECT\n",
        )
        .unwrap();
        gateway.reload(next).await.unwrap();
        assert_eq!(state.tunnel().rules().rule_count(), 2);
        assert!(state.tunnel().group("P").is_some());
        assert_eq!(gateway.config().await.rules.len(), 2);
    }

    #[tokio::test]
    async fn test_set_mode() {
        let core = Core::new(Config::default(), None).unwrap();
        assert_eq!(core.set_mode("Global").await.unwrap(), TunnelMode::Global);
        assert_eq!(core.tunnel().mode(), TunnelMode::Global);
        assert_eq!(core.config().await.mode.as_deref(), Some("global"));

        assert!(core.set_mode("sideways").await.is_err());
        assert_eq!(core.tunnel().mode(), TunnelMode::Global);
    }
}
