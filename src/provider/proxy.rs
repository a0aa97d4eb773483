//! Inline provider (proxies listed directly in a group)

use super::{DelayProber, HealthCheck, ProxyProvider};
use crate::outbound::OutboundProxy;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Fixed candidate list taken from configuration
pub struct InlineProvider {
    name: String,
    proxies: Vec<Arc<dyn OutboundProxy>>,
    health_check: Arc<HealthCheck>,
}

impl InlineProvider {
    pub fn new(
        name: String,
        proxies: Vec<Arc<dyn OutboundProxy>>,
        health_check_url: String,
        health_check_interval: Duration,
        lazy: bool,
    ) -> Self {
        let health_check = Arc::new(HealthCheck::new(
            health_check_url,
            health_check_interval,
            lazy,
            proxies.clone(),
        ));

        InlineProvider {
            name,
            proxies,
            health_check,
        }
    }

    /// Probe candidates with `prober` during health checks
    pub fn with_prober(self, prober: Arc<dyn DelayProber>) -> Self {
        self.health_check.set_prober(prober);
        self
    }

    pub fn health_checker(&self) -> &Arc<HealthCheck> {
        &self.health_check
    }
}

#[async_trait]
impl ProxyProvider for InlineProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn proxies(&self) -> Vec<Arc<dyn OutboundProxy>> {
        self.proxies.clone()
    }

    fn count(&self) -> usize {
        self.proxies.len()
    }

    fn touch(&self) {
        self.health_check.touch();
    }

    async fn initial(&self) {
        if self.health_check.is_auto() {
            let hc = self.health_check.clone();
            tokio::spawn(async move {
                hc.start().await;
            });
        }
    }

    async fn health_check(&self) {
        self.health_check.check().await;
    }

    fn health_check_url(&self) -> &str {
        self.health_check.url()
    }

    async fn close(&self) {
        self.health_check.close();
    }
}
