//! Proxy providers
//!
//! A provider supplies the ordered candidate list of a proxy group and owns
//! the health check that keeps each candidate's liveness current.

mod healthcheck;
mod proxy;

pub use healthcheck::{DelayProber, HealthCheck, TcpConnectProber, DEFAULT_PROBE_TIMEOUT};
pub use proxy::InlineProvider;

use crate::outbound::OutboundProxy;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for proxy providers
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Current candidates, in order
    ///
    /// Must not trigger any refresh.
    fn proxies(&self) -> Vec<Arc<dyn OutboundProxy>>;

    /// Proxy count
    fn count(&self) -> usize;

    /// Touch (update last access time)
    fn touch(&self);

    /// Start background work
    async fn initial(&self);

    /// Health check all proxies once
    async fn health_check(&self);

    /// Get health check URL
    fn health_check_url(&self) -> &str;

    /// Close provider
    async fn close(&self);
}

/// Candidates of all providers in order, touching them first if asked
pub fn get_providers_proxies(
    providers: &[Arc<dyn ProxyProvider>],
    touch: bool,
) -> Vec<Arc<dyn OutboundProxy>> {
    let mut proxies = Vec::new();
    for provider in providers {
        if touch {
            provider.touch();
        }
        proxies.extend(provider.proxies());
    }
    proxies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::{Direct, Reject};
    use std::time::Duration;

    fn provider(name: &str, proxies: Vec<Arc<dyn OutboundProxy>>) -> Arc<dyn ProxyProvider> {
        Arc::new(InlineProvider::new(
            name.to_string(),
            proxies,
            String::new(),
            Duration::ZERO,
            true,
        ))
    }

    #[test]
    fn test_get_providers_proxies_keeps_order() {
        let first = provider("a", vec![Arc::new(Direct::new()), Arc::new(Reject::new(false))]);
        let second = provider("b", vec![Arc::new(Reject::new(true))]);

        let names: Vec<String> = get_providers_proxies(&[first, second], true)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["DIRECT", "REJECT", "REJECT-DROP"]);
    }
}
