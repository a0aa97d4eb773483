//! GEOSITE rule

use super::geosite::GeoSiteStore;
use super::{DomainMatcher, Rule, RuleType};
use crate::common::{AddrType, Metadata};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Matches destinations listed in one GeoSite record
pub struct GeoSiteRule {
    store: Arc<GeoSiteStore>,
    path: PathBuf,
    token: String,
    adapter: String,
    no_resolve: bool,
    /// Matcher built for a given store generation
    matcher: RwLock<Option<(u64, Arc<DomainMatcher>)>>,
}

impl GeoSiteRule {
    pub fn new(
        store: Arc<GeoSiteStore>,
        path: impl Into<PathBuf>,
        token: &str,
        adapter: &str,
        no_resolve: bool,
    ) -> Self {
        GeoSiteRule {
            store,
            path: path.into(),
            token: token.trim().to_string(),
            adapter: adapter.to_string(),
            no_resolve,
            matcher: RwLock::new(None),
        }
    }

    /// Matcher for the current store generation
    ///
    /// A failed lookup yields an empty matcher, kept until the next reload.
    fn matcher(&self) -> Arc<DomainMatcher> {
        let generation = self.store.generation();
        if let Some((built, matcher)) = self.matcher.read().as_ref() {
            if *built == generation {
                return matcher.clone();
            }
        }

        let matcher = match self.store.lookup_with_attributes(&self.path, &self.token) {
            Ok(domains) => {
                let matcher = DomainMatcher::build(&domains);
                debug!(
                    "GEOSITE,{} ready: {} entries, {} skipped",
                    self.token,
                    matcher.len(),
                    matcher.skipped()
                );
                Arc::new(matcher)
            }
            Err(e) => {
                warn!("GEOSITE,{} unavailable: {}", self.token, e);
                Arc::new(DomainMatcher::new())
            }
        };

        // Publish only if nobody reloaded the store meanwhile
        if self.store.generation() == generation {
            *self.matcher.write() = Some((generation, matcher.clone()));
        }
        matcher
    }
}

impl Rule for GeoSiteRule {
    fn rule_type(&self) -> RuleType {
        RuleType::GeoSite
    }

    fn match_metadata(&self, metadata: &Metadata) -> bool {
        if metadata.addr_type() != AddrType::DomainName {
            return false;
        }
        self.matcher().test(&metadata.host)
    }

    fn adapter(&self) -> &str {
        &self.adapter
    }

    fn payload(&self) -> &str {
        &self.token
    }

    fn should_resolve_ip(&self) -> bool {
        !self.no_resolve
    }
}
