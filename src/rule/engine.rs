//! Rule matching engine

use super::geosite::GeoSiteStore;
use super::{GeoSiteRule, Rule, RuleType};
use crate::common::Metadata;
use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Adapter used when no rule matches
const DEFAULT_TARGET: &str = "DIRECT";

/// Final rule, matches everything
pub struct MatchAll {
    adapter: String,
}

impl MatchAll {
    pub fn new(adapter: &str) -> Self {
        MatchAll {
            adapter: adapter.to_string(),
        }
    }
}

impl Rule for MatchAll {
    fn rule_type(&self) -> RuleType {
        RuleType::Match
    }

    fn match_metadata(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn adapter(&self) -> &str {
        &self.adapter
    }

    fn payload(&self) -> &str {
        ""
    }

    fn should_resolve_ip(&self) -> bool {
        false
    }
}

/// Rule listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleInfo {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub payload: String,
    pub proxy: String,
}

/// Parsed `TYPE,payload,target[,no-resolve]` line
#[derive(Debug, Clone, PartialEq, Eq)]
struct RuleLine {
    rule_type: RuleType,
    payload: String,
    target: String,
    no_resolve: bool,
}

impl RuleLine {
    fn parse(rule_str: &str) -> Result<Self> {
        let parts: Vec<&str> = rule_str.split(',').map(|s| s.trim()).collect();

        if parts.len() < 2 {
            return Err(Error::rule(format!("Invalid rule: {}", rule_str)));
        }

        let rule_type = RuleType::try_from(parts[0])?;

        let (payload, target, no_resolve) = if rule_type == RuleType::Match {
            // MATCH,target
            (String::new(), parts[1].to_string(), false)
        } else if parts.len() >= 3 {
            let no_resolve = parts
                .get(3)
                .map(|p| p.eq_ignore_ascii_case("no-resolve"))
                .unwrap_or(false);
            (parts[1].to_string(), parts[2].to_string(), no_resolve)
        } else {
            return Err(Error::rule(format!("Invalid rule: {}", rule_str)));
        };

        if payload.is_empty() && rule_type != RuleType::Match {
            return Err(Error::rule(format!("Empty payload: {}", rule_str)));
        }
        if target.is_empty() {
            return Err(Error::rule(format!("Empty target: {}", rule_str)));
        }

        Ok(RuleLine {
            rule_type,
            payload,
            target,
            no_resolve,
        })
    }
}

/// Ordered rule list; first match wins
pub struct RuleEngine {
    rules: Vec<Arc<dyn Rule>>,
    store: Arc<GeoSiteStore>,
    database: PathBuf,
}

impl RuleEngine {
    /// Create new rule engine from rules list
    pub fn new(rules: &[String], store: Arc<GeoSiteStore>, database: &Path) -> Result<Self> {
        let mut engine = RuleEngine {
            rules: Vec::with_capacity(rules.len()),
            store,
            database: database.to_path_buf(),
        };

        for rule_str in rules {
            engine.add_rule(rule_str)?;
        }

        Ok(engine)
    }

    /// Parse and append a rule
    pub fn add_rule(&mut self, rule_str: &str) -> Result<()> {
        let line = RuleLine::parse(rule_str)?;

        let rule: Arc<dyn Rule> = match line.rule_type {
            RuleType::GeoSite => Arc::new(GeoSiteRule::new(
                self.store.clone(),
                self.database.clone(),
                &line.payload,
                &line.target,
                line.no_resolve,
            )),
            RuleType::Match => Arc::new(MatchAll::new(&line.target)),
        };
        self.rules.push(rule);
        Ok(())
    }

    /// Match metadata against rules
    ///
    /// Returns (proxy_name, rule_description)
    pub fn match_rules(&self, metadata: &Metadata) -> (String, String) {
        for rule in &self.rules {
            if rule.match_metadata(metadata) {
                let description = match rule.rule_type() {
                    RuleType::Match => "MATCH".to_string(),
                    t => format!("{},{}", t, rule.payload()),
                };
                debug!("Rule matched: {} -> {}", description, rule.adapter());
                return (rule.adapter().to_string(), description);
            }
        }

        debug!("No rule matched, using {}", DEFAULT_TARGET);
        (DEFAULT_TARGET.to_string(), "default".to_string())
    }

    /// Target adapter names referenced by rules
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.adapter())
    }

    /// Listing for inspection
    pub fn rules(&self) -> Vec<RuleInfo> {
        self.rules
            .iter()
            .map(|r| RuleInfo {
                rule_type: r.rule_type().to_string(),
                payload: r.payload().to_string(),
                proxy: r.adapter().to_string(),
            })
            .collect()
    }

    /// Get number of rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::geosite::{Domain, DomainType, GeoSite, GeoSiteList};
    use prost::Message;
    use std::io::Write;

    fn create_metadata(host: &str, port: u16) -> Metadata {
        Metadata::tcp()
            .with_host(host.to_string())
            .with_dst_port(port)
    }

    fn database() -> tempfile::NamedTempFile {
        let data = GeoSiteList {
            entry: vec![
                GeoSite {
                    country_code: "CN".to_string(),
                    domain: vec![Domain::new(DomainType::Domain, "baidu.com")],
                },
                GeoSite {
                    country_code: "CATEGORY-ADS".to_string(),
                    domain: vec![
                        Domain::new(DomainType::Domain, "doubleclick.net").with_attribute("ads"),
                        Domain::new(DomainType::Plain, "analytics"),
                    ],
                },
            ],
        }
        .encode_to_vec();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file
    }

    fn engine(rules: &[&str], file: &tempfile::NamedTempFile) -> RuleEngine {
        let rules: Vec<String> = rules.iter().map(|s| s.to_string()).collect();
        RuleEngine::new(&rules, Arc::new(GeoSiteStore::new()), file.path()).unwrap()
    }

    #[test]
    fn test_parse_rule() {
        let line = RuleLine::parse("GEOSITE, cn ,DIRECT").unwrap();
        assert_eq!(line.rule_type, RuleType::GeoSite);
        assert_eq!(line.payload, "cn");
        assert_eq!(line.target, "DIRECT");
        assert!(!line.no_resolve);

        let line = RuleLine::parse("GEOSITE,category-ads@ads,REJECT,no-resolve").unwrap();
        assert!(line.no_resolve);
    }

    #[test]
    fn test_parse_match_rule() {
        let line = RuleLine::parse("MATCH,PROXY").unwrap();
        assert_eq!(line.rule_type, RuleType::Match);
        assert_eq!(line.target, "PROXY");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(RuleLine::parse("GEOSITE").is_err());
        assert!(RuleLine::parse("GEOSITE,cn").is_err());
        assert!(RuleLine::parse("GEOSITE,,DIRECT").is_err());
        assert!(RuleLine::parse("MATCH,").is_err());
        assert!(RuleLine::parse("IP-CIDR,10.0.0.0/8,DIRECT").is_err());
    }

    #[test]
    fn test_rule_engine() {
        let file = database();
        let engine = engine(
            &[
                "GEOSITE,category-ads@ads,REJECT",
                "GEOSITE,cn,DIRECT",
                "MATCH,PROXY",
            ],
            &file,
        );
        assert_eq!(engine.rule_count(), 3);

        let (target, rule) = engine.match_rules(&create_metadata("ad.doubleclick.net", 443));
        assert_eq!(target, "REJECT");
        assert_eq!(rule, "GEOSITE,category-ads@ads");

        // Plain entry has no "ads" tag
        let (target, _) = engine.match_rules(&create_metadata("analytics.example.com", 443));
        assert_eq!(target, "PROXY");

        let (target, _) = engine.match_rules(&create_metadata("www.baidu.com", 80));
        assert_eq!(target, "DIRECT");

        let (target, rule) = engine.match_rules(&create_metadata("unknown.com", 80));
        assert_eq!(target, "PROXY");
        assert_eq!(rule, "MATCH");
    }

    #[test]
    fn test_no_match_defaults_to_direct() {
        let file = database();
        let engine = engine(&["GEOSITE,cn,PROXY"], &file);

        let (target, rule) = engine.match_rules(&create_metadata("google.com", 443));
        assert_eq!(target, "DIRECT");
        assert_eq!(rule, "default");

        let ip = Metadata::tcp()
            .with_dst_ip("8.8.8.8".parse().unwrap())
            .with_dst_port(53);
        assert_eq!(engine.match_rules(&ip).0, "DIRECT");
    }

    #[test]
    fn test_rules_listing() {
        let file = database();
        let engine = engine(&["GEOSITE,cn,DIRECT", "MATCH,PROXY"], &file);
        let listing = engine.rules();
        assert_eq!(
            listing[0],
            RuleInfo {
                rule_type: "GEOSITE".to_string(),
                payload: "cn".to_string(),
                proxy: "DIRECT".to_string(),
            }
        );
        assert_eq!(listing[1].rule_type, "MATCH");
        assert_eq!(engine.targets().collect::<Vec<_>>(), vec!["DIRECT", "PROXY"]);
    }
}
