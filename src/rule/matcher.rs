//! Domain matcher built from GeoSite entries

use super::geosite::{Domain, DomainType};
use super::DomainTrie;
use crate::{Error, Result};
use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Compiled set of domain rules
///
/// Full and Domain entries live in a label trie; Plain and Regex entries are
/// tested linearly. A host matches if any entry matches.
#[derive(Debug, Clone, Default)]
pub struct DomainMatcher {
    names: DomainTrie<()>,
    keywords: Vec<String>,
    patterns: Vec<Regex>,
    skipped: usize,
}

impl DomainMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a domain list, skipping entries that fail to compile
    pub fn build(domains: &[Domain]) -> Self {
        let mut matcher = DomainMatcher::new();
        for domain in domains {
            if let Err(e) = matcher.try_insert(domain) {
                warn!("Skipping GeoSite entry {:?}: {}", domain.value, e);
                matcher.skipped += 1;
            }
        }
        matcher
    }

    /// Add one entry
    pub fn try_insert(&mut self, domain: &Domain) -> Result<()> {
        let value = domain.value.as_str();

        match domain.kind() {
            Some(DomainType::Full) => {
                if !self.names.insert_exact(value, ()) {
                    return Err(Error::matcher(format!("invalid full domain: {}", value)));
                }
            }
            Some(DomainType::Domain) => {
                let suffix = value.trim_start_matches('.');
                if !self.names.insert_subtree(suffix, ()) {
                    return Err(Error::matcher(format!("invalid domain: {}", value)));
                }
            }
            Some(DomainType::Plain) => {
                self.keywords.push(value.to_lowercase());
            }
            Some(DomainType::Regex) => {
                let regex = RegexBuilder::new(value)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::matcher(format!("invalid regex {}: {}", value, e)))?;
                self.patterns.push(regex);
            }
            None => {
                return Err(Error::matcher(format!(
                    "unknown domain type {}",
                    domain.domain_type
                )));
            }
        }
        Ok(())
    }

    /// Check whether `host` matches any entry
    pub fn test(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_lowercase();
        if host.is_empty() {
            return false;
        }

        self.names.contains(&host)
            || self.keywords.iter().any(|k| host.contains(k.as_str()))
            || self.patterns.iter().any(|r| r.is_match(&host))
    }

    /// Number of matchable entries
    pub fn len(&self) -> usize {
        self.names.len() + self.keywords.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries dropped by `build`
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(domains: Vec<Domain>) -> DomainMatcher {
        DomainMatcher::build(&domains)
    }

    #[test]
    fn test_full() {
        for host in ["example.com", "a.b.c.example.org", "localhost"] {
            let m = matcher(vec![Domain::new(DomainType::Full, host)]);
            assert!(m.test(host));
            assert!(m.test(&host.to_uppercase()));
            assert!(!m.test(&format!("{}x", host)));
            assert!(!m.test(&format!("www.{}", host)));
        }
    }

    #[test]
    fn test_domain_suffix() {
        let m = matcher(vec![Domain::new(DomainType::Domain, "example.com")]);
        assert!(m.test("example.com"));
        assert!(m.test("a.example.com"));
        assert!(m.test("A.Example.COM."));
        assert!(!m.test("notexample.com"));
        assert!(!m.test("example.com.cn"));
        assert!(!m.test("com"));
    }

    #[test]
    fn test_plain_and_regex() {
        let m = matcher(vec![
            Domain::new(DomainType::Plain, "Google"),
            Domain::new(DomainType::Regex, r"^ad[0-9]+\."),
        ]);
        assert!(m.test("www.google.com"));
        assert!(m.test("mail.GOOGLE.co.jp"));
        assert!(m.test("ad12.tracker.net"));
        assert!(m.test("AD7.example.org"));
        assert!(!m.test("bad1.example.org"));
        assert!(!m.test("example.org"));
    }

    #[test]
    fn test_bad_entries_skipped() {
        let m = matcher(vec![
            Domain::new(DomainType::Regex, "(unclosed"),
            Domain::new(DomainType::Full, ""),
            Domain {
                domain_type: 42,
                value: "weird.com".to_string(),
                attribute: Vec::new(),
            },
            Domain::new(DomainType::Domain, "qq.com"),
        ]);
        assert_eq!(m.skipped(), 3);
        assert_eq!(m.len(), 1);
        assert!(m.test("im.qq.com"));
        assert!(!m.test("weird.com"));
    }

    #[test]
    fn test_try_insert_reports_error() {
        let mut m = DomainMatcher::new();
        let err = m
            .try_insert(&Domain::new(DomainType::Regex, "[z-a]"))
            .unwrap_err();
        assert!(matches!(err, Error::MatcherBuild(_)));
        assert!(m.is_empty());
        assert!(!m.test("anything"));
    }

    #[test]
    fn test_plain_is_verbatim_substring() {
        let m = matcher(vec![Domain::new(DomainType::Plain, " ads ")]);
        assert!(!m.test("adsx"));
        assert_eq!(m.skipped(), 0);

        let m = matcher(vec![Domain::new(DomainType::Plain, "")]);
        assert_eq!(m.skipped(), 0);
        assert!(m.test("anything.example"));
    }

    #[test]
    fn test_empty_host_never_matches() {
        let m = matcher(vec![Domain::new(DomainType::Plain, "a")]);
        assert!(!m.test(""));
        assert!(!m.test("."));
    }
}
