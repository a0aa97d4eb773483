//! Rule engine module

mod engine;
pub mod geosite;
mod geosite_rule;
mod matcher;
mod trie;

pub use engine::{MatchAll, RuleEngine, RuleInfo};
pub use geosite_rule::GeoSiteRule;
pub use matcher::DomainMatcher;
pub use trie::DomainTrie;

use crate::common::Metadata;
use crate::{Error, Result};
use std::fmt;

/// Rule type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    /// Match GeoSite record
    GeoSite,
    /// Final rule (MATCH)
    Match,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::GeoSite => write!(f, "GEOSITE"),
            RuleType::Match => write!(f, "MATCH"),
        }
    }
}

impl TryFrom<&str> for RuleType {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "GEOSITE" => Ok(RuleType::GeoSite),
            "MATCH" | "FINAL" => Ok(RuleType::Match),
            _ => Err(Error::rule(format!("Unknown rule type: {}", s))),
        }
    }
}

/// A routing rule
///
/// Evaluation must not fail: a rule that cannot decide reports no match.
pub trait Rule: Send + Sync {
    fn rule_type(&self) -> RuleType;

    /// Check whether the connection matches
    fn match_metadata(&self, metadata: &Metadata) -> bool;

    /// Name of the target adapter
    fn adapter(&self) -> &str;

    fn payload(&self) -> &str;

    /// Whether the destination should be resolved before this rule runs
    fn should_resolve_ip(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_type_parse() {
        assert_eq!(RuleType::try_from("geosite").unwrap(), RuleType::GeoSite);
        assert_eq!(RuleType::try_from("FINAL").unwrap(), RuleType::Match);
        assert!(RuleType::try_from("DOMAIN-SUFFIX").is_err());
        assert_eq!(RuleType::GeoSite.to_string(), "GEOSITE");
    }
}
