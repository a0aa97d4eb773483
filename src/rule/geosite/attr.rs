//! Attribute filtering for `CODE@attr` lookups

use super::schema::Domain;

/// AND-combination of boolean attribute tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeFilter {
    tags: Vec<String>,
}

impl AttributeFilter {
    /// Build from raw tag strings; tags are lower-cased and de-duplicated
    pub fn parse<'a, I>(attrs: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut tags: Vec<String> = Vec::new();
        for attr in attrs {
            let attr = attr.to_lowercase();
            if !attr.is_empty() && !tags.contains(&attr) {
                tags.push(attr);
            }
        }
        AttributeFilter { tags }
    }

    /// True if the domain carries every tag
    pub fn matches(&self, domain: &Domain) -> bool {
        self.tags.iter().all(|tag| domain.has_attribute(tag))
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Keep only the matching domains, preserving order
    pub fn apply(&self, domains: &[Domain]) -> Vec<Domain> {
        domains
            .iter()
            .filter(|domain| self.matches(domain))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::geosite::DomainType;

    fn sample() -> Vec<Domain> {
        vec![
            Domain::new(DomainType::Domain, "baidu.com").with_attribute("cn"),
            Domain::new(DomainType::Domain, "doubleclick.net").with_attribute("ads"),
            Domain::new(DomainType::Full, "ads.qq.com")
                .with_attribute("ads")
                .with_attribute("cn"),
            Domain::new(DomainType::Plain, "google"),
        ]
    }

    #[test]
    fn test_parse_normalizes() {
        let filter = AttributeFilter::parse(["CN", "cn", "Ads", ""]);
        assert_eq!(filter.tags(), &["cn".to_string(), "ads".to_string()]);
    }

    #[test]
    fn test_tags_are_verbatim() {
        let filter = AttributeFilter::parse([" ads"]);
        assert_eq!(filter.tags(), &[" ads".to_string()]);
        assert!(filter.apply(&sample()).is_empty());
    }

    #[test]
    fn test_single_tag() {
        let filter = AttributeFilter::parse(["Cn"]);
        let values: Vec<_> = filter
            .apply(&sample())
            .into_iter()
            .map(|d| d.value)
            .collect();
        assert_eq!(values, vec!["baidu.com", "ads.qq.com"]);
    }

    #[test]
    fn test_all_tags_required() {
        let filter = AttributeFilter::parse(["ads", "cn"]);
        let filtered = filter.apply(&sample());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].value, "ads.qq.com");

        let reversed = AttributeFilter::parse(["cn", "ads"]);
        assert_eq!(reversed.apply(&sample()), filtered);
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = AttributeFilter::parse(std::iter::empty());
        assert!(filter.is_empty());
        assert_eq!(filter.apply(&sample()).len(), 4);
    }
}
