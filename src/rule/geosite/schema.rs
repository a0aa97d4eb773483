//! GeoSite database messages
//!
//! Mirrors the `GeoSiteList`/`GeoSite`/`Domain` protobuf schema used by
//! v2ray-style `geosite.dat` files. Only the matched record is ever decoded
//! with these types; finding it is the locator's job.

/// Domain matching type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DomainType {
    /// Substring of the host
    Plain = 0,
    /// Regular expression
    Regex = 1,
    /// The domain itself and all of its subdomains
    Domain = 2,
    /// Exact host
    Full = 3,
}

/// One routing entry inside a GeoSite record
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Domain {
    #[prost(enumeration = "DomainType", tag = "1")]
    pub domain_type: i32,
    #[prost(string, tag = "2")]
    pub value: String,
    #[prost(message, repeated, tag = "3")]
    pub attribute: Vec<Attribute>,
}

impl Domain {
    pub fn new(domain_type: DomainType, value: impl Into<String>) -> Self {
        Domain {
            domain_type: domain_type as i32,
            value: value.into(),
            attribute: Vec::new(),
        }
    }

    /// Attach a boolean attribute
    pub fn with_attribute(mut self, key: impl Into<String>) -> Self {
        self.attribute.push(Attribute {
            key: key.into(),
            typed_value: Some(AttributeValue::BoolValue(true)),
        });
        self
    }

    /// Match type, `None` for tags this reader does not know
    pub fn kind(&self) -> Option<DomainType> {
        DomainType::try_from(self.domain_type).ok()
    }

    /// True if an attribute with this key is present
    pub fn has_attribute(&self, key: &str) -> bool {
        self.attribute.iter().any(|attr| attr.key == key)
    }
}

/// Key-tagged marker used for filtering
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Attribute {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(oneof = "AttributeValue", tags = "2, 3")]
    pub typed_value: Option<AttributeValue>,
}

#[derive(Clone, PartialEq, Eq, prost::Oneof)]
pub enum AttributeValue {
    #[prost(bool, tag = "2")]
    BoolValue(bool),
    #[prost(int64, tag = "3")]
    IntValue(i64),
}

/// One country or category
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GeoSite {
    #[prost(string, tag = "1")]
    pub country_code: String,
    #[prost(message, repeated, tag = "2")]
    pub domain: Vec<Domain>,
}

/// Whole database file
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GeoSiteList {
    #[prost(message, repeated, tag = "1")]
    pub entry: Vec<GeoSite>,
}
