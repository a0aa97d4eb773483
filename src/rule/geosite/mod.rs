//! GeoSite database support
//!
//! `varint` and `locator` scan the raw file; `store` owns loading and
//! caching; `schema` decodes the one record that was asked for.

mod attr;
mod locator;
mod schema;
mod store;
pub mod varint;

pub use attr::AttributeFilter;
pub use locator::{find_record, record_keys, RecordKeys};
pub use schema::{Attribute, AttributeValue, Domain, DomainType, GeoSite, GeoSiteList};
pub use store::{FileReader, GeoSiteStore, OsFileReader, DEFAULT_SITE_CACHE_SIZE};
pub use varint::decode_varint;
