//! Common utilities and types

pub mod error;
pub mod metadata;

pub use error::{Error, Result, VarintError};
pub use metadata::{AddrType, Metadata, Network};
