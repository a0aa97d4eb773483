//! Error types for the routing core

use std::io;
use thiserror::Error;

/// Varint decoding failure
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintError {
    #[error("varint truncated")]
    Truncated,

    #[error("varint overflows 64 bits")]
    Overflow,
}

/// Crate error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to open file: {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("empty file: {0}")]
    EmptyFile(String),

    #[error("list not found in {file}: {code}")]
    RecordNotFound { file: String, code: String },

    #[error("error unmarshal site in {file}: {code}: {reason}")]
    Decode {
        file: String,
        code: String,
        reason: String,
    },

    #[error("Varint error: {0}")]
    Varint(#[from] VarintError),

    #[error("Matcher build error: {0}")]
    MatcherBuild(String),

    #[error("proxy not exist: {0}")]
    ProxyNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Rule matching error: {0}")]
    Rule(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Error::Connection(msg.into())
    }

    pub fn rule<S: Into<String>>(msg: S) -> Self {
        Error::Rule(msg.into())
    }

    pub fn matcher<S: Into<String>>(msg: S) -> Self {
        Error::MatcherBuild(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;
