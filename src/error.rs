//! Error types for the cache
//!
//! Cache operations themselves are infallible; errors only arise while
//! building a cache from external configuration.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A configuration value could not be parsed
    #[error("Invalid value for {key}: {value:?}")]
    InvalidConfig { key: String, value: String },

    /// Reference strength name was neither `soft` nor `weak`
    #[error("Unknown reference strength: {0}")]
    UnknownStrength(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
