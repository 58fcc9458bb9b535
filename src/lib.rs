//! Reaping Cache - A thread-safe expiring key/value cache
//!
//! Entries leave the cache through explicit removal, replacement, time-based
//! expiry, or collection of their value under memory pressure. Each removal
//! is reported exactly once to an optional [`RemovalListener`].
//!
//! All housekeeping runs on the threads that call into the cache; there is
//! no background task, so an idle cache does not clean itself.

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{
    Cache, CacheStats, MemoryPressure, RemovalCause, RemovalListener, Strength, Val, Value,
};
pub use config::CacheConfig;
pub use error::CacheError;
