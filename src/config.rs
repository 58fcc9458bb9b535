//! Configuration Module
//!
//! Handles loading cache construction parameters from environment variables
//! or from any serde-compatible source.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{Strength, DEFAULT_INITIAL_CAPACITY};
use crate::error::{CacheError, Result};

/// Cache configuration parameters.
///
/// Unset values fall back to sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of entries the backing store is sized for up front
    pub initial_capacity: usize,
    /// Reference strength applied to every entry of the cache
    pub strength: Strength,
    /// Idle time after which soft referents become collectible under
    /// normal memory pressure, None = only under critical pressure
    pub soft_idle_timeout_ms: Option<u64>,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_INITIAL_CAPACITY` - Initial store capacity (default: 16)
    /// - `CACHE_STRENGTH` - `soft` or `weak` (default: soft)
    /// - `CACHE_SOFT_IDLE_MS` - Soft idle timeout in milliseconds (default: unset)
    ///
    /// Unset variables use their default; malformed ones are an error. An
    /// unrecognized strength is reported as `UnknownStrength`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            initial_capacity: parse_var("CACHE_INITIAL_CAPACITY")?
                .unwrap_or(defaults.initial_capacity),
            // Strength parsing reports its own error naming the bad value.
            strength: read_var("CACHE_STRENGTH")
                .map(|raw| raw.trim().parse::<Strength>())
                .transpose()?
                .unwrap_or(defaults.strength),
            soft_idle_timeout_ms: parse_var("CACHE_SOFT_IDLE_MS")?
                .or(defaults.soft_idle_timeout_ms),
        })
    }

    /// Returns the soft idle timeout as a Duration.
    pub fn soft_idle_timeout(&self) -> Option<Duration> {
        self.soft_idle_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            strength: Strength::Soft,
            soft_idle_timeout_ms: None,
        }
    }
}

fn read_var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>> {
    read_var(key)
        .map(|raw| {
            raw.trim().parse().map_err(|_| CacheError::InvalidConfig {
                key: key.to_string(),
                value: raw.clone(),
            })
        })
        .transpose()
}
