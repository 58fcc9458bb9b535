//! Collector Module
//!
//! Stands in for a tracing garbage collector. Each cache holds its values at
//! a uniform [`Strength`]; [`Cache::collect`] clears the referents that
//! strength allows to go, given the current [`MemoryPressure`], and queues
//! them for the reaper. Nothing runs this on its own: hosts call it from
//! whatever memory monitor they have.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::Cache;
use crate::error::CacheError;

// == Strength ==
/// How eagerly referents may be reclaimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Strength {
    /// Reclaimed under critical pressure, or after the soft idle timeout
    #[default]
    Soft,
    /// Reclaimed at every collection
    Weak,
}

impl FromStr for Strength {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "soft" => Ok(Self::Soft),
            "weak" => Ok(Self::Weak),
            _ => Err(CacheError::UnknownStrength(s.to_string())),
        }
    }
}

impl TryFrom<String> for Strength {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Soft => "soft",
            Self::Weak => "weak",
        })
    }
}

// == Memory Pressure ==
/// Severity of the memory shortage that triggered a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryPressure {
    /// Routine collection: weak referents and idle soft referents go
    Normal,
    /// Memory is short: every collectible referent goes
    Critical,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
{
    // == Collect ==
    /// Clears every referent that may be reclaimed under `pressure` and
    /// queues its reference for the reaper.
    ///
    /// Only referents held by nothing but this cache are eligible, and null
    /// values never are. Collected entries read as absent immediately, but
    /// stay mapped and unnotified until the next operation or
    /// [`clean_up`](Cache::clean_up). Returns the number of referents cleared.
    pub fn collect(&self, pressure: MemoryPressure) -> usize {
        let now = Instant::now();
        let strength = self.strength;
        let soft_idle = self.soft_idle_timeout;

        let collectible = move |last_access: Instant| match (strength, pressure) {
            (Strength::Weak, _) | (Strength::Soft, MemoryPressure::Critical) => true,
            (Strength::Soft, MemoryPressure::Normal) => soft_idle
                .is_some_and(|idle| now.saturating_duration_since(last_access) >= idle),
        };

        let cleared = self
            .map
            .iter()
            .filter(|entry| entry.value().collect_if(&self.queue, collectible))
            .count();

        debug!(
            "Collection ({:?}, {}): cleared {} referents, {} references pending",
            pressure,
            strength,
            cleared,
            self.queue.len()
        );
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_strength_parse() {
        assert_eq!("soft".parse::<Strength>().unwrap(), Strength::Soft);
        assert_eq!("WEAK".parse::<Strength>().unwrap(), Strength::Weak);
        assert!(matches!(
            "phantom".parse::<Strength>(),
            Err(CacheError::UnknownStrength(_))
        ));
    }

    #[test]
    fn test_strength_deserialize_matches_parse() {
        let weak: Strength = serde_json::from_str(r#""Weak""#).unwrap();
        assert_eq!(weak, Strength::Weak);
        let soft: Strength = serde_json::from_str(r#""SOFT""#).unwrap();
        assert_eq!(soft, Strength::Soft);
        assert!(serde_json::from_str::<Strength>(r#""phantom""#).is_err());

        // Serialization stays lowercase.
        assert_eq!(serde_json::to_string(&Strength::Weak).unwrap(), r#""weak""#);
    }

    #[test]
    fn test_weak_cache_collects_at_normal_pressure() {
        let cache = Cache::weak_cache();
        cache.put("a", 1);
        cache.put("b", 2);

        assert_eq!(cache.collect(MemoryPressure::Normal), 2);
        assert!(cache.get(&"a").is_none());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_soft_cache_survives_normal_pressure() {
        let cache = Cache::soft_cache();
        cache.put("a", 1);

        assert_eq!(cache.collect(MemoryPressure::Normal), 0);
        assert_eq!(cache.get(&"a").as_deref(), Some(&1));

        assert_eq!(cache.collect(MemoryPressure::Critical), 1);
        assert!(cache.get(&"a").is_none());
    }

    #[test]
    fn test_soft_idle_timeout() {
        let cache = Cache::soft_cache().with_soft_idle_timeout(Duration::from_millis(20));
        cache.put("idle", 1);
        cache.put("busy", 2);

        sleep(Duration::from_millis(40));
        assert!(cache.get(&"busy").is_some());

        assert_eq!(cache.collect(MemoryPressure::Normal), 1);
        assert!(cache.get(&"idle").is_none());
        assert!(cache.get(&"busy").is_some());
    }

    #[test]
    fn test_values_held_outside_are_not_collected() {
        let cache = Cache::weak_cache();
        cache.put("a", 1);
        let held = cache.get(&"a");

        assert_eq!(cache.collect(MemoryPressure::Critical), 0);
        drop(held);
        assert_eq!(cache.collect(MemoryPressure::Critical), 1);
    }

    #[test]
    fn test_collect_does_not_reap() {
        let cache = Cache::weak_cache();
        cache.put("a", 1);

        cache.collect(MemoryPressure::Normal);
        assert_eq!(cache.stats().total_entries, 1);
        assert_eq!(cache.stats().removals.collected, 0);

        cache.clean_up();
        assert_eq!(cache.stats().total_entries, 0);
        assert_eq!(cache.stats().removals.collected, 1);
    }
}
