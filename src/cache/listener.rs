//! Removal Listener Module
//!
//! Defines why an entry left the cache and the callback that is told about it.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

// == Removal Cause ==
/// The reason an entry was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalCause {
    /// Removed by `remove`, `remove_val` or `clear`
    Explicit,
    /// Overwritten by `put` or `put_val`
    Replaced,
    /// Referent reclaimed by the collector before any explicit action
    Collected,
    /// Time-to-live elapsed
    Expired,
    /// Capacity-bound eviction. Reserved, never produced by this cache.
    Size,
}

impl RemovalCause {
    /// Returns true if the entry was removed automatically rather than by
    /// an explicit caller action.
    pub fn was_evicted(&self) -> bool {
        matches!(self, Self::Collected | Self::Expired | Self::Size)
    }
}

impl fmt::Display for RemovalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Explicit => "explicit",
            Self::Replaced => "replaced",
            Self::Collected => "collected",
            Self::Expired => "expired",
            Self::Size => "size",
        };
        f.write_str(name)
    }
}

// == Removal Listener ==
/// Receives exactly one notification per entry that leaves the cache.
///
/// Notifications are delivered synchronously on whichever thread happens to
/// run the reaper, which is any thread calling into the cache. Implementations
/// must therefore be cheap, must not panic, and may be re-entered from
/// within another operation on the same cache.
///
/// `value` is None when the stored value was null or when the collector had
/// already cleared it, whatever the cause.
pub trait RemovalListener<K, V>: Send + Sync {
    fn on_removal(&self, key: &K, value: Option<Arc<V>>, cause: RemovalCause);
}

impl<K, V, F> RemovalListener<K, V> for F
where
    F: Fn(&K, Option<Arc<V>>, RemovalCause) + Send + Sync,
{
    fn on_removal(&self, key: &K, value: Option<Arc<V>>, cause: RemovalCause) {
        self(key, value, cause)
    }
}
