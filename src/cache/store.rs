//! Cache Store Module
//!
//! The public cache facade. Combines the concurrent backing map with the
//! reference queue and resolves expiry and null values for callers.
//!
//! Every operation finishes by draining the reference queue (see
//! [`Cache::clean_up`]). No background thread exists, so an idle cache does
//! not clean itself: collected or expired entries are only finalized, and
//! their listener notified, when some thread next calls into the cache.

use std::borrow::Borrow;
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::cache::queue::ReferenceQueue;
use crate::cache::reference::ValueReference;
use crate::cache::stats::StatsCounter;
use crate::cache::{
    CacheStats, RemovalCause, RemovalListener, Strength, Val, Value, DEFAULT_INITIAL_CAPACITY,
};
use crate::config::CacheConfig;

// == Cache ==
/// Thread-safe expiring cache with collector-assisted eviction.
///
/// Values are shared as `Arc<V>`. A value that nothing outside the cache
/// holds can be reclaimed by [`collect`](Cache::collect), according to the
/// cache's [`Strength`].
pub struct Cache<K, V> {
    pub(super) map: DashMap<K, Arc<ValueReference<K, V>>>,
    pub(super) queue: ReferenceQueue<K, V>,
    pub(super) listener: Option<Arc<dyn RemovalListener<K, V>>>,
    pub(super) stats: StatsCounter,
    pub(super) strength: Strength,
    pub(super) soft_idle_timeout: Option<Duration>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
{
    // == Constructors ==
    fn new(strength: Strength, initial_capacity: usize) -> Self {
        Self {
            map: DashMap::with_capacity(initial_capacity),
            queue: ReferenceQueue::new(),
            listener: None,
            stats: StatsCounter::default(),
            strength,
            soft_idle_timeout: None,
        }
    }

    /// Creates a cache whose values are reclaimed only under critical
    /// memory pressure.
    pub fn soft_cache() -> Self {
        Self::new(Strength::Soft, DEFAULT_INITIAL_CAPACITY)
    }

    /// Creates a cache whose values are reclaimed at every collection.
    pub fn weak_cache() -> Self {
        Self::new(Strength::Weak, DEFAULT_INITIAL_CAPACITY)
    }

    pub fn soft_cache_with_capacity(initial_capacity: usize) -> Self {
        Self::new(Strength::Soft, initial_capacity)
    }

    pub fn weak_cache_with_capacity(initial_capacity: usize) -> Self {
        Self::new(Strength::Weak, initial_capacity)
    }

    /// Creates a cache from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut cache = Self::new(config.strength, config.initial_capacity);
        cache.soft_idle_timeout = config.soft_idle_timeout();
        cache
    }

    /// Installs the listener told about every removal.
    pub fn with_removal_listener<L>(mut self, listener: L) -> Self
    where
        L: RemovalListener<K, V> + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Lets soft referents unread for `idle` go under normal memory pressure.
    pub fn with_soft_idle_timeout(mut self, idle: Duration) -> Self {
        self.soft_idle_timeout = Some(idle);
        self
    }

    // == Get ==
    /// Returns the value for `key`, or None if the entry is absent, expired,
    /// collected, or holds a null value.
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_val(key).and_then(Val::into_inner)
    }

    /// Returns the entry for `key`, keeping a present null value apart from
    /// an absent entry.
    pub fn get_val<Q>(&self, key: &Q) -> Option<Val<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let value = self.lookup(key, Instant::now());
        self.stats.record_read(value.is_some());
        self.clean_up();
        value
    }

    fn lookup<Q>(&self, key: &Q, now: Instant) -> Option<Val<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        // Clone the reference out so no shard lock is held while resolving.
        let reference = self.map.get(key).map(|entry| Arc::clone(entry.value()))?;
        reference.resolve(now, &self.queue)
    }

    // == Put ==
    /// Stores `value` under `key` with no expiry, returning the previous value.
    pub fn put(&self, key: K, value: V) -> Option<Arc<V>> {
        self.put_val(key, Value::new(value)).and_then(Val::into_inner)
    }

    /// Stores `value`, which may be null and may carry a time-to-live,
    /// returning the previous entry if it was still live.
    ///
    /// The previous reference is notified as `Replaced`.
    pub fn put_val(&self, key: K, value: Value<V>) -> Option<Val<V>> {
        let now = Instant::now();
        let expires_at = value.deadline(now);
        let reference = ValueReference::new(key.clone(), value.data, expires_at);

        let previous = self
            .map
            .insert(key, reference)
            .and_then(|previous| previous.retire(RemovalCause::Replaced, now, &self.queue));

        self.clean_up();
        previous
    }

    // == Remove ==
    /// Removes the entry for `key`, returning its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_val(key).and_then(Val::into_inner)
    }

    /// Removes the entry for `key`, returning it if it was still live.
    ///
    /// The removed reference is notified as `Explicit`.
    pub fn remove_val<Q>(&self, key: &Q) -> Option<Val<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.map.remove(key).and_then(|(_, reference)| {
            reference.retire(RemovalCause::Explicit, Instant::now(), &self.queue)
        });

        self.clean_up();
        removed
    }

    // == Compute ==
    /// Returns the live value for `key`, or stores and returns the one
    /// produced by `loader`.
    ///
    /// Concurrent calls for the same key run `loader` at most once. The
    /// loader runs while the key's shard is locked, so it must not call back
    /// into this cache.
    pub fn compute<F>(&self, key: K, loader: F) -> Option<Arc<V>>
    where
        F: FnOnce(&K) -> V,
    {
        match self.try_compute(key, |key| Ok::<_, Infallible>(loader(key))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`compute`](Cache::compute) with a fallible loader.
    ///
    /// A loader error is returned unchanged and leaves no entry behind.
    pub fn try_compute<E, F>(&self, key: K, loader: F) -> Result<Option<Arc<V>>, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        self.try_compute_val(key, |key| loader(key).map(|value| Some(Value::new(value))))
            .map(|value| value.and_then(Val::into_inner))
    }

    /// Returns the live entry for `key`, or installs the one produced by
    /// `loader`. A loader returning None installs nothing.
    pub fn compute_val<F>(&self, key: K, loader: F) -> Option<Val<V>>
    where
        F: FnOnce(&K) -> Option<Value<V>>,
    {
        match self.try_compute_val(key, |key| Ok::<_, Infallible>(loader(key))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`compute_val`](Cache::compute_val) with a fallible loader.
    pub fn try_compute_val<E, F>(&self, key: K, loader: F) -> Result<Option<Val<V>>, E>
    where
        F: FnOnce(&K) -> Result<Option<Value<V>>, E>,
    {
        let result = self.load(key, loader);
        self.clean_up();
        result
    }

    fn load<E, F>(&self, key: K, loader: F) -> Result<Option<Val<V>>, E>
    where
        F: FnOnce(&K) -> Result<Option<Value<V>>, E>,
    {
        match self.map.entry(key) {
            Entry::Occupied(mut entry) => {
                if let Some(value) = entry.get().resolve(Instant::now(), &self.queue) {
                    self.stats.record_hit();
                    return Ok(Some(value));
                }

                // The mapped reference is dead and already queued for the reaper.
                self.stats.record_miss();
                self.stats.record_load();
                let Some(value) = loader(entry.key())? else {
                    return Ok(None);
                };
                let (reference, loaded) = Self::install(entry.key().clone(), value);
                entry.insert(reference);
                Ok(Some(loaded))
            }
            Entry::Vacant(entry) => {
                self.stats.record_miss();
                self.stats.record_load();
                let Some(value) = loader(entry.key())? else {
                    return Ok(None);
                };
                let (reference, loaded) = Self::install(entry.key().clone(), value);
                entry.insert(reference);
                Ok(Some(loaded))
            }
        }
    }

    fn install(key: K, value: Value<V>) -> (Arc<ValueReference<K, V>>, Val<V>) {
        let expires_at = value.deadline(Instant::now());
        let data = value.data.map(Arc::new);
        let reference = ValueReference::with_shared(key, data.clone(), expires_at);
        (reference, Val::new(data))
    }

    // == Contains ==
    /// Returns true if a live entry, possibly null, exists for `key`.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_val(key).is_some()
    }

    // == Expire ==
    /// Replaces the time-to-live of a live entry, measured from now. None
    /// removes time-based expiry altogether.
    ///
    /// Has no effect on an absent or already dead entry; returns whether the
    /// new window was applied.
    pub fn expire<Q>(&self, key: &Q, ttl: Option<Duration>) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let applied = self
            .map
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .is_some_and(|reference| reference.expire_after(Instant::now(), ttl));

        self.clean_up();
        applied
    }

    // == Size ==
    /// Returns the number of mapped entries after reaping.
    ///
    /// Entries collected since the last reap may still be counted, so this is
    /// an upper bound on the live entries.
    pub fn size(&self) -> usize {
        self.clean_up();
        self.map.len()
    }

    /// Returns true if no entries are mapped after reaping.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    // == Clear ==
    /// Removes every entry. Each is notified as `Expired` if its deadline has
    /// already passed, as `Explicit` otherwise.
    pub fn clear(&self) {
        let now = Instant::now();
        let mut cleared = 0usize;

        self.map.retain(|_, reference| {
            reference.retire(RemovalCause::Explicit, now, &self.queue);
            cleared += 1;
            false
        });

        debug!("Cache cleared: {} entries removed", cleared);
        self.clean_up();
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.map.len())
    }

    /// Returns the reference strength of this cache.
    pub fn strength(&self) -> Strength {
        self.strength
    }
}

impl<K, V> fmt::Debug for Cache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("strength", &self.strength)
            .field("entries", &self.map.len())
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread::sleep;

    type Removals = Arc<Mutex<Vec<(&'static str, Option<i32>, RemovalCause)>>>;

    fn recording_cache() -> (Cache<&'static str, i32>, Removals) {
        let removals: Removals = Arc::default();
        let sink = Arc::clone(&removals);
        let cache = Cache::soft_cache().with_removal_listener(
            move |key: &&'static str, value: Option<Arc<i32>>, cause: RemovalCause| {
                sink.lock()
                    .unwrap()
                    .push((*key, value.as_deref().copied(), cause));
            },
        );
        (cache, removals)
    }

    #[test]
    fn test_cache_new() {
        let cache: Cache<String, String> = Cache::soft_cache();
        assert_eq!(cache.size(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.strength(), Strength::Soft);
    }

    #[test]
    fn test_put_and_get() {
        let cache = Cache::soft_cache();

        assert!(cache.put("key1".to_string(), "value1".to_string()).is_none());
        assert_eq!(cache.get("key1").as_deref().map(String::as_str), Some("value1"));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let cache: Cache<&str, i32> = Cache::soft_cache();
        assert!(cache.get(&"nonexistent").is_none());
        assert!(cache.get_val(&"nonexistent").is_none());
    }

    #[test]
    fn test_null_value_is_present() {
        let cache: Cache<&str, i32> = Cache::soft_cache();
        cache.put_val("nothing", Value::null());

        assert!(cache.get(&"nothing").is_none());
        assert!(cache.get_val(&"nothing").unwrap().is_null());
        assert!(cache.contains(&"nothing"));
    }

    #[test]
    fn test_put_returns_previous_value() {
        let (cache, removals) = recording_cache();

        cache.put("a", 1);
        assert_eq!(cache.put("a", 2).as_deref(), Some(&1));
        assert_eq!(cache.get(&"a").as_deref(), Some(&2));
        assert_eq!(
            *removals.lock().unwrap(),
            vec![("a", Some(1), RemovalCause::Replaced)]
        );
    }

    #[test]
    fn test_replaced_expired_entry_reports_expired() {
        let (cache, removals) = recording_cache();

        cache.put_val("a", Value::new(1).expire_after(Duration::from_millis(1)));
        sleep(Duration::from_millis(10));

        // The old value is no longer returned, but the listener still sees it.
        assert!(cache.put("a", 2).is_none());
        assert_eq!(
            *removals.lock().unwrap(),
            vec![("a", Some(1), RemovalCause::Expired)]
        );
    }

    #[test]
    fn test_remove() {
        let (cache, removals) = recording_cache();

        cache.put("a", 1);
        assert_eq!(cache.remove(&"a").as_deref(), Some(&1));
        assert!(cache.remove(&"a").is_none());
        assert!(cache.get(&"a").is_none());
        assert_eq!(
            *removals.lock().unwrap(),
            vec![("a", Some(1), RemovalCause::Explicit)]
        );
    }

    #[test]
    fn test_remove_val_of_null() {
        let cache: Cache<&str, i32> = Cache::soft_cache();
        cache.put_val("a", Value::null());

        assert!(cache.remove_val(&"a").unwrap().is_null());
        assert!(cache.remove_val(&"a").is_none());
    }

    #[test]
    fn test_ttl_expiration() {
        let (cache, removals) = recording_cache();

        cache.put_val("a", Value::new(1).expire_after(Duration::from_millis(1)));
        sleep(Duration::from_millis(10));

        assert!(cache.get(&"a").is_none());
        assert!(!cache.contains(&"a"));
        assert_eq!(cache.size(), 0);
        assert_eq!(
            *removals.lock().unwrap(),
            vec![("a", Some(1), RemovalCause::Expired)]
        );
    }

    #[test]
    fn test_expire_sets_and_clears_deadline() {
        let cache = Cache::soft_cache();
        cache.put("short", 1);
        cache.put("forever", 2);
        cache.put_val("cleared", Value::new(3).expire_after(Duration::from_millis(1)));

        assert!(cache.expire(&"short", Some(Duration::from_millis(1))));
        assert!(cache.expire(&"forever", None));
        sleep(Duration::from_millis(10));

        assert!(cache.get(&"short").is_none());
        assert_eq!(cache.get(&"forever").as_deref(), Some(&2));
        // Already expired: not resurrected.
        assert!(!cache.expire(&"cleared", None));
        assert!(cache.get(&"cleared").is_none());
        assert!(!cache.expire(&"missing", None));
    }

    #[test]
    fn test_expire_none_makes_entry_immortal() {
        let cache = Cache::soft_cache();
        cache.put_val("a", Value::new(1).expire_after(Duration::from_millis(20)));

        assert!(cache.expire(&"a", None));
        sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&"a").as_deref(), Some(&1));
    }

    #[test]
    fn test_compute_loads_once() {
        let cache = Cache::soft_cache();
        let mut calls = 0;

        let first = cache.compute("a", |_| {
            calls += 1;
            10
        });
        let second = cache.compute("a", |_| {
            calls += 1;
            20
        });

        assert_eq!(first.as_deref(), Some(&10));
        assert_eq!(second.as_deref(), Some(&10));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_compute_replaces_expired_entry() {
        let (cache, removals) = recording_cache();
        cache.put_val("a", Value::new(1).expire_after(Duration::from_millis(1)));
        sleep(Duration::from_millis(10));

        assert_eq!(cache.compute("a", |_| 2).as_deref(), Some(&2));
        assert_eq!(cache.get(&"a").as_deref(), Some(&2));
        assert_eq!(
            *removals.lock().unwrap(),
            vec![("a", Some(1), RemovalCause::Expired)]
        );
    }

    #[test]
    fn test_compute_val_none_installs_nothing() {
        let (cache, removals) = recording_cache();

        assert!(cache.compute_val("a", |_| None).is_none());
        assert!(!cache.contains(&"a"));
        assert_eq!(cache.size(), 0);
        assert!(removals.lock().unwrap().is_empty());
    }

    #[test]
    fn test_compute_val_short_circuits_on_null() {
        let cache: Cache<&str, i32> = Cache::soft_cache();
        cache.put_val("a", Value::null());

        let value = cache.compute_val("a", |_| Some(Value::new(5)));
        assert!(value.unwrap().is_null());
    }

    #[test]
    fn test_try_compute_error_leaves_no_entry() {
        let cache: Cache<&str, i32> = Cache::soft_cache();

        let result = cache.try_compute("a", |_| Err("loader failed"));
        assert_eq!(result, Err("loader failed"));
        assert!(!cache.contains(&"a"));
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_clear() {
        let (cache, removals) = recording_cache();
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put_val("c", Value::new(3).expire_after(Duration::from_millis(1)));
        sleep(Duration::from_millis(10));

        cache.clear();

        assert_eq!(cache.size(), 0);
        let mut seen = removals.lock().unwrap().clone();
        seen.sort_by_key(|(key, _, _)| *key);
        assert_eq!(
            seen,
            vec![
                ("a", Some(1), RemovalCause::Explicit),
                ("b", Some(2), RemovalCause::Explicit),
                ("c", Some(3), RemovalCause::Expired),
            ]
        );
    }

    #[test]
    fn test_stats() {
        let cache = Cache::soft_cache();

        cache.put("a", 1);
        cache.get(&"a");
        cache.get(&"missing");
        cache.compute("b", |_| 2);
        cache.remove(&"a");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.removals.explicit, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_from_config() {
        let config = CacheConfig {
            initial_capacity: 4,
            strength: Strength::Weak,
            soft_idle_timeout_ms: Some(100),
        };
        let cache: Cache<u64, u64> = Cache::from_config(&config);

        assert_eq!(cache.strength(), Strength::Weak);
        assert_eq!(cache.soft_idle_timeout, Some(Duration::from_millis(100)));
    }
}
