//! Value Reference Module
//!
//! One `ValueReference` backs each logical cache entry. It owns the referent,
//! the optional expiry deadline and the removal cause, all guarded by the
//! reference's own lock so that explicit actions and the collector can race
//! on it safely.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::cache::queue::ReferenceQueue;
use crate::cache::{RemovalCause, Val};

// == Referent ==
/// What the reference currently points at.
enum Referent<V> {
    /// A stored null value. Never collectible.
    Null,
    /// A stored value.
    Live(Arc<V>),
    /// Cleared by the collector or taken by the reaper.
    Cleared,
}

impl<V> Referent<V> {
    /// Reads the referent, None when it has been cleared.
    fn read(&self) -> Option<Val<V>> {
        match self {
            Referent::Null => Some(Val::new(None)),
            Referent::Live(value) => Some(Val::new(Some(Arc::clone(value)))),
            Referent::Cleared => None,
        }
    }
}

struct State<V> {
    referent: Referent<V>,
    /// Entry is dead once the current time is past this instant
    expires_at: Option<Instant>,
    /// Last successful read, drives the soft idle policy
    last_access: Instant,
    /// Assigned at most once, by whichever observer finalizes first
    cause: Option<RemovalCause>,
    /// Set together with the first push onto the reference queue
    enqueued: bool,
}

impl<V> State<V> {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }
}

// == Value Reference ==
pub(crate) struct ValueReference<K, V> {
    key: K,
    state: Mutex<State<V>>,
}

impl<K, V> ValueReference<K, V> {
    // == Constructor ==
    /// Creates a reference holding `data`, None storing a null value.
    pub(crate) fn new(key: K, data: Option<V>, expires_at: Option<Instant>) -> Arc<Self> {
        Self::with_shared(key, data.map(Arc::new), expires_at)
    }

    /// Creates a reference around an already shared value.
    pub(crate) fn with_shared(
        key: K,
        data: Option<Arc<V>>,
        expires_at: Option<Instant>,
    ) -> Arc<Self> {
        let referent = match data {
            Some(value) => Referent::Live(value),
            None => Referent::Null,
        };

        Arc::new(Self {
            key,
            state: Mutex::new(State {
                referent,
                expires_at,
                last_access: Instant::now(),
                cause: None,
                enqueued: false,
            }),
        })
    }

    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    fn lock(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(self: &Arc<Self>, state: &mut State<V>, queue: &ReferenceQueue<K, V>) {
        if !state.enqueued {
            state.enqueued = true;
            queue.push(Arc::clone(self));
        }
    }

    // == Resolve ==
    /// Reads the current value of a reference that is still mapped.
    ///
    /// Returns None if the entry is logically gone. Detecting that the
    /// deadline has passed retires the reference with `Expired`.
    pub(crate) fn resolve(
        self: &Arc<Self>,
        now: Instant,
        queue: &ReferenceQueue<K, V>,
    ) -> Option<Val<V>> {
        let mut state = self.lock();
        if state.cause.is_some() {
            return None;
        }
        if state.is_expired(now) {
            state.cause = Some(RemovalCause::Expired);
            self.enqueue(&mut state, queue);
            return None;
        }

        let value = state.referent.read();
        if value.is_some() {
            state.last_access = now;
        }
        value
    }

    // == Retire ==
    /// Finalizes a reference that has just been unmapped or superseded.
    ///
    /// Returns the value it held at that moment. An already expired reference
    /// yields no value and is retired with `Expired` instead of `cause`. If a
    /// cause was assigned earlier, that one stands.
    pub(crate) fn retire(
        self: &Arc<Self>,
        cause: RemovalCause,
        now: Instant,
        queue: &ReferenceQueue<K, V>,
    ) -> Option<Val<V>> {
        let mut state = self.lock();
        if state.cause.is_some() {
            return None;
        }

        let (cause, value) = if state.is_expired(now) {
            (RemovalCause::Expired, None)
        } else {
            (cause, state.referent.read())
        };
        state.cause = Some(cause);
        self.enqueue(&mut state, queue);
        value
    }

    // == Expire After ==
    /// Replaces the expiry window of a live reference. None removes it.
    ///
    /// Returns false, changing nothing, if the reference is already dead.
    pub(crate) fn expire_after(&self, now: Instant, ttl: Option<Duration>) -> bool {
        let mut state = self.lock();
        if state.cause.is_some()
            || state.is_expired(now)
            || matches!(state.referent, Referent::Cleared)
        {
            return false;
        }

        state.expires_at = ttl.and_then(|ttl| now.checked_add(ttl));
        true
    }

    // == Collect ==
    /// Clears the referent if nothing outside the cache holds it and
    /// `collectible` accepts its last access time, then enqueues the
    /// reference without assigning a cause.
    pub(crate) fn collect_if<F>(
        self: &Arc<Self>,
        queue: &ReferenceQueue<K, V>,
        collectible: F,
    ) -> bool
    where
        F: FnOnce(Instant) -> bool,
    {
        let mut state = self.lock();
        if state.cause.is_some() {
            return false;
        }

        let unreachable =
            matches!(&state.referent, Referent::Live(value) if Arc::strong_count(value) == 1);
        if !unreachable || !collectible(state.last_access) {
            return false;
        }

        state.referent = Referent::Cleared;
        self.enqueue(&mut state, queue);
        true
    }

    // == Finalize ==
    /// Settles the removal cause, defaulting to `Collected`, and hands over
    /// whatever value is still held. Called once by the reaper.
    pub(crate) fn finalize(&self) -> (RemovalCause, Option<Arc<V>>) {
        let mut state = self.lock();
        let cause = *state.cause.get_or_insert(RemovalCause::Collected);
        let value = match mem::replace(&mut state.referent, Referent::Cleared) {
            Referent::Live(value) => Some(value),
            Referent::Null | Referent::Cleared => None,
        };
        (cause, value)
    }
}
