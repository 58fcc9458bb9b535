//! Value Wrappers Module
//!
//! `Value` carries data into the cache together with an optional per-entry
//! time-to-live. `Val` carries data out of the cache and keeps "present but
//! null" apart from "absent".

use std::sync::Arc;
use std::time::{Duration, Instant};

// == Value ==
/// A value to store, possibly null, with an optional time-to-live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value<V> {
    /// The stored data, None = null value
    pub data: Option<V>,
    /// Time-to-live measured from the moment of insertion, None = no expiry
    pub ttl: Option<Duration>,
}

impl<V> Value<V> {
    // == Constructors ==
    /// Creates a value that never expires by time.
    pub fn new(data: V) -> Self {
        Self {
            data: Some(data),
            ttl: None,
        }
    }

    /// Creates a null value.
    pub fn null() -> Self {
        Self {
            data: None,
            ttl: None,
        }
    }

    /// Sets the time-to-live of this value.
    pub fn expire_after(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Resolves the time-to-live into a deadline relative to `now`.
    ///
    /// A deadline beyond what `Instant` can represent is treated as none.
    pub(crate) fn deadline(&self, now: Instant) -> Option<Instant> {
        self.ttl.and_then(|ttl| now.checked_add(ttl))
    }
}

impl<V> From<V> for Value<V> {
    fn from(data: V) -> Self {
        Value::new(data)
    }
}

// == Val ==
/// A value read from the cache: present, but possibly null.
///
/// Methods returning `Option<Val<V>>` use `None` for "no entry" and
/// `Some(Val)` with a null payload for "entry present, value is null".
#[derive(Debug)]
pub struct Val<V>(Option<Arc<V>>);

impl<V> Val<V> {
    pub(crate) fn new(data: Option<Arc<V>>) -> Self {
        Self(data)
    }

    /// Returns the payload, None when the stored value is null.
    pub fn get(&self) -> Option<&V> {
        self.0.as_deref()
    }

    /// Returns true if the stored value is null.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Unwraps into the shared payload.
    pub fn into_inner(self) -> Option<Arc<V>> {
        self.0
    }
}

impl<V> Clone for Val<V> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<V: PartialEq> PartialEq for Val<V> {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}
