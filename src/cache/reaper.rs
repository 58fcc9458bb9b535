//! Reaper Module
//!
//! Drains the reference queue and finalizes each reference found there.

use std::hash::Hash;
use std::sync::Arc;

use tracing::trace;

use crate::cache::Cache;

impl<K, V> Cache<K, V>
where
    K: Eq + Hash,
{
    // == Clean Up ==
    /// Finalizes every retired or collected reference waiting in the queue
    /// and delivers its removal notification.
    ///
    /// Runs at the end of every cache operation; call it directly to deliver
    /// pending notifications without waiting for the next one.
    ///
    /// A reference is unmapped only if its key still maps to that exact
    /// reference, so a newer entry for the same key is left alone. A listener
    /// that panics unwinds out of this call: the notification it was handling
    /// is lost and the rest of the queue waits for the next pass.
    pub fn clean_up(&self) {
        while let Some(reference) = self.queue.poll() {
            let unmapped = self
                .map
                .remove_if(reference.key(), |_, current| Arc::ptr_eq(current, &reference))
                .is_some();

            let (cause, value) = reference.finalize();
            self.stats.record_removal(cause);
            trace!("Reaped cache entry: cause={}, unmapped={}", cause, unmapped);

            if let Some(listener) = &self.listener {
                listener.on_removal(reference.key(), value, cause);
            }
        }
    }
}
