//! Reference Queue Module
//!
//! Holds retired or collected references until the reaper drains them.

use std::sync::Arc;

use crossbeam_deque::{Injector, Steal};

use crate::cache::reference::ValueReference;

// == Reference Queue ==
/// Lock-free FIFO of references awaiting finalization. Any number of threads
/// may push and poll at once.
pub(crate) struct ReferenceQueue<K, V> {
    pending: Injector<Arc<ValueReference<K, V>>>,
}

impl<K, V> ReferenceQueue<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            pending: Injector::new(),
        }
    }

    pub(crate) fn push(&self, reference: Arc<ValueReference<K, V>>) {
        self.pending.push(reference);
    }

    /// Removes the oldest pending reference without blocking on new arrivals.
    pub(crate) fn poll(&self) -> Option<Arc<ValueReference<K, V>>> {
        loop {
            match self.pending.steal() {
                Steal::Success(reference) => return Some(reference),
                Steal::Empty => return None,
                // Lost a race with another poller, try again
                Steal::Retry => continue,
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
