//! Cache Module
//!
//! Provides a concurrent expiring cache whose values can also be reclaimed by
//! a collector, with exactly-once removal notifications.

mod collector;
mod listener;
mod queue;
mod reaper;
mod reference;
mod stats;
mod store;
mod value;


// Re-export public types
pub use collector::{MemoryPressure, Strength};
pub use listener::{RemovalCause, RemovalListener};
pub use stats::{CacheStats, RemovalCounts};
pub use store::Cache;
pub use value::{Val, Value};

// == Public Constants ==
/// Initial capacity of the backing store when none is given
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;
