//! Subscriber types for the reactive system.
//!
//! A Subscriber is anything a [`Dep`] can notify: in practice a
//! [`Watcher`](super::Watcher), though tests plug in lightweight mocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::Dep;

/// Unique identifier for a subscriber.
///
/// Ids are handed out from a monotonic counter, so they also encode creation
/// order. The flush scheduler relies on this: a watcher created before
/// another always re-runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A computation that collects dependencies and reacts to their changes.
pub trait Subscriber: Send + Sync {
    /// Get the subscriber ID.
    fn subscriber_id(&self) -> SubscriberId;

    /// Record that `dep` was read during the evaluation in progress.
    fn add_dep(&self, dep: &Arc<Dep>);

    /// Called by a [`Dep`] when one of its values changed.
    fn update(&self);
}
