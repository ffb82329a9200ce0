//! Dep Implementation
//!
//! A Dep is the unit of dependency identity: one per tracked slot, plus one
//! per wrapped container for shape changes (keys added or removed, array
//! mutations). It keeps a broadcast list of subscribers.
//!
//! Subscribers are held weakly. A Dep never keeps a watcher alive; the
//! owning instance does. Duplicate suppression happens on the watcher side
//! (see [`Watcher::add_dep`](super::Watcher)), so `add_sub` is a plain append.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::context::ReactiveContext;
use super::{Subscriber, SubscriberId};

/// Unique identifier for a dep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

type SubscriberList = SmallVec<[(SubscriberId, Weak<dyn Subscriber>); 4]>;

/// A broadcast list of subscribers tied to one reactive slot or container.
pub struct Dep {
    id: DepId,
    subs: Mutex<SubscriberList>,
}

impl Dep {
    pub fn new() -> Self {
        Self {
            id: DepId::next(),
            subs: Mutex::new(SmallVec::new()),
        }
    }

    pub fn id(&self) -> DepId {
        self.id
    }

    /// Append a subscriber.
    pub fn add_sub(&self, id: SubscriberId, sub: Weak<dyn Subscriber>) {
        trace!(dep = self.id.raw(), subscriber = id.raw(), "subscribe");
        self.subs.lock().push((id, sub));
    }

    /// Remove a subscriber. Dead entries are pruned along the way.
    pub fn remove_sub(&self, id: SubscriberId) {
        trace!(dep = self.id.raw(), subscriber = id.raw(), "unsubscribe");
        let mut subs = self.subs.lock();
        if let Some(position) = subs.iter().position(|(sub_id, _)| *sub_id == id) {
            subs.remove(position);
        }
        subs.retain(|(_, sub)| sub.strong_count() > 0);
    }

    /// Register this dep with the active computation, if there is one.
    pub fn depend(self: &Arc<Self>) {
        if let Some(target) = ReactiveContext::current() {
            target.add_dep(self);
        }
    }

    /// Notify every subscriber.
    ///
    /// The list is snapshotted first: an update may re-evaluate a watcher,
    /// which subscribes to and unsubscribes from this same dep.
    pub fn notify(&self) {
        let snapshot: SubscriberList = self.subs.lock().clone();
        for (_, sub) in snapshot {
            if let Some(sub) = sub.upgrade() {
                sub.update();
            }
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subs
            .lock()
            .iter()
            .filter(|(_, sub)| sub.strong_count() > 0)
            .count()
    }

    /// Whether `id` is currently subscribed.
    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.subs.lock().iter().any(|(sub_id, _)| *sub_id == id)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
