//! Dependency Channel
//!
//! A `Dep` is the fan-out primitive behind every reactive property and
//! every observed container. It remembers which subscribers read it and
//! re-invokes them when it is notified.
//!
//! # How Channels Work
//!
//! 1. A tracked read calls [`Dep::depend`]. If a subscriber is evaluating,
//!    the channel and the subscriber register with each other.
//!
//! 2. A write calls [`Dep::notify`], which synchronously runs every
//!    registered subscriber in registration order.
//!
//! Subscribers are free to re-read (and so re-register with) the channel
//! that is notifying them, or to stop reading it. `notify` iterates a
//! snapshot taken when it starts, so the live set may change underneath.
//!
//! Subscribers are held weakly. A dropped subscriber is pruned the next
//! time the channel notifies.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::subscriber::{Subscriber, SubscriberId};

/// Unique identifier for a dependency channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A dependency channel.
pub struct Dep {
    id: DepId,

    /// Registered subscribers in insertion order.
    subs: RefCell<IndexMap<SubscriberId, Weak<dyn Subscriber>>>,
}

impl Dep {
    /// Create a channel with no subscribers.
    pub fn new() -> Self {
        Self {
            id: DepId::next(),
            subs: RefCell::new(IndexMap::new()),
        }
    }

    /// Get the channel's unique ID.
    pub fn id(&self) -> DepId {
        self.id
    }

    /// Register a subscriber. Registering twice is a no-op.
    pub fn add_sub(&self, sub: &Rc<dyn Subscriber>) {
        self.subs
            .borrow_mut()
            .entry(sub.id())
            .or_insert_with(|| Rc::downgrade(sub));
    }

    /// Remove a subscriber.
    pub fn remove_sub(&self, id: SubscriberId) {
        self.subs.borrow_mut().shift_remove(&id);
    }

    /// Register the active subscriber, if there is one.
    pub fn depend(self: &Rc<Self>) {
        if let Some(sub) = ReactiveContext::current_subscriber() {
            if sub.add_dep(self) {
                self.add_sub(&sub);
            }
        }
    }

    /// Synchronously re-invoke every registered subscriber.
    pub fn notify(&self) {
        let snapshot: SmallVec<[Rc<dyn Subscriber>; 4]> = {
            let mut subs = self.subs.borrow_mut();
            subs.retain(|_, sub| sub.strong_count() > 0);
            subs.values().filter_map(Weak::upgrade).collect()
        };

        tracing::debug!(dep = self.id.0, subscribers = snapshot.len(), "notify");

        for sub in snapshot {
            sub.update();
        }
    }

    /// Get the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subs
            .borrow()
            .values()
            .filter(|sub| sub.strong_count() > 0)
            .count()
    }

    /// Check whether `id` is registered.
    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.subs.borrow().contains_key(&id)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
