//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive values:
//! render functions, watchers, computed properties. The observer core only
//! needs to identify a subscriber, let it record the channels it reads, and
//! re-invoke it when one of those channels notifies.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::dep::Dep;

/// Unique identifier for a subscriber.
///
/// Each subscriber gets a unique ID when created. Dependency channels key
/// their subscriber sets by this ID, which is what suppresses duplicate
/// registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
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

/// A computation that can be registered with dependency channels.
///
/// Registration is bidirectional. When a channel's `depend` runs, it hands
/// itself to the active subscriber through [`Subscriber::add_dep`]; only if
/// the subscriber reports the channel as new for this evaluation does the
/// channel store the subscriber in return.
pub trait Subscriber {
    /// The subscriber's unique ID.
    fn id(&self) -> SubscriberId;

    /// Record that the current evaluation read `dep`.
    ///
    /// Returns `true` if `dep` was not yet recorded during this evaluation.
    fn add_dep(&self, dep: &Rc<Dep>) -> bool;

    /// Re-evaluation entry point, invoked synchronously by `Dep::notify`.
    fn update(&self);
}
