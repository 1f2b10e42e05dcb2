//! Reactive Primitives
//!
//! This module implements the tracking half of the observer: dependency
//! channels, the active-subscriber stack, and a minimal subscriber.
//!
//! # Concepts
//!
//! ## Dependency channels
//!
//! A [`Dep`] exists for every reactive property and for every observed
//! container as a whole. Reading registers the active subscriber; writing
//! notifies every registered subscriber.
//!
//! ## Subscribers
//!
//! A [`Subscriber`] is any computation that must re-run when state it read
//! changes. Render functions and watchers live outside this crate; the
//! [`Watcher`] here is the smallest complete implementation and is what the
//! tests drive the observer with.
//!
//! ## Context
//!
//! The [`ReactiveContext`] is a thread-local stack recording which
//! subscriber is evaluating right now. Subscribers push themselves around
//! each evaluation; the observer only ever asks who is on top.
//!
//! # Implementation Notes
//!
//! Channels hold subscribers weakly and subscribers hold channels strongly,
//! so dropping a subscriber is enough to detach it.

mod context;
mod dep;
mod subscriber;
mod watcher;

pub use context::{pop_target, push_target, untracked, ReactiveContext};
pub use dep::{Dep, DepId};
pub use subscriber::{Subscriber, SubscriberId};
pub use watcher::{Watcher, MAX_PASSES};
