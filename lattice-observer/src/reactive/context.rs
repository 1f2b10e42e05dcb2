//! Reactive Context
//!
//! The reactive context tracks which subscriber is currently evaluating.
//! This enables automatic dependency tracking: when a reactive property is
//! read, the current subscriber is registered with that property's channel.
//!
//! # Implementation
//!
//! We use a thread-local stack of targets. Entering an evaluation pushes the
//! subscriber; leaving it pops. An entry may also be empty, which suspends
//! tracking for nested code (see [`untracked`]).
//!
//! The stack must stay balanced or every later read registers with the
//! wrong subscriber. [`ReactiveContext::enter`] returns a guard that pops on
//! drop, including during unwinding. The raw [`push_target`]/[`pop_target`]
//! pair exists for subscriber components that manage the bracket themselves.

use std::cell::RefCell;
use std::rc::Rc;

use super::subscriber::{Subscriber, SubscriberId};

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Rc<dyn Subscriber>>>> = RefCell::new(Vec::new());
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any reactive property that is read
    /// registers the subscriber as a dependent.
    pub fn enter(subscriber: Rc<dyn Subscriber>) -> Self {
        let subscriber_id = Some(subscriber.id());
        push_target(Some(subscriber));
        Self { subscriber_id }
    }

    /// Enter a context in which reads register nothing.
    pub fn enter_untracked() -> Self {
        push_target(None);
        Self {
            subscriber_id: None,
        }
    }

    /// Check if a subscriber is currently evaluating.
    pub fn is_active() -> bool {
        TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Get the current subscriber, if any.
    pub fn current_subscriber() -> Option<Rc<dyn Subscriber>> {
        TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Number of entries on the stack, tracked or not.
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = pop_target();

        debug_assert_eq!(
            popped.as_ref().map(|s| s.id()),
            self.subscriber_id,
            "ReactiveContext mismatch: expected {:?}",
            self.subscriber_id,
        );
    }
}

/// Push a target onto the stack. `None` suspends tracking.
pub fn push_target(target: Option<Rc<dyn Subscriber>>) {
    TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
}

/// Pop the innermost target.
pub fn pop_target() -> Option<Rc<dyn Subscriber>> {
    TARGET_STACK.with(|stack| stack.borrow_mut().pop().flatten())
}

/// Run `f` with dependency tracking suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter_untracked();
    f()
}
