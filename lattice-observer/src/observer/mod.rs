//! Observation
//!
//! This module turns plain objects and arrays into tracked state.
//!
//! # How Observation Works
//!
//! 1. [`observe`] attaches an [`Observer`] to a container the first time it
//!    is seen. The observer carries the container-level dependency channel,
//!    used when the container's shape changes.
//!
//! 2. For an object, every own enumerable key is converted into a reactive
//!    property by [`define_reactive`]: reads register the active subscriber,
//!    writes notify.
//!
//! 3. For an array, the mutating operations start reporting to the
//!    observer (see [`ArrayMethod`]), and every element is observed in turn.
//!
//! 4. Keys added later must go through [`set`], and removed through
//!    [`del`], because only keys present at observation time were
//!    converted.
//!
//! # Traversal
//!
//! Nested containers are instrumented with an explicit work-list rather
//! than recursion, guarded by a set of visited identities, so deep or
//! cyclic graphs neither overflow the stack nor loop.

mod array;
mod define;
mod mutation;

pub use array::ArrayMethod;
pub use define::{define_reactive, CustomSetter};
pub use mutation::{del, set};

pub(crate) use array::intercept;
pub(crate) use define::ReactiveProperty;

use std::cell::Cell;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use crate::config;
use crate::reactive::Dep;
use crate::value::{Array, Object, Value, WeakArray, WeakObject};

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable creation of new observers.
///
/// Containers that are already observed keep working either way. Prefer
/// [`ObservingGuard`] or [`without_observing`], which restore the previous
/// state on every exit path.
pub fn toggle_observing(enabled: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(enabled));
}

fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// Scoped override of the observing flag.
///
/// Saves the current flag, sets the new one, and restores the saved value
/// when dropped, so nested overrides unwind correctly.
#[must_use = "the flag is restored as soon as the guard is dropped"]
pub struct ObservingGuard {
    previous: bool,
}

impl ObservingGuard {
    pub fn new(enabled: bool) -> Self {
        let previous = should_observe();
        toggle_observing(enabled);
        Self { previous }
    }
}

impl Drop for ObservingGuard {
    fn drop(&mut self) {
        toggle_observing(self.previous);
    }
}

/// Run `f` without creating new observers.
pub fn without_observing<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ObservingGuard::new(false);
    f()
}

/// Per-container observation metadata.
///
/// Holds the container-level dependency channel and the number of times
/// the container has been used as root state. The observer refers back to
/// its container weakly; it is reclaimed together with the container.
pub struct Observer {
    value: WeakContainer,
    dep: Rc<Dep>,
    vm_count: Cell<usize>,
}

impl Observer {
    /// Create the observer and attach it to `container` as its marker.
    fn attach(container: &Container) -> Rc<Self> {
        let observer = Rc::new(Self {
            value: container.downgrade(),
            dep: Rc::new(Dep::new()),
            vm_count: Cell::new(0),
        });
        container.attach_observer(Rc::clone(&observer));

        tracing::trace!(
            kind = container.kind(),
            dep = observer.dep.id().raw(),
            "observer attached"
        );
        observer
    }

    /// The container-level dependency channel.
    pub fn dep(&self) -> &Rc<Dep> {
        &self.dep
    }

    /// How many times the container was observed as root state.
    pub fn vm_count(&self) -> usize {
        self.vm_count.get()
    }

    /// Root state refuses ad hoc shape changes.
    pub fn is_root(&self) -> bool {
        self.vm_count() > 0
    }

    /// The observed container, if it is still alive.
    pub fn value(&self) -> Option<Value> {
        match &self.value {
            WeakContainer::Object(weak) => weak.upgrade().map(Value::Object),
            WeakContainer::Array(weak) => weak.upgrade().map(Value::Array),
        }
    }

    /// Observe each of `items`.
    pub fn observe_array(&self, items: &[Value]) {
        let mut walker = Walker::default();
        for item in items {
            walker.observe(item);
        }
        walker.drain();
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep)
            .field("vm_count", &self.vm_count())
            .finish()
    }
}

/// Attach an observer to `value`, or return the one already attached.
///
/// Returns `None` for primitives, raw-tagged containers and framework
/// instances. A container seen for the first time is only observed if
/// observing is enabled, rendering is not server-side, and the container is
/// extensible. With `as_root`, the resulting observer's root count is
/// incremented.
pub fn observe(value: &Value, as_root: bool) -> Option<Rc<Observer>> {
    let mut walker = Walker::default();
    let observer = walker.observe(value);
    walker.drain();

    if as_root {
        if let Some(observer) = &observer {
            observer.vm_count.set(observer.vm_count.get() + 1);
        }
    }
    observer
}

/// An observable container.
#[derive(Clone)]
enum Container {
    Object(Object),
    Array(Array),
}

impl Container {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(o) => Some(Container::Object(o.clone())),
            Value::Array(a) => Some(Container::Array(a.clone())),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Container::Object(_) => "object",
            Container::Array(_) => "array",
        }
    }

    fn identity(&self) -> usize {
        match self {
            Container::Object(o) => o.identity(),
            Container::Array(a) => a.identity(),
        }
    }

    fn observer(&self) -> Option<Rc<Observer>> {
        match self {
            Container::Object(o) => o.observer(),
            Container::Array(a) => a.observer(),
        }
    }

    fn is_raw(&self) -> bool {
        match self {
            Container::Object(o) => o.is_raw(),
            Container::Array(a) => a.is_raw(),
        }
    }

    fn is_observable(&self) -> bool {
        match self {
            Container::Object(o) => o.is_extensible() && !o.is_instance(),
            Container::Array(a) => a.is_extensible(),
        }
    }

    fn attach_observer(&self, observer: Rc<Observer>) {
        match self {
            Container::Object(o) => o.attach_observer(observer),
            Container::Array(a) => a.attach_observer(observer),
        }
    }

    fn downgrade(&self) -> WeakContainer {
        match self {
            Container::Object(o) => WeakContainer::Object(o.downgrade()),
            Container::Array(a) => WeakContainer::Array(a.downgrade()),
        }
    }
}

enum WeakContainer {
    Object(WeakObject),
    Array(WeakArray),
}

/// Work-list driven instrumentation.
///
/// `observe` attaches observers immediately but only queues the container's
/// contents; `drain` walks the queue. Each container is walked at most once
/// per traversal.
#[derive(Default)]
pub(crate) struct Walker {
    pending: VecDeque<Container>,
    visited: HashSet<usize>,
}

impl Walker {
    pub(crate) fn observe(&mut self, value: &Value) -> Option<Rc<Observer>> {
        let container = Container::from_value(value)?;
        if container.is_raw() {
            return None;
        }
        if let Some(observer) = container.observer() {
            return Some(observer);
        }
        if !should_observe() || config::is_server_rendering() || !container.is_observable() {
            return None;
        }

        let observer = Observer::attach(&container);
        if self.visited.insert(container.identity()) {
            self.pending.push_back(container);
        }
        Some(observer)
    }

    pub(crate) fn drain(&mut self) {
        while let Some(container) = self.pending.pop_front() {
            match container {
                Container::Object(object) => {
                    for key in object.keys() {
                        define::define_reactive_in(&object, &key, None, None, false, self);
                    }
                }
                Container::Array(array) => {
                    for item in array.to_vec() {
                        self.observe(&item);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{override_with, Config};
    use serde_json::json;

    fn object_value(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn observe_is_idempotent() {
        let value = object_value(json!({ "a": 1 }));

        let first = observe(&value, false).unwrap();
        let second = observe(&value, false).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert!(Rc::ptr_eq(&value.observer().unwrap(), &first));
    }

    #[test]
    fn primitives_are_not_observed() {
        for value in [Value::Undefined, Value::Null, Value::from(1), Value::from("s")] {
            assert!(observe(&value, false).is_none());
        }
    }

    #[test]
    fn nested_containers_are_observed() {
        let value = object_value(json!({ "nested": { "list": [{ "x": 1 }] } }));
        observe(&value, false);

        let nested = value.as_object().unwrap().get("nested");
        let list = nested.as_object().unwrap().get("list");
        let element = list.as_array().unwrap().get(0);

        assert!(nested.observer().is_some());
        assert!(list.observer().is_some());
        assert!(element.observer().is_some());
    }

    #[test]
    fn excluded_values_are_skipped() {
        let raw = Object::new();
        raw.mark_raw();
        assert!(observe(&Value::from(raw), false).is_none());

        let frozen = Object::new();
        frozen.freeze();
        assert!(observe(&Value::from(frozen), false).is_none());

        let instance = Object::new();
        instance.mark_instance();
        assert!(observe(&Value::from(instance), false).is_none());

        let sealed = Array::new();
        sealed.prevent_extensions();
        assert!(observe(&Value::from(sealed), false).is_none());
    }

    #[test]
    fn as_root_counts_uses() {
        let value = object_value(json!({}));

        let observer = observe(&value, true).unwrap();
        assert_eq!(observer.vm_count(), 1);
        assert!(observer.is_root());

        observe(&value, true);
        assert_eq!(observer.vm_count(), 2);

        observe(&value, false);
        assert_eq!(observer.vm_count(), 2);
    }

    #[test]
    fn toggle_observing_blocks_new_observers_only() {
        let existing = object_value(json!({}));
        let observer = observe(&existing, false).unwrap();

        let _guard = ObservingGuard::new(false);
        let fresh = object_value(json!({}));
        assert!(observe(&fresh, false).is_none());
        assert!(Rc::ptr_eq(&observe(&existing, false).unwrap(), &observer));
    }

    #[test]
    fn observing_guard_restores_previous_state() {
        assert!(should_observe());
        {
            let _outer = ObservingGuard::new(false);
            {
                let _inner = ObservingGuard::new(true);
                assert!(should_observe());
            }
            assert!(!should_observe());
        }
        assert!(should_observe());

        without_observing(|| assert!(!should_observe()));
        assert!(should_observe());
    }

    #[test]
    fn server_rendering_skips_observation() {
        let _guard = override_with(Config {
            server_rendering: true,
            ..Config::default()
        });
        assert!(observe(&object_value(json!({ "a": 1 })), false).is_none());
    }

    #[test]
    fn cyclic_graphs_terminate() {
        let obj = Object::new();
        obj.insert("me", obj.clone()).unwrap();
        let arr = Array::new();
        arr.push(arr.clone());
        obj.insert("arr", arr.clone()).unwrap();

        let observer = observe(&Value::from(obj.clone()), false).unwrap();
        assert!(Rc::ptr_eq(&obj.get("me").observer().unwrap(), &observer));
        assert!(arr.observer().is_some());
    }

    #[test]
    fn observer_does_not_keep_value_alive() {
        let value = object_value(json!({ "a": 1 }));
        let observer = observe(&value, false).unwrap();
        assert!(observer.value().is_some());

        drop(value);
        assert!(observer.value().is_none());
    }

    #[test]
    fn observe_array_observes_items() {
        let arr = Array::new();
        let observer = observe(&Value::from(arr), false).unwrap();

        let item = object_value(json!({ "x": 1 }));
        observer.observe_array(std::slice::from_ref(&item));
        assert!(item.observer().is_some());
    }
}
