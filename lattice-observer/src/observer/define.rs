//! Reactive property installation.
//!
//! [`define_reactive`] replaces one key of an object with a reactive
//! property: a dependency channel plus the captured value, the child
//! observer for that value, and any accessor pair the key already had.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use super::{observe, Observer, Walker};
use crate::config;
use crate::reactive::{Dep, ReactiveContext};
use crate::value::{Array, Getter, Object, Setter, Slot, Value};

/// Hook run before a reactive write lands, outside production mode.
pub type CustomSetter = Rc<dyn Fn()>;

struct PropertyState {
    value: Value,
    child: Option<Rc<Observer>>,
}

/// One instrumented key.
pub(crate) struct ReactiveProperty {
    dep: Rc<Dep>,
    state: RefCell<PropertyState>,
    getter: Option<Getter>,
    setter: Option<Setter>,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
}

impl ReactiveProperty {
    fn current(&self, obj: &Object) -> Value {
        match &self.getter {
            Some(getter) => getter(obj),
            None => self.state.borrow().value.clone(),
        }
    }

    pub(crate) fn get(&self, obj: &Object) -> Value {
        let value = self.current(obj);

        if ReactiveContext::is_active() {
            self.dep.depend();
            let child = self.state.borrow().child.clone();
            if let Some(child) = child {
                child.dep().depend();
                if let Value::Array(array) = &value {
                    depend_array(array);
                }
            }
        }
        value
    }

    pub(crate) fn set(&self, obj: &Object, new_value: Value) {
        let old_value = self.current(obj);
        if Value::same_value(&new_value, &old_value) {
            return;
        }

        if let Some(custom_setter) = &self.custom_setter {
            if !config::is_production() {
                custom_setter();
            }
        }

        // Getter without setter: read-only.
        if self.getter.is_some() && self.setter.is_none() {
            return;
        }

        match &self.setter {
            Some(setter) => setter(obj, new_value.clone()),
            None => self.state.borrow_mut().value = new_value.clone(),
        }

        let child = if self.shallow {
            None
        } else {
            observe(&new_value, false)
        };
        self.state.borrow_mut().child = child;

        self.dep.notify();
    }

    #[cfg(test)]
    pub(crate) fn dep(&self) -> &Rc<Dep> {
        &self.dep
    }
}

/// Convert `key` on `obj` into a reactive property.
///
/// With `val` omitted, the current value is read from the object (unless
/// the key has a getter and no setter, in which case reads keep going
/// through the getter). Unless `shallow`, the value is observed too.
///
/// Keys that are non-configurable are left alone, as are new keys on an
/// object that is not extensible.
pub fn define_reactive(
    obj: &Object,
    key: &str,
    val: Option<Value>,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
) {
    let mut walker = Walker::default();
    define_reactive_in(obj, key, val, custom_setter, shallow, &mut walker);
    walker.drain();
}

pub(crate) fn define_reactive_in(
    obj: &Object,
    key: &str,
    val: Option<Value>,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
    walker: &mut Walker,
) {
    let existing = obj.slot(key);
    match &existing {
        Some(slot) if !slot.configurable => {
            tracing::trace!(key, "skipping non-configurable property");
            return;
        }
        None if !obj.is_extensible() => {
            tracing::trace!(key, "skipping new key on non-extensible object");
            return;
        }
        _ => {}
    }

    let (getter, setter) = existing
        .as_ref()
        .map(Slot::accessor_pair)
        .unwrap_or((None, None));

    let value = match val {
        Some(value) => value,
        None if getter.is_none() || setter.is_some() => obj.get(key),
        None => Value::Undefined,
    };

    let child = if shallow { None } else { walker.observe(&value) };

    let property = ReactiveProperty {
        dep: Rc::new(Dep::new()),
        state: RefCell::new(PropertyState { value, child }),
        getter,
        setter,
        custom_setter,
        shallow,
    };
    tracing::trace!(key, dep = property.dep.id().raw(), shallow, "reactive property installed");

    obj.install(key, Slot::reactive(Rc::new(property)));
}

/// Register the active subscriber with every observed element of `array`,
/// descending into nested arrays.
///
/// Element reads are not tracked, so touching an array counts as touching
/// each observed element's container channel.
pub(crate) fn depend_array(array: &Array) {
    let mut visited = HashSet::from([array.identity()]);
    let mut stack = vec![array.clone()];

    while let Some(current) = stack.pop() {
        for item in current.to_vec() {
            if let Some(observer) = item.observer() {
                observer.dep().depend();
            }
            if let Value::Array(nested) = item {
                if visited.insert(nested.identity()) {
                    stack.push(nested);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{override_with, Config};
    use crate::reactive::Watcher;
    use crate::value::SlotKind;
    use std::cell::Cell;

    fn reactive_dep(obj: &Object, key: &str) -> Rc<Dep> {
        match obj.slot(key).map(|slot| slot.kind) {
            Some(SlotKind::Reactive(property)) => Rc::clone(property.dep()),
            _ => panic!("`{key}` is not reactive"),
        }
    }

    fn watch(obj: &Object, key: &'static str) -> Rc<Watcher> {
        let obj = obj.clone();
        Watcher::new(move || {
            obj.get(key);
        })
    }

    #[test]
    fn install_keeps_value_and_position() {
        let obj: Object = [("a", 1), ("b", 2)].into_iter().collect();
        define_reactive(&obj, "a", None, None, false);

        assert_eq!(obj.keys(), vec!["a", "b"]);
        assert_eq!(obj.get("a"), Value::from(1));
        assert!(matches!(obj.slot("a").unwrap().kind, SlotKind::Reactive(_)));
    }

    #[test]
    fn explicit_value_overrides_current() {
        let obj: Object = [("a", 1)].into_iter().collect();
        define_reactive(&obj, "a", Some(Value::from(5)), None, false);
        assert_eq!(obj.get("a"), Value::from(5));
    }

    #[test]
    fn channel_is_stable_across_writes() {
        let obj: Object = [("a", 1)].into_iter().collect();
        define_reactive(&obj, "a", None, None, false);

        let before = reactive_dep(&obj, "a");
        obj.set("a", 2);
        obj.set("a", Object::new());
        assert!(Rc::ptr_eq(&before, &reactive_dep(&obj, "a")));
    }

    #[test]
    fn same_value_write_does_not_notify() {
        let nested = Object::new();
        let obj = Object::new();
        obj.insert("n", nested.clone()).unwrap();
        obj.insert("x", f64::NAN).unwrap();
        define_reactive(&obj, "n", None, None, false);
        define_reactive(&obj, "x", None, None, false);

        let watcher_n = watch(&obj, "n");
        let watcher_x = watch(&obj, "x");

        obj.set("n", nested);
        obj.set("x", f64::NAN);
        assert_eq!(watcher_n.run_count(), 1);
        assert_eq!(watcher_x.run_count(), 1);

        obj.set("x", 1);
        assert_eq!(watcher_x.run_count(), 2);
    }

    #[test]
    fn non_configurable_keys_are_skipped() {
        let obj = Object::new();
        obj.define_property(
            "fixed",
            crate::value::PropertyDescriptor::data(1).configurable(false),
        )
        .unwrap();

        define_reactive(&obj, "fixed", None, None, false);
        assert!(matches!(obj.slot("fixed").unwrap().kind, SlotKind::Data(_)));
    }

    #[test]
    fn getter_without_setter_discards_writes() {
        let calls = Rc::new(Cell::new(0));
        let obj = Object::new();
        {
            let calls = calls.clone();
            let get: Getter = Rc::new(move |_| {
                calls.set(calls.get() + 1);
                Value::from(42)
            });
            obj.define_accessor("answer", Some(get), None).unwrap();
        }
        define_reactive(&obj, "answer", None, None, false);

        let watcher = watch(&obj, "answer");
        obj.set("answer", 1);

        assert_eq!(obj.get("answer"), Value::from(42));
        assert_eq!(watcher.run_count(), 1);
        assert!(calls.get() >= 2);
    }

    #[test]
    fn existing_setter_receives_writes() {
        let store = Rc::new(RefCell::new(Value::from(1)));
        let obj = Object::new();
        {
            let (read, write) = (store.clone(), store.clone());
            let get: Getter = Rc::new(move |_| read.borrow().clone());
            let set: Setter = Rc::new(move |_, v| *write.borrow_mut() = v);
            obj.define_accessor("x", Some(get), Some(set)).unwrap();
        }
        define_reactive(&obj, "x", None, None, false);

        let watcher = watch(&obj, "x");
        obj.set("x", 2);

        assert_eq!(*store.borrow(), Value::from(2));
        assert_eq!(watcher.run_count(), 2);
    }

    #[test]
    fn shallow_properties_do_not_observe_values() {
        let nested = Object::new();
        let obj = Object::new();
        obj.insert("n", nested.clone()).unwrap();

        define_reactive(&obj, "n", None, None, true);
        assert!(nested.observer().is_none());

        let replacement = Object::new();
        obj.set("n", replacement.clone());
        assert!(replacement.observer().is_none());
    }

    #[test]
    fn custom_setter_runs_outside_production() {
        let calls = Rc::new(Cell::new(0));
        let hook: CustomSetter = {
            let calls = calls.clone();
            Rc::new(move || calls.set(calls.get() + 1))
        };

        let obj: Object = [("a", 1)].into_iter().collect();
        define_reactive(&obj, "a", None, Some(hook), false);

        obj.set("a", 2);
        assert_eq!(calls.get(), 1);

        let _guard = override_with(Config {
            production: true,
            ..Config::default()
        });
        obj.set("a", 3);
        assert_eq!(calls.get(), 1);
        assert_eq!(obj.get("a"), Value::from(3));
    }

    #[test]
    fn redefining_chains_onto_existing_property() {
        let obj: Object = [("a", 1)].into_iter().collect();
        define_reactive(&obj, "a", None, None, false);
        let inner_watcher = watch(&obj, "a");

        define_reactive(&obj, "a", None, None, false);
        obj.set("a", 2);

        assert_eq!(obj.get("a"), Value::from(2));
        // Once for the inner channel, once for the outer one.
        assert_eq!(inner_watcher.run_count(), 3);
    }

    #[test]
    fn depend_array_reaches_nested_elements() {
        let leaf = Object::new();
        let inner = Array::from(vec![Value::from(leaf.clone())]);
        let outer = Array::from(vec![Value::from(inner.clone()), Value::from(1)]);
        outer.push(outer.clone());
        observe(&Value::from(outer.clone()), false);

        let watcher = {
            let outer = outer.clone();
            Watcher::new(move || depend_array(&outer))
        };

        assert!(watcher.depends_on(inner.observer().unwrap().dep()));
        assert!(watcher.depends_on(leaf.observer().unwrap().dep()));
        assert!(watcher.depends_on(outer.observer().unwrap().dep()));
    }
}
