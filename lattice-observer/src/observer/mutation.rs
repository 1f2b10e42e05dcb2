//! Structural mutation: adding and removing keys after observation.
//!
//! Only keys present when a container was observed carry reactive
//! properties. [`set`] and [`del`] are the sanctioned way to change the
//! shape of an observed container so that subscribers see it.

use crate::error::{self, Diagnostic, StructuralOp};
use crate::value::{Array, Key, Object, Value};

use super::define::define_reactive;

/// Set `key` on `target`, adding a reactive property if `target` is
/// observed and the key is new. Returns the value.
///
/// For arrays, an index write is routed through `splice`, so it is
/// observed and notified. `"length"` resizes the array without notifying.
///
/// Root state and framework instances refuse new keys: a diagnostic is
/// emitted and the value is returned without being assigned.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Value {
    let key = key.into();
    let value = value.into();

    match target {
        Value::Array(array) => set_on_array(array, &key, &value),
        Value::Object(object) => set_on_object(object, &key, &value),
        _ => invalid_target(StructuralOp::Set, target),
    }
    value
}

fn set_on_array(array: &Array, key: &Key, value: &Value) {
    if let Some(index) = key.as_index() {
        if index > Array::MAX_INDEX {
            error::emit(Diagnostic::InvalidArrayIndex {
                op: StructuralOp::Set,
                index,
            });
            return;
        }
        array.set_len(array.len().max(index));
        array.splice(index, 1, [value.clone()]);
        return;
    }

    if key.as_name() != "length" {
        error::emit(Diagnostic::UnsupportedArrayKey {
            op: StructuralOp::Set,
            key: key.to_string(),
        });
        return;
    }

    match array_length(value) {
        Some(len) => array.set_len(len),
        None => error::emit(Diagnostic::InvalidArrayLength {
            value: value.to_string(),
        }),
    }
}

fn array_length(value: &Value) -> Option<usize> {
    let n = value.as_f64()?;
    (n >= 0.0 && n.fract() == 0.0 && n <= Array::MAX_LEN as f64).then_some(n as usize)
}

fn set_on_object(object: &Object, key: &Key, value: &Value) {
    let name = key.as_name();

    if object.contains_key(&name) {
        object.set(&name, value.clone());
        return;
    }

    let observer = object.observer();
    if object.is_instance() || observer.as_ref().is_some_and(|ob| ob.is_root()) {
        error::emit(Diagnostic::RootMutationRejected {
            op: StructuralOp::Set,
            key: name.into_owned(),
        });
        return;
    }

    let Some(observer) = observer else {
        object.set(&name, value.clone());
        return;
    };

    define_reactive(object, &name, Some(value.clone()), None, false);
    tracing::trace!(key = %name, "reactive key added");
    observer.dep().notify();
}

/// Delete `key` from `target`, notifying if `target` is observed.
///
/// For arrays, an index is removed through `splice`; named keys are
/// ignored. Root state and framework instances refuse deletion with a
/// diagnostic. Missing keys are a no-op.
pub fn del(target: &Value, key: impl Into<Key>) {
    let key = key.into();

    match target {
        Value::Array(array) => {
            if let Some(index) = key.as_index() {
                array.splice(index, 1, Vec::new());
            }
        }
        Value::Object(object) => del_on_object(object, &key),
        _ => invalid_target(StructuralOp::Delete, target),
    }
}

fn del_on_object(object: &Object, key: &Key) {
    let name = key.as_name();
    let observer = object.observer();

    if object.is_instance() || observer.as_ref().is_some_and(|ob| ob.is_root()) {
        error::emit(Diagnostic::RootMutationRejected {
            op: StructuralOp::Delete,
            key: name.into_owned(),
        });
        return;
    }

    match object.delete(&name) {
        Ok(true) => {
            if let Some(observer) = observer {
                observer.dep().notify();
            }
        }
        Ok(false) => {}
        Err(err) => tracing::trace!(%err, "delete refused"),
    }
}

fn invalid_target(op: StructuralOp, target: &Value) {
    error::emit(Diagnostic::InvalidTarget {
        op,
        target: target.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{override_with, Config};
    use crate::observer::observe;
    use crate::reactive::Watcher;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn observed(json: serde_json::Value) -> Value {
        let value = Value::from(json);
        observe(&value, false);
        value
    }

    fn container_watcher(value: &Value) -> Rc<Watcher> {
        let dep = Rc::clone(value.observer().unwrap().dep());
        Watcher::new(move || dep.depend())
    }

    fn capture_diagnostics() -> (Rc<RefCell<Vec<Diagnostic>>>, crate::config::ConfigGuard) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let guard = override_with(
            Config::default().with_warn_handler(move |d| sink.borrow_mut().push(d.clone())),
        );
        (seen, guard)
    }

    #[test]
    fn set_existing_key_assigns_directly() {
        let value = observed(json!({ "a": 1 }));
        let container = container_watcher(&value);

        assert_eq!(set(&value, "a", 2), Value::from(2));
        assert_eq!(value.as_object().unwrap().get("a"), Value::from(2));
        assert_eq!(container.run_count(), 1);
    }

    #[test]
    fn set_new_key_on_observed_object_is_reactive() {
        let value = observed(json!({}));
        let obj = value.as_object().unwrap().clone();
        let container = container_watcher(&value);

        set(&value, "fresh", 5);
        assert_eq!(container.run_count(), 2);

        let watcher = {
            let obj = obj.clone();
            Watcher::new(move || {
                obj.get("fresh");
            })
        };
        obj.set("fresh", 6);
        assert_eq!(watcher.run_count(), 2);
    }

    #[test]
    fn set_on_unobserved_object_stays_plain() {
        let value = Value::from(json!({}));
        set(&value, "plain", Object::new());

        let obj = value.as_object().unwrap();
        assert_eq!(obj.keys(), vec!["plain"]);
        assert!(obj.get("plain").observer().is_none());
    }

    #[test]
    fn set_rejects_root_state() {
        let (seen, _guard) = capture_diagnostics();
        let value = Value::from(json!({}));
        observe(&value, true);
        let container = container_watcher(&value);

        assert_eq!(set(&value, "late", 5), Value::from(5));
        assert!(!value.as_object().unwrap().contains_key("late"));
        assert_eq!(container.run_count(), 1);
        assert!(matches!(
            seen.borrow().as_slice(),
            [Diagnostic::RootMutationRejected { op: StructuralOp::Set, .. }]
        ));
    }

    #[test]
    fn set_rejects_instances() {
        let (seen, _guard) = capture_diagnostics();
        let instance = Object::new();
        instance.mark_instance();

        set(&Value::from(instance.clone()), "x", 1);
        assert!(!instance.contains_key("x"));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn set_index_on_array_splices() {
        let value = observed(json!([1, 2, 3]));
        let arr = value.as_array().unwrap().clone();
        let container = container_watcher(&value);

        let item = Object::new();
        set(&value, 1usize, item.clone());
        assert_eq!(arr.get(1), Value::from(item.clone()));
        assert!(item.observer().is_some());
        assert_eq!(container.run_count(), 2);

        set(&value, "5", 9);
        assert_eq!(arr.len(), 6);
        assert_eq!(arr.get(3), Value::Undefined);
        assert_eq!(arr.get(5), Value::from(9));
    }

    #[test]
    fn set_rejects_out_of_range_array_index() {
        let (seen, _guard) = capture_diagnostics();
        let value = observed(json!([1, 2]));
        let arr = value.as_array().unwrap().clone();
        let container = container_watcher(&value);

        assert_eq!(set(&value, usize::MAX, 3), Value::from(3));
        set(&value, "4294967295", 3);
        assert_eq!(arr.to_vec(), vec![Value::from(1), Value::from(2)]);
        assert_eq!(container.run_count(), 1);
        assert_eq!(
            *seen.borrow(),
            vec![
                Diagnostic::InvalidArrayIndex {
                    op: StructuralOp::Set,
                    index: usize::MAX
                },
                Diagnostic::InvalidArrayIndex {
                    op: StructuralOp::Set,
                    index: u32::MAX as usize
                },
            ]
        );

        // Removal clamps instead.
        del(&value, usize::MAX);
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn set_length_and_named_keys_on_array() {
        let (seen, _guard) = capture_diagnostics();
        let value = observed(json!([1, 2, 3]));
        let arr = value.as_array().unwrap().clone();
        let container = container_watcher(&value);

        set(&value, "length", 1);
        assert_eq!(arr.len(), 1);
        assert_eq!(container.run_count(), 1);

        set(&value, "length", -1);
        set(&value, "name", "x");
        assert_eq!(arr.len(), 1);
        assert!(matches!(
            seen.borrow().as_slice(),
            [
                Diagnostic::InvalidArrayLength { .. },
                Diagnostic::UnsupportedArrayKey { .. }
            ]
        ));
    }

    #[test]
    fn invalid_targets_report_and_pass_value_through() {
        let (seen, _guard) = capture_diagnostics();

        assert_eq!(set(&Value::Null, "a", 1), Value::from(1));
        del(&Value::from(3), "a");
        assert!(matches!(
            seen.borrow().as_slice(),
            [
                Diagnostic::InvalidTarget { op: StructuralOp::Set, .. },
                Diagnostic::InvalidTarget { op: StructuralOp::Delete, .. }
            ]
        ));
    }

    #[test]
    fn diagnostics_are_silent_in_production() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _guard = override_with(Config {
            production: true,
            ..Config::default().with_warn_handler(move |d| sink.borrow_mut().push(d.clone()))
        });

        set(&Value::Undefined, "a", 1);
        let root = Value::from(json!({}));
        observe(&root, true);
        set(&root, "a", 1);

        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn del_removes_and_notifies() {
        let value = observed(json!({ "a": 1, "b": 2 }));
        let container = container_watcher(&value);

        del(&value, "a");
        assert_eq!(value.as_object().unwrap().keys(), vec!["b"]);
        assert_eq!(container.run_count(), 2);

        del(&value, "missing");
        assert_eq!(container.run_count(), 2);
    }

    #[test]
    fn del_on_unobserved_object_just_deletes() {
        let value = Value::from(json!({ "a": 1 }));
        del(&value, "a");
        assert!(value.as_object().unwrap().is_empty());
    }

    #[test]
    fn del_rejects_root_state() {
        let (seen, _guard) = capture_diagnostics();
        let value = Value::from(json!({ "a": 1 }));
        observe(&value, true);

        del(&value, "a");
        assert!(value.as_object().unwrap().contains_key("a"));
        assert!(matches!(
            seen.borrow().as_slice(),
            [Diagnostic::RootMutationRejected { op: StructuralOp::Delete, .. }]
        ));
    }

    #[test]
    fn del_index_on_array_splices() {
        let value = observed(json!([0, 1, 2, 3, 4]));
        let arr = value.as_array().unwrap().clone();
        let container = container_watcher(&value);

        del(&value, 2usize);
        assert_eq!(
            arr.to_vec(),
            vec![Value::from(0), Value::from(1), Value::from(3), Value::from(4)]
        );
        assert_eq!(container.run_count(), 2);

        del(&value, "name");
        assert_eq!(arr.len(), 4);
        assert_eq!(container.run_count(), 2);
    }
}
