//! Keyed objects.
//!
//! An [`Object`] is an ordered map from names to property slots. A slot is
//! either plain data, a user-defined accessor pair, or a reactive property
//! installed by the observer. Reading and writing through [`Object::get`]
//! and [`Object::set`] dispatches on the slot kind, which is how an
//! instrumented property tracks its readers and notifies on writes.
//!
//! The attached observer lives in a private field, never among the keys, so
//! it cannot be enumerated, overwritten or deleted.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::Value;
use crate::error::PropertyError;
use crate::observer::{Observer, ReactiveProperty};

/// A user-defined property getter. Receives the owning object.
pub type Getter = Rc<dyn Fn(&Object) -> Value>;

/// A user-defined property setter. Receives the owning object.
pub type Setter = Rc<dyn Fn(&Object, Value)>;

#[derive(Clone)]
pub(crate) enum SlotKind {
    Data(Value),
    Accessor {
        get: Option<Getter>,
        set: Option<Setter>,
    },
    Reactive(Rc<ReactiveProperty>),
}

#[derive(Clone)]
pub(crate) struct Slot {
    pub(crate) kind: SlotKind,
    pub(crate) enumerable: bool,
    pub(crate) configurable: bool,
    /// Only meaningful for data slots.
    pub(crate) writable: bool,
}

impl Slot {
    fn data(value: Value) -> Self {
        Self {
            kind: SlotKind::Data(value),
            enumerable: true,
            configurable: true,
            writable: true,
        }
    }

    pub(crate) fn reactive(property: Rc<ReactiveProperty>) -> Self {
        Self {
            kind: SlotKind::Reactive(property),
            enumerable: true,
            configurable: true,
            writable: true,
        }
    }

    /// The slot seen as a getter/setter pair.
    ///
    /// An installed reactive property counts as an accessor, so installing
    /// over it chains the new property onto the old one.
    pub(crate) fn accessor_pair(&self) -> (Option<Getter>, Option<Setter>) {
        match &self.kind {
            SlotKind::Data(_) => (None, None),
            SlotKind::Accessor { get, set } => (get.clone(), set.clone()),
            SlotKind::Reactive(property) => {
                let reader = Rc::clone(property);
                let writer = Rc::clone(property);
                let get: Getter = Rc::new(move |obj| reader.get(obj));
                let set: Setter = Rc::new(move |obj, value| writer.set(obj, value));
                (Some(get), Some(set))
            }
        }
    }
}

/// Describes a property for [`Object::define_property`].
///
/// All flags default to `true`, matching a property created by assignment.
#[derive(Clone)]
pub struct PropertyDescriptor {
    kind: SlotKind,
    enumerable: bool,
    configurable: bool,
    writable: bool,
}

impl PropertyDescriptor {
    /// A data property holding `value`.
    pub fn data(value: impl Into<Value>) -> Self {
        Self {
            kind: SlotKind::Data(value.into()),
            enumerable: true,
            configurable: true,
            writable: true,
        }
    }

    /// An accessor property.
    pub fn accessor(get: Option<Getter>, set: Option<Setter>) -> Self {
        Self {
            kind: SlotKind::Accessor { get, set },
            enumerable: true,
            configurable: true,
            writable: true,
        }
    }

    pub fn enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = enumerable;
        self
    }

    pub fn configurable(mut self, configurable: bool) -> Self {
        self.configurable = configurable;
        self
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }
}

struct ObjectInner {
    props: RefCell<IndexMap<String, Slot>>,
    observer: RefCell<Option<Rc<Observer>>>,
    extensible: Cell<bool>,
    raw: Cell<bool>,
    instance: Cell<bool>,
}

/// A keyed object handle.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    /// Create an empty, extensible object.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                props: RefCell::new(IndexMap::new()),
                observer: RefCell::new(None),
                extensible: Cell::new(true),
                raw: Cell::new(false),
                instance: Cell::new(false),
            }),
        }
    }

    /// Define a plain data property, replacing whatever was there.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), PropertyError> {
        self.define_property(key, PropertyDescriptor::data(value))
    }

    /// Define an accessor property.
    pub fn define_accessor(
        &self,
        key: impl Into<String>,
        get: Option<Getter>,
        set: Option<Setter>,
    ) -> Result<(), PropertyError> {
        self.define_property(key, PropertyDescriptor::accessor(get, set))
    }

    /// Define a property from a full descriptor.
    ///
    /// Fails if the key exists and is non-configurable, or if the key is new
    /// and the object is not extensible.
    pub fn define_property(
        &self,
        key: impl Into<String>,
        descriptor: PropertyDescriptor,
    ) -> Result<(), PropertyError> {
        let key = key.into();
        let mut props = self.inner.props.borrow_mut();

        match props.get(&key) {
            Some(slot) if !slot.configurable => return Err(PropertyError::NonConfigurable(key)),
            None if !self.inner.extensible.get() => return Err(PropertyError::NotExtensible(key)),
            _ => {}
        }

        props.insert(
            key,
            Slot {
                kind: descriptor.kind,
                enumerable: descriptor.enumerable,
                configurable: descriptor.configurable,
                writable: descriptor.writable,
            },
        );
        Ok(())
    }

    /// Read a property. Missing keys read as `undefined`.
    ///
    /// Reading a reactive property while a subscriber is evaluating
    /// registers that subscriber with the property.
    pub fn get(&self, key: &str) -> Value {
        let kind = match self.inner.props.borrow().get(key) {
            Some(slot) => slot.kind.clone(),
            None => return Value::Undefined,
        };

        match kind {
            SlotKind::Data(value) => value,
            SlotKind::Accessor { get, .. } => get.map(|get| get(self)).unwrap_or_default(),
            SlotKind::Reactive(property) => property.get(self),
        }
    }

    /// Write a property, silently ignoring writes the object refuses.
    ///
    /// A missing key becomes a plain property, which is not reactive even if
    /// the object is observed. Use [`crate::set`] to add reactive keys.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        if let Err(err) = self.try_set(key, value) {
            tracing::trace!(%err, "write ignored");
        }
    }

    /// Write a property, reporting refused writes.
    pub fn try_set(&self, key: &str, value: impl Into<Value>) -> Result<(), PropertyError> {
        let value = value.into();
        let existing = self
            .inner
            .props
            .borrow()
            .get(key)
            .map(|slot| (slot.kind.clone(), slot.writable));

        match existing {
            Some((SlotKind::Data(_), true)) => {
                if let Some(slot) = self.inner.props.borrow_mut().get_mut(key) {
                    slot.kind = SlotKind::Data(value);
                }
                Ok(())
            }
            Some((SlotKind::Data(_), false)) | Some((SlotKind::Accessor { set: None, .. }, _)) => {
                Err(PropertyError::ReadOnly(key.to_string()))
            }
            Some((SlotKind::Accessor { set: Some(set), .. }, _)) => {
                set(self, value);
                Ok(())
            }
            Some((SlotKind::Reactive(property), _)) => {
                property.set(self, value);
                Ok(())
            }
            None if self.inner.extensible.get() => {
                self.inner
                    .props
                    .borrow_mut()
                    .insert(key.to_string(), Slot::data(value));
                Ok(())
            }
            None => Err(PropertyError::NotExtensible(key.to_string())),
        }
    }

    /// Remove an own property. Returns whether a property was removed.
    pub fn delete(&self, key: &str) -> Result<bool, PropertyError> {
        let mut props = self.inner.props.borrow_mut();
        match props.get(key) {
            None => Ok(false),
            Some(slot) if !slot.configurable => Err(PropertyError::NonConfigurable(key.to_string())),
            Some(_) => {
                props.shift_remove(key);
                Ok(true)
            }
        }
    }

    /// Check for an own property, enumerable or not.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.props.borrow().contains_key(key)
    }

    /// Own enumerable keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .props
            .borrow()
            .iter()
            .filter(|(_, slot)| slot.enumerable)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of own properties.
    pub fn len(&self) -> usize {
        self.inner.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forbid new keys. Existing keys keep working.
    pub fn prevent_extensions(&self) {
        self.inner.extensible.set(false);
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.extensible.get()
    }

    /// Forbid new keys and make every existing property non-configurable,
    /// and every data property read-only.
    pub fn freeze(&self) {
        self.prevent_extensions();
        for slot in self.inner.props.borrow_mut().values_mut() {
            slot.configurable = false;
            slot.writable = false;
        }
    }

    pub fn is_frozen(&self) -> bool {
        !self.is_extensible()
            && self.inner.props.borrow().values().all(|slot| {
                !slot.configurable && (!slot.writable || !matches!(slot.kind, SlotKind::Data(_)))
            })
    }

    /// Tag this object as never reactive (render output and similar).
    pub fn mark_raw(&self) {
        self.inner.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.inner.raw.get()
    }

    /// Tag this object as a framework instance.
    ///
    /// Instances are never observed, and `set`/`del` refuse to change their
    /// shape.
    pub fn mark_instance(&self) {
        self.inner.instance.set(true);
    }

    pub fn is_instance(&self) -> bool {
        self.inner.instance.get()
    }

    /// The observer attached to this object, if any.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.observer.borrow().clone()
    }

    /// Check whether two handles point at the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address-based identity, stable for the object's lifetime.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    pub(crate) fn slot(&self, key: &str) -> Option<Slot> {
        self.inner.props.borrow().get(key).cloned()
    }

    /// Install a slot without the definition checks. Keeps the key's position.
    pub(crate) fn install(&self, key: &str, slot: Slot) {
        self.inner.props.borrow_mut().insert(key.to_string(), slot);
    }

    pub(crate) fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.inner))
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for Object
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Object::new();
        {
            let mut props = object.inner.props.borrow_mut();
            for (key, value) in iter {
                props.insert(key.into(), Slot::data(value.into()));
            }
        }
        object
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &format_args!("{:#x}", self.identity()))
            .field("keys", &self.keys())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}

/// Non-owning handle, held by the object's observer.
#[derive(Clone)]
pub(crate) struct WeakObject(Weak<ObjectInner>);

impl WeakObject {
    pub(crate) fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(|inner| Object { inner })
    }
}
