//! Ordered sequences.
//!
//! [`Array`] wraps a `Vec<Value>` and exposes read access plus exactly the
//! mutating operations the observer knows how to intercept: `push`, `pop`,
//! `shift`, `unshift`, `splice`, `sort` and `reverse`. Once the array is
//! observed, each of these observes any inserted elements and notifies the
//! array's container channel.
//!
//! [`Array::set_index`] and [`Array::set_len`] are also provided and are
//! deliberately *not* intercepted. Subscribers are not re-run when an index
//! is assigned directly or the length is changed; route such writes through
//! [`crate::set`]/[`crate::del`] or `splice` when they must be seen.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::Value;
use crate::observer::{intercept, ArrayMethod, Observer};

struct ArrayInner {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Rc<Observer>>>,
    extensible: Cell<bool>,
    raw: Cell<bool>,
}

/// An ordered sequence handle.
#[derive(Clone)]
pub struct Array {
    inner: Rc<ArrayInner>,
}

impl Array {
    /// Largest length an array may be given.
    pub const MAX_LEN: usize = u32::MAX as usize;

    /// Largest index that can be written.
    pub const MAX_INDEX: usize = Self::MAX_LEN - 1;

    /// Create an empty array.
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    /// Read the element at `index`. Out of range reads as `undefined`.
    ///
    /// Index reads are not tracked individually.
    pub fn get(&self, index: usize) -> Value {
        self.inner
            .items
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the current elements out.
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Iterate over a snapshot of the elements.
    pub fn iter(&self) -> std::vec::IntoIter<Value> {
        self.to_vec().into_iter()
    }

    /// Append one element. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        self.push_many([value.into()])
    }

    /// Append elements in order. Returns the new length.
    pub fn push_many(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let args: SmallVec<[Value; 4]> = values.into_iter().collect();
        if !args.is_empty() && !self.is_extensible() {
            return self.refuse_growth("push");
        }
        intercept(self, ArrayMethod::Push, &args, |items| {
            items.extend(args.iter().cloned());
            items.len()
        })
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Value {
        intercept(self, ArrayMethod::Pop, &[], |items| {
            items.pop().unwrap_or_default()
        })
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Value {
        intercept(self, ArrayMethod::Shift, &[], |items| {
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        })
    }

    /// Prepend one element. Returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        self.unshift_many([value.into()])
    }

    /// Prepend elements, keeping their order. Returns the new length.
    pub fn unshift_many(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let args: SmallVec<[Value; 4]> = values.into_iter().collect();
        if !args.is_empty() && !self.is_extensible() {
            return self.refuse_growth("unshift");
        }
        intercept(self, ArrayMethod::Unshift, &args, |items| {
            items.splice(0..0, args.iter().cloned());
            items.len()
        })
    }

    /// Remove `delete_count` elements at `start` and insert `values` there.
    /// Returns the removed elements.
    ///
    /// `start` is clamped to the length, and `delete_count` to the number of
    /// elements after `start`.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        values: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let len = self.len();
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);

        let mut args: SmallVec<[Value; 4]> = SmallVec::new();
        args.push(Value::from(start));
        args.push(Value::from(delete_count));
        args.extend(values);

        let inserted = args.len() - 2;
        if inserted > delete_count && !self.is_extensible() {
            self.refuse_growth("splice");
            return Vec::new();
        }

        intercept(self, ArrayMethod::Splice, &args, |items| {
            items
                .splice(start..start + delete_count, args[2..].iter().cloned())
                .collect()
        })
    }

    /// Sort in place by string coercion, with `undefined` last.
    pub fn sort(&self) {
        self.sort_by(default_compare);
    }

    /// Sort in place with a comparator. `undefined` always sorts last.
    ///
    /// The comparator runs on a snapshot, so it may read this array (an
    /// element can be the array itself). Writes it makes are overwritten by
    /// the sorted result.
    pub fn sort_by<F>(&self, mut compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let mut sorted = self.to_vec();
        sorted.sort_by(|a, b| match (a, b) {
            (Value::Undefined, Value::Undefined) => Ordering::Equal,
            (Value::Undefined, _) => Ordering::Greater,
            (_, Value::Undefined) => Ordering::Less,
            _ => compare(a, b),
        });
        intercept(self, ArrayMethod::Sort, &[], move |items| *items = sorted);
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        intercept(self, ArrayMethod::Reverse, &[], |items| items.reverse());
    }

    /// Assign an element directly, padding with `undefined` if needed.
    ///
    /// Not intercepted: subscribers are not notified and `value` is not
    /// observed.
    ///
    /// Indices above [`Array::MAX_INDEX`] are refused.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) {
        if index > Self::MAX_INDEX {
            tracing::trace!(index, "array index out of range");
            return;
        }
        let mut items = self.inner.items.borrow_mut();
        if index >= items.len() {
            if !self.is_extensible() {
                drop(items);
                self.refuse_growth("set_index");
                return;
            }
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value.into();
    }

    /// Truncate or pad with `undefined` to `len`.
    ///
    /// Not intercepted: subscribers are not notified. Lengths above
    /// [`Array::MAX_LEN`] are refused.
    pub fn set_len(&self, len: usize) {
        if len > Self::MAX_LEN {
            tracing::trace!(len, "array length out of range");
            return;
        }
        if len > self.len() && !self.is_extensible() {
            self.refuse_growth("set_len");
            return;
        }
        self.inner.items.borrow_mut().resize(len, Value::Undefined);
    }

    /// Forbid growth. Arrays whose extensions are prevented are never
    /// observed.
    pub fn prevent_extensions(&self) {
        self.inner.extensible.set(false);
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.extensible.get()
    }

    /// Tag this array as never reactive.
    pub fn mark_raw(&self) {
        self.inner.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.inner.raw.get()
    }

    /// The observer attached to this array, if any.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.observer.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address-based identity, stable for the array's lifetime.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    /// Run `f` on the backing vector. The borrow ends before `f`'s result is
    /// returned.
    pub(crate) fn with_items_mut<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        f(&mut self.inner.items.borrow_mut())
    }

    pub(crate) fn downgrade(&self) -> WeakArray {
        WeakArray(Rc::downgrade(&self.inner))
    }

    fn refuse_growth(&self, op: &str) -> usize {
        tracing::trace!(op, "array is not extensible");
        self.len()
    }
}

fn default_compare(a: &Value, b: &Value) -> Ordering {
    a.to_string().cmp(&b.to_string())
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                items: RefCell::new(items),
                observer: RefCell::new(None),
                extensible: Cell::new(true),
                raw: Cell::new(false),
            }),
        }
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from(iter.into_iter().map(Into::into).collect::<Vec<_>>())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("id", &format_args!("{:#x}", self.identity()))
            .field("len", &self.len())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}

/// Non-owning handle, held by the array's observer.
#[derive(Clone)]
pub(crate) struct WeakArray(Weak<ArrayInner>);

impl WeakArray {
    pub(crate) fn upgrade(&self) -> Option<Array> {
        self.0.upgrade().map(|inner| Array { inner })
    }
}
