//! Array mutation interception.

use std::fmt;

use crate::value::{Array, Value};

/// The array operations that report to an observed array's container
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayMethod {
    Push,
    Pop,
    Shift,
    Unshift,
    Splice,
    Sort,
    Reverse,
}

impl ArrayMethod {
    pub const ALL: [ArrayMethod; 7] = [
        ArrayMethod::Push,
        ArrayMethod::Pop,
        ArrayMethod::Shift,
        ArrayMethod::Unshift,
        ArrayMethod::Splice,
        ArrayMethod::Sort,
        ArrayMethod::Reverse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ArrayMethod::Push => "push",
            ArrayMethod::Pop => "pop",
            ArrayMethod::Shift => "shift",
            ArrayMethod::Unshift => "unshift",
            ArrayMethod::Splice => "splice",
            ArrayMethod::Sort => "sort",
            ArrayMethod::Reverse => "reverse",
        }
    }

    /// The arguments that become new elements.
    ///
    /// `splice` takes `[start, delete_count, items...]`.
    pub fn inserted(self, args: &[Value]) -> &[Value] {
        match self {
            ArrayMethod::Push | ArrayMethod::Unshift => args,
            ArrayMethod::Splice => args.get(2..).unwrap_or(&[]),
            ArrayMethod::Pop | ArrayMethod::Shift | ArrayMethod::Sort | ArrayMethod::Reverse => &[],
        }
    }
}

impl fmt::Display for ArrayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run `original` on the array's elements, then, if the array is
/// observed, observe the inserted elements and notify its container
/// channel. Returns `original`'s result unchanged.
pub(crate) fn intercept<R>(
    array: &Array,
    method: ArrayMethod,
    args: &[Value],
    original: impl FnOnce(&mut Vec<Value>) -> R,
) -> R {
    let result = array.with_items_mut(original);

    if let Some(observer) = array.observer() {
        let inserted = method.inserted(args);
        if !inserted.is_empty() {
            observer.observe_array(inserted);
        }
        tracing::trace!(method = method.name(), inserted = inserted.len(), "array mutated");
        observer.dep().notify();
    }
    result
}
