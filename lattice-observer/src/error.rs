//! Diagnostics and Errors
//!
//! The observer never fails an ordinary read or write. Misuse of the
//! structural mutation API is reported as a [`Diagnostic`], an informational
//! side effect that leaves the return value contract untouched. Raw property
//! definition on [`Object`](crate::Object) is the only place that returns a
//! `Result`, with a [`PropertyError`].

use std::fmt;

use thiserror::Error;

use crate::config;

/// Which structural mutation produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralOp {
    Set,
    Delete,
}

impl fmt::Display for StructuralOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralOp::Set => f.write_str("set"),
            StructuralOp::Delete => f.write_str("delete"),
        }
    }
}

/// Non-fatal problems reported by `set`/`del`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    /// The target was `undefined`, `null` or a primitive.
    #[error("cannot {op} reactive property on undefined, null, or primitive value: {target}")]
    InvalidTarget { op: StructuralOp, target: String },

    /// The target is root state or a framework instance. Nothing was changed.
    #[error("{}", root_rejection_message(.op, .key))]
    RootMutationRejected { op: StructuralOp, key: String },

    /// Arrays only carry indices and `length`.
    #[error("cannot {op} named key `{key}` on an array")]
    UnsupportedArrayKey { op: StructuralOp, key: String },

    /// `length` must be a non-negative integer.
    #[error("invalid array length: {value}")]
    InvalidArrayLength { value: String },

    /// The index is past the largest one an array can hold.
    #[error("cannot {op} array index {index}: out of range")]
    InvalidArrayIndex { op: StructuralOp, index: usize },
}

fn root_rejection_message(op: &StructuralOp, key: &str) -> String {
    match op {
        StructuralOp::Set => format!(
            "avoid adding reactive property `{key}` to a framework instance or its root state \
             at runtime; declare it upfront instead"
        ),
        StructuralOp::Delete => format!(
            "avoid deleting property `{key}` on a framework instance or its root state; \
             set it to null instead"
        ),
    }
}

/// Errors from raw property definition on an object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("cannot add property `{0}`: object is not extensible")]
    NotExtensible(String),

    #[error("cannot redefine non-configurable property `{0}`")]
    NonConfigurable(String),

    #[error("cannot assign to read-only property `{0}`")]
    ReadOnly(String),
}

/// Report a diagnostic.
///
/// Silent in production. Otherwise routed to the configured warn handler,
/// falling back to `tracing::warn!`.
pub(crate) fn emit(diagnostic: Diagnostic) {
    let handler = config::with(|config| {
        if config.production {
            None
        } else {
            Some(config.warn_handler.clone())
        }
    });

    match handler {
        None => {}
        Some(Some(handler)) => handler(&diagnostic),
        Some(None) => tracing::warn!(%diagnostic, "lattice-observer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{override_with, Config};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn root_rejection_messages_name_the_key() {
        let set = Diagnostic::RootMutationRejected {
            op: StructuralOp::Set,
            key: "count".into(),
        };
        assert!(set.to_string().contains("adding reactive property `count`"));

        let delete = Diagnostic::RootMutationRejected {
            op: StructuralOp::Delete,
            key: "count".into(),
        };
        assert!(delete.to_string().contains("set it to null"));
    }

    #[test]
    fn emit_routes_to_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _guard = override_with(
            Config::default().with_warn_handler(move |d| sink.borrow_mut().push(d.clone())),
        );

        emit(Diagnostic::InvalidArrayLength { value: "-1".into() });

        assert_eq!(
            *seen.borrow(),
            vec![Diagnostic::InvalidArrayLength { value: "-1".into() }]
        );
    }

    #[test]
    fn emit_is_silent_in_production() {
        let seen = Rc::new(RefCell::new(0));
        let sink = seen.clone();
        let _guard = override_with(Config {
            production: true,
            ..Config::default().with_warn_handler(move |_| *sink.borrow_mut() += 1)
        });

        emit(Diagnostic::InvalidArrayLength { value: "x".into() });

        assert_eq!(*seen.borrow(), 0);
    }
}
