//! Lattice Observer
//!
//! This crate provides the observation runtime behind Lattice's component
//! state. Plain objects and arrays are instrumented once, after which any
//! computation that reads a property while it is evaluating is re-run
//! whenever that exact property changes. Application code never subscribes
//! or unsubscribes by hand.
//!
//! It implements:
//!
//! - Dependency channels and the active-subscriber stack
//! - Recursive instrumentation of objects and arrays (`observe`)
//! - Tracked accessors on individual properties (`define_reactive`)
//! - Interception of the seven mutating array operations
//! - Structural mutation (`set`/`del`) for keys added after observation
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Dependency channels, the tracking context, and a minimal
//!   `Watcher` subscriber
//! - `value`: The observable value model (`Value`, `Object`, `Array`)
//! - `observer`: Instrumentation, accessor installation, array interception
//!   and the structural mutation API
//! - `config`: Runtime flags (production mode, server rendering, warn handler)
//! - `error`: Diagnostics and property definition errors
//!
//! Everything is single-threaded. Handles are `Rc`-based and the tracking
//! state is thread-local.
//!
//! # Example
//!
//! ```rust
//! use lattice_observer::reactive::Watcher;
//! use lattice_observer::{observe, Object, Value};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let state = Object::new();
//! state.insert("count", 1).unwrap();
//! observe(&Value::from(state.clone()), false);
//!
//! let seen = Rc::new(Cell::new(0.0));
//! let watcher = {
//!     let state = state.clone();
//!     let seen = seen.clone();
//!     Watcher::new(move || seen.set(state.get("count").as_f64().unwrap_or(0.0)))
//! };
//!
//! state.set("count", 5);
//! assert_eq!(seen.get(), 5.0);
//! assert_eq!(watcher.run_count(), 2);
//! ```

pub mod config;
pub mod error;
pub mod observer;
pub mod reactive;
pub mod value;

pub use error::{Diagnostic, PropertyError, StructuralOp};
pub use observer::{
    define_reactive, del, observe, set, toggle_observing, without_observing, ArrayMethod,
    CustomSetter, Observer, ObservingGuard,
};
pub use value::{Array, Getter, Key, Object, PropertyDescriptor, Setter, Value};
