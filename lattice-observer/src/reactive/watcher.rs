//! Watcher Implementation
//!
//! A Watcher is the smallest useful subscriber: a side-effecting computation
//! that re-runs whenever a channel it read during its last run notifies.
//!
//! # How Watchers Work
//!
//! 1. When created, the watcher runs its function immediately to establish
//!    initial dependencies (unless created with [`Watcher::new_lazy`]).
//!
//! 2. Every run happens inside a [`ReactiveContext`], so each tracked read
//!    registers the watcher with the channel that was read.
//!
//! 3. Channels are recorded in two generations. After a run, the watcher
//!    unregisters from every channel it read last time but not this time.
//!
//! 4. When a dependency notifies, the watcher re-runs synchronously. There is
//!    no scheduler here; batching and deduplication belong to the host.
//!
//! A watcher that notifies one of its own dependencies while running is not
//! re-entered. The update is remembered and the watcher runs again once the
//! current pass finishes, up to [`MAX_PASSES`] passes per execution.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::dep::{Dep, DepId};
use super::subscriber::{Subscriber, SubscriberId};

/// Passes one [`Watcher::execute`] may make before a watcher that keeps
/// invalidating itself is stopped.
pub const MAX_PASSES: usize = 100;

/// A computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust
/// use lattice_observer::reactive::Watcher;
/// use lattice_observer::{observe, Object, Value};
///
/// let state = Object::new();
/// state.insert("count", 0).unwrap();
/// observe(&Value::from(state.clone()), false);
///
/// let watcher = {
///     let state = state.clone();
///     Watcher::new(move || println!("count is {}", state.get("count")))
/// };
///
/// state.set("count", 5); // prints "count is 5"
/// assert_eq!(watcher.run_count(), 2);
/// ```
pub struct Watcher {
    id: SubscriberId,

    /// Handle to ourselves, pushed onto the context stack while running.
    this: Weak<Watcher>,

    /// The watched function.
    run: Box<dyn Fn()>,

    /// Channels read during the last completed run.
    deps: RefCell<IndexMap<DepId, Rc<Dep>>>,

    /// Channels read so far during the current run.
    new_deps: RefCell<IndexMap<DepId, Rc<Dep>>>,

    running: Cell<bool>,

    /// Set when a dependency notified during the current pass.
    dirty: Cell<bool>,

    disposed: Cell<bool>,
    run_count: Cell<usize>,
}

impl Watcher {
    /// Create a new watcher and run it once.
    pub fn new<F>(run: F) -> Rc<Self>
    where
        F: Fn() + 'static,
    {
        let watcher = Self::new_lazy(run);
        watcher.execute();
        watcher
    }

    /// Create a new watcher without running it.
    pub fn new_lazy<F>(run: F) -> Rc<Self>
    where
        F: Fn() + 'static,
    {
        Rc::new_cyclic(|this| Self {
            id: SubscriberId::new(),
            this: this.clone(),
            run: Box::new(run),
            deps: RefCell::new(IndexMap::new()),
            new_deps: RefCell::new(IndexMap::new()),
            running: Cell::new(false),
            dirty: Cell::new(false),
            disposed: Cell::new(false),
            run_count: Cell::new(0),
        })
    }

    /// Get the watcher's subscriber ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Run the watched function, collecting dependencies.
    ///
    /// If the run notifies one of the watcher's own dependencies, the
    /// function runs again until it settles or [`MAX_PASSES`] is reached.
    pub fn execute(&self) {
        for _ in 0..MAX_PASSES {
            if !self.run_pass() || !self.dirty.get() {
                return;
            }
        }
        self.dirty.set(false);
        tracing::warn!(
            watcher = self.id.raw(),
            passes = MAX_PASSES,
            "watcher keeps invalidating itself, giving up"
        );
    }

    /// One run of the watched function. Returns false if nothing ran.
    fn run_pass(&self) -> bool {
        if self.disposed.get() {
            return false;
        }
        let Some(this) = self.this.upgrade() else {
            return false;
        };

        self.discard_partial_run();
        self.dirty.set(false);
        {
            let _running = RunningFlag::set(&self.running);
            let _ctx = ReactiveContext::enter(this);
            (self.run)();
        }

        self.cleanup_deps();
        self.run_count.set(self.run_count.get() + 1);
        true
    }

    /// Drop channels left over from a run that unwound before finishing.
    fn discard_partial_run(&self) {
        let partial = std::mem::take(&mut *self.new_deps.borrow_mut());
        let deps = self.deps.borrow();
        for (id, dep) in partial {
            if !deps.contains_key(&id) {
                dep.remove_sub(self.id);
            }
        }
    }

    /// Swap dependency generations and leave channels no longer read.
    fn cleanup_deps(&self) {
        let current = std::mem::take(&mut *self.new_deps.borrow_mut());
        let previous = std::mem::replace(&mut *self.deps.borrow_mut(), current);

        let deps = self.deps.borrow();
        for (id, dep) in previous {
            if !deps.contains_key(&id) {
                dep.remove_sub(self.id);
            }
        }
    }

    /// Stop the watcher and unregister it from every channel.
    pub fn dispose(&self) {
        self.disposed.set(true);
        self.new_deps.borrow_mut().clear();
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps.values() {
            dep.remove_sub(self.id);
        }
    }

    /// Check if the watcher has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Get the number of completed runs.
    pub fn run_count(&self) -> usize {
        self.run_count.get()
    }

    /// Get the number of channels read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.deps.borrow().len()
    }

    /// Check whether the last run read `dep`.
    pub fn depends_on(&self, dep: &Dep) -> bool {
        self.deps.borrow().contains_key(&dep.id())
    }
}

impl Subscriber for Watcher {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn add_dep(&self, dep: &Rc<Dep>) -> bool {
        let mut new_deps = self.new_deps.borrow_mut();
        if new_deps.contains_key(&dep.id()) {
            return false;
        }
        new_deps.insert(dep.id(), Rc::clone(dep));
        true
    }

    fn update(&self) {
        if self.running.get() {
            tracing::debug!(watcher = self.id.raw(), "deferring re-entrant update");
            self.dirty.set(true);
            return;
        }
        self.execute();
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Clears the running flag on every exit path.
struct RunningFlag<'a>(&'a Cell<bool>);

impl<'a> RunningFlag<'a> {
    fn set(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
