#![forbid(unsafe_code)]

//! The versioned store contract and its reference implementation.
//!
//! # Design
//!
//! [`VersionedStore`] is the capability set consumed by bound accessors:
//! a version counter, selector evaluation, property observation, and a
//! deferred task queue. [`Store`] implements it over a `serde_json::Value`
//! state tree held in shared, reference-counted storage.
//!
//! # Invariants
//!
//! 1. The version starts at 1 and increments by exactly 1 per commit.
//! 2. Deferred tasks run in FIFO order at the next [`Store::flush`] or commit;
//!    tasks enqueued while flushing run in the same flush.
//! 3. After a commit, every live observation is checked in registration
//!    order; the callback fires only when the observed value differs from the
//!    value seen at the previous check.
//! 4. Observations hold their owner weakly and are pruned once it is dropped.
//!
//! # Failure Modes
//!
//! - **Callback fails**: The remaining observers are still notified. The
//!   commit returns a [`DispatchError`] listing every failure of the round.
//! - **Selector commits**: Calling [`Store::update`] from inside a function
//!   selector panics on the re-entrant state borrow.
//! - **Read inside update**: Reading a bound property from inside an
//!   [`Store::update`] closure panics too. The accessor's `select` borrows the
//!   state while the closure still holds it mutably. Read before or after the
//!   update instead.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::error::{DispatchError, NotificationFailure, Result};
use crate::selector::Selector;

/// Boxed error returned across the store/owner boundary.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Observer callback. Receives `[new, old]`.
pub type ObserverFn = Rc<dyn Fn(&[Value]) -> std::result::Result<(), BoxError>>;

/// Deferred task, handed the store that runs it.
pub type Task = Box<dyn FnOnce(&dyn VersionedStore)>;

/// Something whose named properties the store can read back.
pub trait Observed {
    /// Read the current value of `key`.
    fn read(&self, key: &str) -> std::result::Result<Value, BoxError>;
}

/// Capabilities a bound accessor needs from its store.
pub trait VersionedStore {
    /// Current version counter; changes on every committed mutation.
    fn version(&self) -> u64;

    /// Evaluate `selector` against current root state.
    fn select(&self, selector: &Selector) -> Result<Value>;

    /// Watch `owner[key]` and call `callback` when it changes.
    fn observe(&self, owner: Weak<dyn Observed>, key: &str, callback: ObserverFn);

    /// Schedule `task` to run after the current synchronous step.
    fn enqueue(&self, task: Task);

    /// Run the deferred tasks now.
    fn flush(&self);
}

struct Observation {
    id: u64,
    owner: Weak<dyn Observed>,
    key: String,
    callback: ObserverFn,
    last: Value,
}

struct StoreInner {
    state: RefCell<Value>,
    version: Cell<u64>,
    queue: RefCell<VecDeque<Task>>,
    observers: RefCell<Vec<Observation>>,
    next_observer_id: Cell<u64>,
}

/// Reference [`VersionedStore`] over a JSON state tree.
///
/// Cloning a `Store` creates a new handle to the **same** state.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("version", &self.inner.version.get())
            .field("state", &self.inner.state.borrow())
            .field("pending_tasks", &self.pending_tasks())
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Value::Object(serde_json::Map::new()))
    }
}

impl Store {
    /// Create a store at version 1 holding `initial`.
    #[must_use]
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(initial),
                version: Cell::new(1),
                queue: RefCell::new(VecDeque::new()),
                observers: RefCell::new(Vec::new()),
                next_observer_id: Cell::new(0),
            }),
        }
    }

    /// Snapshot of the current root state.
    #[must_use]
    pub fn state(&self) -> Value {
        self.inner.state.borrow().clone()
    }

    /// Access the root state by reference.
    pub fn with_state<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    /// Commit a mutation of the root state.
    ///
    /// Bumps the version, flushes deferred tasks, then notifies observers.
    /// Returns the new version.
    ///
    /// `mutate` must not read bound properties or run selectors against this
    /// store; the state is mutably borrowed while it runs.
    pub fn update(
        &self,
        mutate: impl FnOnce(&mut Value),
    ) -> std::result::Result<u64, DispatchError> {
        {
            let mut state = self.inner.state.borrow_mut();
            mutate(&mut state);
        }
        self.commit()
    }

    /// Commit a wholesale replacement of the root state.
    pub fn replace(&self, state: Value) -> std::result::Result<u64, DispatchError> {
        self.update(move |current| *current = state)
    }

    /// Run every deferred task now, including ones enqueued while flushing.
    pub fn flush(&self) {
        loop {
            let task = self.inner.queue.borrow_mut().pop_front();
            match task {
                Some(task) => task(self),
                None => break,
            }
        }
    }

    /// Number of deferred tasks waiting for a flush.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Number of registered observations (live or not yet pruned).
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    fn commit(&self) -> std::result::Result<u64, DispatchError> {
        let old = self.inner.version.get();
        let version = old + 1;
        self.inner.version.set(version);
        tracing::trace!(message = "store.commit", old_version = old, version);

        self.flush();
        self.notify(version)?;
        Ok(version)
    }

    fn notify(&self, version: u64) -> std::result::Result<(), DispatchError> {
        // Snapshot so callbacks may register observers or commit again.
        let snapshot: Vec<(u64, Weak<dyn Observed>, String, ObserverFn)> = self
            .inner
            .observers
            .borrow()
            .iter()
            .map(|o| (o.id, o.owner.clone(), o.key.clone(), Rc::clone(&o.callback)))
            .collect();

        let mut failures = Vec::new();
        let mut saw_dead = false;

        for (id, owner, key, callback) in snapshot {
            let Some(owner) = owner.upgrade() else {
                saw_dead = true;
                continue;
            };
            let current = match owner.read(&key) {
                Ok(value) => value,
                Err(err) => {
                    failures.push(self.failure(&key, version, err.as_ref()));
                    continue;
                }
            };
            let previous = {
                let mut observers = self.inner.observers.borrow_mut();
                match observers.iter_mut().find(|o| o.id == id) {
                    Some(entry) if entry.last != current => {
                        Some(std::mem::replace(&mut entry.last, current.clone()))
                    }
                    _ => None,
                }
            };
            if let Some(previous) = previous {
                if let Err(err) = callback(&[current, previous]) {
                    failures.push(self.failure(&key, version, err.as_ref()));
                }
            }
        }

        if saw_dead {
            self.inner
                .observers
                .borrow_mut()
                .retain(|o| o.owner.strong_count() > 0);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError { version, failures })
        }
    }

    fn failure(
        &self,
        key: &str,
        version: u64,
        err: &dyn std::error::Error,
    ) -> NotificationFailure {
        tracing::debug!(message = "store.notify.failed", key, version, error = %err);
        NotificationFailure {
            key: key.to_owned(),
            version,
            message: err.to_string(),
        }
    }
}

impl VersionedStore for Store {
    fn version(&self) -> u64 {
        self.inner.version.get()
    }

    fn select(&self, selector: &Selector) -> Result<Value> {
        selector.evaluate(&self.inner.state.borrow())
    }

    fn observe(&self, owner: Weak<dyn Observed>, key: &str, callback: ObserverFn) {
        let last = owner
            .upgrade()
            .and_then(|o| o.read(key).ok())
            .unwrap_or(Value::Null);
        let id = self.inner.next_observer_id.get();
        self.inner.next_observer_id.set(id + 1);
        tracing::trace!(message = "store.observe", key, id);
        self.inner.observers.borrow_mut().push(Observation {
            id,
            owner,
            key: key.to_owned(),
            callback,
            last,
        });
    }

    fn enqueue(&self, task: Task) {
        self.inner.queue.borrow_mut().push_back(task);
    }

    fn flush(&self) {
        Store::flush(self);
    }
}
