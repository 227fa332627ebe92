#![forbid(unsafe_code)]

//! Version-gated memoization of a selected value.
//!
//! # Design
//!
//! [`Accessor`] pairs a store handle and a normalized [`Selector`] with a
//! [`MemoCell`] holding the last selected value and the store version it was
//! computed at. [`Accessor::get`] compares the store's current version with
//! the cell and only calls `select` when they differ.
//!
//! Each bound property gets its own cell, so two owners bound from the same
//! declaration never share cached state.
//!
//! # Invariants
//!
//! 1. The cached value is returned without recomputation iff the cell's
//!    version equals the store's current version.
//! 2. `select` runs at most once per distinct store version.
//! 3. A failed `select` never overwrites the last good value or its version.
//!
//! # Failure Modes
//!
//! - **Selector fails**: The error is returned to the reader and the version
//!   is remembered as failed. Further reads at that same version return the
//!   last good value (or `Null` if there never was one) without calling
//!   `select` again. The next version change retries.
//! - **Nested read**: A function selector may read other bound properties;
//!   the cell is not borrowed while `select` runs.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use memsel_store::{SelectError, Selector, VersionedStore};
use serde_json::Value;

/// Cached state of one bound property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoCell {
    /// Last successfully selected value (None before first success).
    last_value: Option<Value>,
    /// Store version `last_value` was selected at (None before first success).
    last_version: Option<u64>,
    /// Version at which the most recent `select` failed, if it has not been
    /// superseded by a success.
    failed_version: Option<u64>,
    /// Successful `select` calls.
    computations: u64,
}

impl MemoCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The value to serve at `version` without recomputing, if any.
    #[must_use]
    pub fn cached_at(&self, version: u64) -> Option<Value> {
        if self.last_version == Some(version) || self.failed_version == Some(version) {
            Some(self.last_value.clone().unwrap_or(Value::Null))
        } else {
            None
        }
    }

    /// Record a successful selection.
    pub fn record(&mut self, version: u64, value: Value) {
        self.last_value = Some(value);
        self.last_version = Some(version);
        self.failed_version = None;
        self.computations += 1;
    }

    /// Record a failed selection. The last good value is kept.
    pub fn record_failure(&mut self, version: u64) {
        self.failed_version = Some(version);
    }

    #[must_use]
    pub fn last_value(&self) -> Option<&Value> {
        self.last_value.as_ref()
    }

    #[must_use]
    pub fn last_version(&self) -> Option<u64> {
        self.last_version
    }

    #[must_use]
    pub fn failed_version(&self) -> Option<u64> {
        self.failed_version
    }

    #[must_use]
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

/// The installed getter of a store-derived property.
pub struct Accessor {
    store: Rc<dyn VersionedStore>,
    selector: Selector,
    cell: RefCell<MemoCell>,
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("selector", &self.selector)
            .field("cell", &self.cell.borrow())
            .finish()
    }
}

impl Accessor {
    #[must_use]
    pub fn new(store: Rc<dyn VersionedStore>, selector: Selector) -> Self {
        Self {
            store,
            selector,
            cell: RefCell::new(MemoCell::new()),
        }
    }

    /// Read the derived value, recomputing only if the store version moved.
    pub fn get(&self) -> Result<Value, SelectError> {
        let version = self.store.version();
        if let Some(value) = self.cell.borrow().cached_at(version) {
            return Ok(value);
        }

        match self.store.select(&self.selector) {
            Ok(value) => {
                tracing::trace!(message = "select.recompute", version);
                self.cell.borrow_mut().record(version, value.clone());
                Ok(value)
            }
            Err(err) => {
                tracing::trace!(message = "select.failed", version, error = %err);
                self.cell.borrow_mut().record_failure(version);
                Err(err)
            }
        }
    }

    /// Marker for tooling: every accessor built here derives from a store.
    #[must_use]
    pub fn is_store_derived(&self) -> bool {
        true
    }

    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Snapshot of the memo state.
    #[must_use]
    pub fn cell(&self) -> MemoCell {
        self.cell.borrow().clone()
    }

    /// Number of successful `select` calls so far.
    #[must_use]
    pub fn computations(&self) -> u64 {
        self.cell.borrow().computations()
    }
}
