#![forbid(unsafe_code)]

//! Version-gated memoized accessors over a versioned store.
//!
//! - [`Select`]: a reusable declaration binding an owner property to a store
//!   selector, optionally subscribing a named change handler.
//! - [`Owner`]: the object whose plain property is replaced by a read-only,
//!   store-derived accessor.
//! - [`Accessor`] / [`MemoCell`]: the memoized getter, recomputing only when
//!   the store version changes.
//!
//! # Invariants
//!
//! 1. `select` runs at most once per store version per bound property.
//! 2. Each bound property owns its own [`MemoCell`].
//! 3. Observer registration runs only after the accessor is installed.
//! 4. A non-configurable property is never replaced, and binding it is not
//!    an error.

pub mod error;
pub mod memo;
pub mod owner;
pub mod select;

pub use error::{HandlerError, InvokeError, PropertyError};
pub use memo::{Accessor, MemoCell};
pub use owner::{HandlerFn, Owner, PropertyDescriptor};
pub use select::{Binding, Installation, Schema, Select, SelectConfig, Subscribe, bind_all};
