#![forbid(unsafe_code)]

//! Versioned store: selectors, path resolution, and the store contract that
//! memoized accessors are bound against.

pub mod error;
pub mod path;
pub mod selector;
pub mod store;

pub use error::{DispatchError, NotificationFailure, SelectError};
pub use path::PathSegment;
pub use selector::{PathSpec, Selector};
pub use store::{BoxError, Observed, ObserverFn, Store, Task, VersionedStore};
