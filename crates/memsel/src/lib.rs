#![forbid(unsafe_code)]

//! memsel public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use memsel_core as core;
pub use memsel_store as store;

pub mod prelude {
    pub use memsel_core::{
        Binding, HandlerError, Installation, Owner, PropertyError, Schema, Select, SelectConfig,
        Subscribe, bind_all,
    };
    pub use memsel_store::{PathSegment, SelectError, Selector, Store, VersionedStore};
}

/// Install a global `tracing` formatter filtered by `RUST_LOG`
/// (default `memsel_core=info,memsel_store=info`).
///
/// Returns `false` if a global subscriber was already set.
#[cfg(feature = "logging")]
pub fn init_logging() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("memsel_core=info,memsel_store=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
