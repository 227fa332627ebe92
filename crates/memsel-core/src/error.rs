use memsel_store::SelectError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PropertyError>;

/// Failure reading, writing, or redefining an owner property.
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("no property {key:?}")]
    Missing { key: String },

    #[error("property {key:?} is read-only")]
    ReadOnly { key: String },

    #[error("property {key:?} is not configurable")]
    NotConfigurable { key: String },

    #[error("selecting {key:?} failed: {source}")]
    Select {
        key: String,
        #[source]
        source: SelectError,
    },

    #[error("decoding {key:?} failed: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure reported by a change handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure invoking a named handler on an owner.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("no handler named {name:?} on owner")]
    Missing { name: String },

    #[error("handler {name:?} failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: HandlerError,
    },
}
