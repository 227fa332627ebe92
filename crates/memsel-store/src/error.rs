use thiserror::Error;

pub type Result<T> = std::result::Result<T, SelectError>;

/// Failure while evaluating a [`Selector`](crate::Selector) against root state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("malformed path {path:?}: {reason}")]
    MalformedPath { path: String, reason: String },

    #[error("selector failed: {0}")]
    Selector(String),
}

impl SelectError {
    #[must_use]
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn selector(message: impl Into<String>) -> Self {
        Self::Selector(message.into())
    }
}

/// One observer callback that failed during a notification round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFailure {
    /// Observed property key.
    pub key: String,
    /// Store version the notification was delivered for.
    pub version: u64,
    /// Rendered error from the callback.
    pub message: String,
}

/// Error boundary of a store commit: every observer is notified, and the
/// failures of that round are collected here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} observer notification(s) failed at version {version}", .failures.len())]
pub struct DispatchError {
    pub version: u64,
    pub failures: Vec<NotificationFailure>,
}
