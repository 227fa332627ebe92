#![forbid(unsafe_code)]

//! Path-or-function selectors.
//!
//! A [`Selector`] describes how to derive a value from root state: either a
//! path resolved against the state tree, or a function that receives the root
//! state and returns the derived value directly.
//!
//! String paths are stored raw and only parsed when first evaluated, so a
//! malformed path is reported on read rather than at construction.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::Result;
use crate::path::{self, PathSegment};

/// Signature of a function selector.
pub type SelectorFn = dyn Fn(&Value) -> Result<Value>;

/// The path half of a [`Selector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSpec {
    /// Unparsed dotted/bracketed string.
    Raw(String),
    /// Pre-split segments.
    Segments(Vec<PathSegment>),
}

impl PathSpec {
    /// Parse (if raw) and return the segments.
    pub fn segments(&self) -> Result<Vec<PathSegment>> {
        match self {
            Self::Raw(text) => path::parse(text),
            Self::Segments(segments) => Ok(segments.clone()),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Self::Raw(text) if text.is_empty())
    }
}

/// A path or a function evaluated against root state.
///
/// Cloning a function selector shares the same function.
#[derive(Clone)]
pub enum Selector {
    Path(PathSpec),
    Func(Rc<SelectorFn>),
}

impl Selector {
    /// A single-key path. The key is used verbatim and never parsed.
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self::Path(PathSpec::Segments(vec![PathSegment::Key(key.into())]))
    }

    /// A dotted/bracketed string path, parsed on first evaluation.
    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(PathSpec::Raw(path.into()))
    }

    /// An ordered sequence of keys and indices.
    #[must_use]
    pub fn segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathSegment>,
    {
        Self::Path(PathSpec::Segments(
            segments.into_iter().map(Into::into).collect(),
        ))
    }

    /// A fallible function of root state.
    #[must_use]
    pub fn func(f: impl Fn(&Value) -> Result<Value> + 'static) -> Self {
        Self::Func(Rc::new(f))
    }

    /// An infallible function of root state.
    #[must_use]
    pub fn map(f: impl Fn(&Value) -> Value + 'static) -> Self {
        Self::Func(Rc::new(move |state| Ok(f(state))))
    }

    /// Whether this selector is an empty string path. An empty segment list
    /// is not empty: it resolves to `Null`. Function selectors are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Path(spec) => spec.is_empty(),
            Self::Func(_) => false,
        }
    }

    /// Evaluate against `root`.
    pub fn evaluate(&self, root: &Value) -> Result<Value> {
        match self {
            Self::Path(spec) => Ok(path::resolve(root, &spec.segments()?)),
            Self::Func(f) => f(root),
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(spec) => f.debug_tuple("Path").field(spec).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl From<&str> for Selector {
    fn from(path: &str) -> Self {
        Self::path(path)
    }
}

impl From<String> for Selector {
    fn from(path: String) -> Self {
        Self::path(path)
    }
}

impl From<Vec<PathSegment>> for Selector {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self::Path(PathSpec::Segments(segments))
    }
}
