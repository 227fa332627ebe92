#![forbid(unsafe_code)]

//! Path parsing and resolution against root state.
//!
//! A path is an ordered list of [`PathSegment`]s. String paths use the familiar
//! dotted/bracketed notation:
//!
//! ```
//! use memsel_store::path::{parse, PathSegment};
//!
//! let segments = parse("todos[1].title").unwrap();
//! assert_eq!(
//!     segments,
//!     vec![
//!         PathSegment::key("todos"),
//!         PathSegment::Index(1),
//!         PathSegment::key("title"),
//!     ]
//! );
//! ```
//!
//! Resolution never fails: a step that does not exist yields `Value::Null`.

use std::fmt;

use serde_json::Value;

use crate::error::{Result, SelectError};

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object member (or array index when the key is a decimal number).
    Key(String),
    /// Array element.
    Index(usize),
}

impl PathSegment {
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Parse a dotted/bracketed path string into segments.
///
/// Accepted forms: `a.b.c`, `a[0].b`, `a["weird.key"]`, `a['x']`.
pub fn parse(path: &str) -> Result<Vec<PathSegment>> {
    if path.is_empty() {
        return Err(SelectError::malformed(path, "empty path"));
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    // True right after a closing bracket, where a key may not follow directly.
    let mut after_bracket = false;
    let mut chars = path.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                if current.is_empty() && !after_bracket {
                    return Err(SelectError::malformed(path, "empty segment"));
                }
                if !current.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current)));
                }
                if chars.peek().is_none() {
                    return Err(SelectError::malformed(path, "trailing '.'"));
                }
                after_bracket = false;
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current)));
                }
                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(SelectError::malformed(path, "unterminated '['"));
                }
                segments.push(bracket_segment(path, &inner)?);
                after_bracket = true;
            }
            ']' => return Err(SelectError::malformed(path, "unexpected ']'")),
            other => {
                if after_bracket {
                    return Err(SelectError::malformed(
                        path,
                        "expected '.' or '[' after ']'",
                    ));
                }
                current.push(other);
            }
        }
    }

    if !current.is_empty() {
        segments.push(PathSegment::Key(current));
    }
    Ok(segments)
}

fn bracket_segment(path: &str, inner: &str) -> Result<PathSegment> {
    let trimmed = inner.trim();
    for quote in ['"', '\''] {
        if let Some(rest) = trimmed.strip_prefix(quote) {
            return match rest.strip_suffix(quote) {
                Some(key) => Ok(PathSegment::Key(key.to_owned())),
                None => Err(SelectError::malformed(path, "unbalanced quote")),
            };
        }
    }
    trimmed
        .parse::<usize>()
        .map(PathSegment::Index)
        .map_err(|_| SelectError::malformed(path, format!("bad index {trimmed:?}")))
}

/// Walk `root` along `segments`, returning `Value::Null` for any missing step.
/// An empty path selects nothing and also yields `Value::Null`.
#[must_use]
pub fn resolve(root: &Value, segments: &[PathSegment]) -> Value {
    if segments.is_empty() {
        return Value::Null;
    }
    let mut node = root;
    for segment in segments {
        let next = match (segment, node) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key),
            (PathSegment::Key(key), Value::Array(items)) => {
                key.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
            (PathSegment::Index(index), Value::Object(map)) => map.get(&index.to_string()),
            _ => None,
        };
        match next {
            Some(value) => node = value,
            None => return Value::Null,
        }
    }
    node.clone()
}
