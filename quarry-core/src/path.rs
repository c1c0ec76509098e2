//! Dotted field paths.
//!
//! A field path such as `"author.address.city"` names a field nested inside
//! sub-documents or referenced documents. The classifier walks a path from
//! its shortest prefix to the full path so it can stop at the first
//! reference boundary it meets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::FusedIterator;

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '.';

/// Returns true when `path` is a well-formed dotted path: non-empty with no
/// empty segment.
pub fn is_valid_path(path: &str) -> bool {
    !path.is_empty() && path.split(PATH_SEPARATOR).all(|segment| !segment.is_empty())
}

/// Walk the prefixes of a dotted path, shortest first.
///
/// `"a.b.c"` yields `"a"`, `"a.b"`, `"a.b.c"`. Malformed input yields an
/// empty sequence. The walker borrows the input and is `Clone`, so a walk
/// can be restarted from any saved position.
pub fn walk_prefixes(path: &str) -> FieldPrefixes<'_> {
    FieldPrefixes {
        path,
        cursor: 0,
        done: !is_valid_path(path),
    }
}

/// Returns true when `path` equals `ancestor` or lies underneath it.
///
/// `"meta.owner"` is nested under `"meta"`, while `"metadata"` is not.
pub fn is_same_or_nested(path: &str, ancestor: &str) -> bool {
    match path.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => rest.starts_with(PATH_SEPARATOR),
        None => false,
    }
}

/// Lazy iterator over the prefixes of a dotted path.
#[derive(Debug, Clone)]
pub struct FieldPrefixes<'a> {
    path: &'a str,
    /// Byte offset where the search for the next separator starts.
    cursor: usize,
    done: bool,
}

impl<'a> FieldPrefixes<'a> {
    /// The full path being walked.
    pub fn path(&self) -> &'a str {
        self.path
    }

    /// The segments that follow `prefix` in the walked path, if any.
    ///
    /// `prefix` is expected to be one of the values this walker yields.
    pub fn remainder_after(&self, prefix: &str) -> Option<&'a str> {
        self.path
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(PATH_SEPARATOR))
            .filter(|rest| !rest.is_empty())
    }
}

impl<'a> Iterator for FieldPrefixes<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.path[self.cursor..].find(PATH_SEPARATOR) {
            Some(offset) => {
                let end = self.cursor + offset;
                self.cursor = end + PATH_SEPARATOR.len_utf8();
                Some(&self.path[..end])
            }
            None => {
                self.done = true;
                Some(self.path)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.done {
            0
        } else {
            self.path[self.cursor..].matches(PATH_SEPARATOR).count() + 1
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FieldPrefixes<'_> {}

impl FusedIterator for FieldPrefixes<'_> {}

/// A validated dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(String);

impl FieldPath {
    /// Parse a dotted path, returning `None` for empty or malformed input.
    pub fn parse(path: &str) -> Option<Self> {
        is_valid_path(path).then(|| Self(path.to_string()))
    }

    /// The path as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate the segments of the path.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(PATH_SEPARATOR)
    }

    /// Number of segments. Always at least one.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// The first segment, which is the top-level field name.
    pub fn head(&self) -> &str {
        self.0
            .split_once(PATH_SEPARATOR)
            .map(|(head, _)| head)
            .unwrap_or(&self.0)
    }

    /// The dotted path after the first `n` segments, `None` when nothing
    /// remains.
    pub fn tail_after(&self, n: usize) -> Option<&str> {
        if n == 0 {
            return Some(&self.0);
        }
        self.0
            .match_indices(PATH_SEPARATOR)
            .nth(n - 1)
            .map(|(index, _)| &self.0[index + 1..])
    }

    /// Walk the prefixes of this path, shortest first.
    pub fn prefixes(&self) -> FieldPrefixes<'_> {
        walk_prefixes(&self.0)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_path(&value) {
            Ok(Self(value))
        } else {
            Err(format!("invalid field path: {value:?}"))
        }
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.0
    }
}
