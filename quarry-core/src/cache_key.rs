//! Cache keys, TTL resolution and invalidation patterns.
//!
//! # Key format
//!
//! ```text
//! <model>:list#<shape>
//! <model>:count#<shape>
//! <model>:get:<id>#<shape>     lookup by id
//! <model>:get#<shape>          lookup by query
//! ```
//!
//! `<shape>` is the first 16 hex characters of the SHA-256 of the canonical
//! JSON encoding of the query shape. Canonical encoding sorts object keys
//! recursively, so two requests that differ only in key insertion order share
//! a cache entry.
//!
//! The `#` terminator keeps id scopes apart: the pattern `Item:get:42#*`
//! cannot match entries of `Item:get:420`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

use crate::document::DocumentId;
use crate::query::{Query, QueryPlan};

/// Separates model, operation and id in a prefix.
pub const KEY_SEPARATOR: char = ':';

/// Separates a prefix from the shape hash.
pub const SHAPE_SEPARATOR: char = '#';

/// Trailing wildcard of an invalidation pattern.
pub const WILDCARD: char = '*';

const SHAPE_HASH_LEN: usize = 16;

/// Cached read operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOperation {
    List,
    Get,
    Count,
}

impl CacheOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Get => "get",
            Self::Count => "count",
        }
    }
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How results are materialised by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadMode {
    /// Plain detached snapshots. Safe to cache.
    Lean,
    /// Live-bound entities. Never cached.
    Hydrated,
}

impl ReadMode {
    pub fn from_lean(lean: bool) -> Self {
        if lean {
            Self::Lean
        } else {
            Self::Hydrated
        }
    }

    pub fn is_lean(&self) -> bool {
        matches!(self, Self::Lean)
    }
}

/// Where and for how long one read may be cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDescriptor {
    pub prefix: String,
    /// Zero disables caching for this read.
    pub ttl: Duration,
}

impl CacheDescriptor {
    /// Resolve the TTL of a read.
    ///
    /// The caller's value overrides the policy default, neither present means
    /// zero, and hydrated reads are never cached.
    pub fn resolve(
        prefix: impl Into<String>,
        requested: Option<Duration>,
        policy_default: Option<Duration>,
        mode: ReadMode,
    ) -> Self {
        let ttl = match mode {
            ReadMode::Lean => requested.or(policy_default).unwrap_or(Duration::ZERO),
            ReadMode::Hydrated => Duration::ZERO,
        };
        Self {
            prefix: prefix.into(),
            ttl,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Full key for a query shape under this prefix.
    pub fn key(&self, shape: &Value) -> String {
        format!("{}{}{}", self.prefix, SHAPE_SEPARATOR, shape_hash(shape))
    }
}

/// Builds prefixes and invalidation patterns for one model.
#[derive(Debug, Clone, Copy)]
pub struct CacheKeyBuilder<'a> {
    model: &'a str,
}

impl<'a> CacheKeyBuilder<'a> {
    pub fn new(model: &'a str) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &'a str {
        self.model
    }

    /// `<model>:<operation>`, plus `:<id>` for id-scoped gets.
    ///
    /// The id is ignored for `list` and `count`.
    pub fn prefix(&self, operation: CacheOperation, id: Option<&DocumentId>) -> String {
        match (operation, id) {
            (CacheOperation::Get, Some(id)) => format!(
                "{}{sep}{}{sep}{}",
                self.model,
                operation,
                id,
                sep = KEY_SEPARATOR
            ),
            _ => format!("{}{}{}", self.model, KEY_SEPARATOR, operation),
        }
    }

    /// Full cache key for `shape` under the given operation.
    pub fn key(&self, operation: CacheOperation, id: Option<&DocumentId>, shape: &Value) -> String {
        format!(
            "{}{}{}",
            self.prefix(operation, id),
            SHAPE_SEPARATOR,
            shape_hash(shape)
        )
    }

    /// Patterns to clear after a write.
    ///
    /// With an id: counts, lists, the id's get entries and query-based get
    /// entries. Without one every get entry of the model is cleared.
    pub fn invalidation_patterns(&self, id: Option<&DocumentId>) -> Vec<String> {
        let count = self.prefix(CacheOperation::Count, None);
        let list = self.prefix(CacheOperation::List, None);
        let get = self.prefix(CacheOperation::Get, None);
        match id {
            Some(id) => vec![
                format!("{count}{WILDCARD}"),
                format!("{list}{WILDCARD}"),
                format!(
                    "{}{}{}",
                    self.prefix(CacheOperation::Get, Some(id)),
                    SHAPE_SEPARATOR,
                    WILDCARD
                ),
                format!("{get}{SHAPE_SEPARATOR}{WILDCARD}"),
            ],
            None => vec![
                format!("{count}{WILDCARD}"),
                format!("{list}{WILDCARD}"),
                format!("{get}{WILDCARD}"),
            ],
        }
    }
}

/// Whether `key` is matched by `pattern`.
///
/// A trailing `*` matches any suffix; otherwise the match is exact.
pub fn matches_pattern(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix(WILDCARD) {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

/// Cache shape of a `list` or `get` read.
pub fn plan_shape(plan: &QueryPlan) -> Value {
    let mut exclude: Vec<&str> = plan.projection.exclude.iter().map(String::as_str).collect();
    exclude.sort_unstable();
    json!({
        "filter": plan.query,
        "select": plan.projection.include.sorted(),
        "exclude": exclude,
        "text_score": plan.projection.text_score,
        "populate": plan.populate,
        "sort": plan.sort,
        "limit": plan.limit,
        "skip": plan.skip,
        "lean": plan.lean,
    })
}

/// Cache shape of a count.
pub fn count_shape(query: &Query) -> Value {
    json!({ "filter": query })
}

/// Truncated SHA-256 of the canonical encoding of `shape`.
pub fn shape_hash(shape: &Value) -> String {
    let digest = Sha256::digest(canonical_json(shape).as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(SHAPE_HASH_LEN);
    hash
}

/// JSON encoding with object keys sorted recursively.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================
