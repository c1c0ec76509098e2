//! Query filters, sort specifications and the plan handed to storage.
//!
//! The plan bundles what a fluent query chain would otherwise set piecemeal
//! (select, limit, sort, populate, lean) into one value, so storage
//! collaborators receive a complete description of a read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::classify::{PopulateTree, Selection};
use crate::document::DocumentId;

/// Filter operator that marks a full-text search.
pub const TEXT_SEARCH_OPERATOR: &str = "$text";

/// Projected field carrying the text relevance score.
pub const TEXT_SCORE_FIELD: &str = "score";

/// A filter document: field conditions plus optional operators such as
/// `$text`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Map<String, Value>);

impl Query {
    /// The empty filter, matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality condition on a (possibly dotted) field.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Add a full-text search predicate.
    pub fn text(mut self, search: impl Into<String>) -> Self {
        let mut predicate = Map::new();
        predicate.insert("$search".to_string(), Value::String(search.into()));
        self.0
            .insert(TEXT_SEARCH_OPERATOR.to_string(), Value::Object(predicate));
        self
    }

    /// Whether the filter carries a full-text search predicate.
    pub fn is_text_search(&self) -> bool {
        self.0.contains_key(TEXT_SEARCH_OPERATOR)
    }

    /// The text searched for, when this is a text-search query.
    pub fn text_search(&self) -> Option<&str> {
        self.0
            .get(TEXT_SEARCH_OPERATOR)?
            .get("$search")?
            .as_str()
    }

    /// Field conditions and operators in key order.
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Query {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Value> for Query {
    /// Non-object values give the empty filter.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// Direction of one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
    /// Descending by text relevance score.
    TextScore,
}

impl SortOrder {
    /// Normalise a numeric direction: positive is ascending, anything else
    /// descending.
    pub fn from_direction(direction: i64) -> Self {
        if direction > 0 {
            Self::Ascending
        } else {
            Self::Descending
        }
    }

    /// `+1` for ascending, `-1` otherwise.
    pub fn as_direction(self) -> i8 {
        match self {
            Self::Ascending => 1,
            Self::Descending | Self::TextScore => -1,
        }
    }
}

/// One key of a sort specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

/// Ordered list of sort keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec(Vec<SortKey>);

impl SortSpec {
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from `(field, direction)` pairs, normalising each direction.
    /// Later duplicates of a field are ignored.
    pub fn from_directions<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut spec = Self::default();
        for (field, direction) in pairs {
            spec.push(field, SortOrder::from_direction(direction));
        }
        spec
    }

    /// Sort by text relevance score only.
    pub fn by_text_score() -> Self {
        let mut spec = Self::default();
        spec.push(TEXT_SCORE_FIELD, SortOrder::TextScore);
        spec
    }

    fn push(&mut self, field: impl Into<String>, order: SortOrder) {
        let field = field.into();
        if !self.0.iter().any(|key| key.field == field) {
            self.0.push(SortKey { field, order });
        }
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any key sorts by text relevance.
    pub fn uses_text_score(&self) -> bool {
        self.0.iter().any(|key| key.order == SortOrder::TextScore)
    }
}

/// Which fields the backend returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    /// Fields to include. Empty means every field not excluded.
    pub include: Selection,
    /// Fields that are never returned.
    pub exclude: Vec<String>,
    /// Project the text relevance score as [`TEXT_SCORE_FIELD`].
    pub text_score: bool,
}

/// A fully resolved read, ready for the storage collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub query: Query,
    pub projection: Projection,
    pub populate: PopulateTree,
    pub sort: SortSpec,
    pub limit: Option<u32>,
    pub skip: Option<u64>,
    /// Return plain detached snapshots rather than live-bound entities.
    pub lean: bool,
}

/// How `get` finds its document.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Id(DocumentId),
    Query(Query),
}

impl Lookup {
    pub fn id(id: impl Into<DocumentId>) -> Self {
        Self::Id(id.into())
    }

    /// The document id, when the lookup is by id.
    pub fn document_id(&self) -> Option<&DocumentId> {
        match self {
            Self::Id(id) => Some(id),
            Self::Query(_) => None,
        }
    }
}

impl From<DocumentId> for Lookup {
    fn from(id: DocumentId) -> Self {
        Self::Id(id)
    }
}

impl From<Query> for Lookup {
    fn from(query: Query) -> Self {
        Self::Query(query)
    }
}

/// Clamp a requested page size to the policy limit.
///
/// Positive requests are capped at `policy_limit`; zero, negative or missing
/// requests fall back to `policy_limit`.
pub fn effective_limit(requested: Option<i64>, policy_limit: u32) -> u32 {
    match requested {
        Some(n) if n > 0 => n.min(i64::from(policy_limit)) as u32,
        _ => policy_limit,
    }
}

/// Parse a host-supplied limit such as a query-string value.
///
/// Fractional values are truncated; anything unparsable gives `None`.
pub fn parse_limit(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(|n| n.trunc().clamp(i64::MIN as f64, i64::MAX as f64) as i64)
    })
}

/// Options for `list`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    /// `(field, direction)` pairs; directions are normalised to +1/-1.
    pub sort: Option<Vec<(String, i64)>>,
    /// Cache TTL override. `Some(Duration::ZERO)` disables caching.
    pub cache: Option<Duration>,
    pub lean: Option<bool>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the limit from unparsed input; garbage falls back to the policy
    /// default.
    pub fn raw_limit(mut self, raw: &str) -> Self {
        self.limit = parse_limit(raw);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: i64) -> Self {
        self.sort
            .get_or_insert_with(Vec::new)
            .push((field.into(), direction));
        self
    }

    pub fn cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(ttl);
        self
    }

    pub fn lean(mut self, lean: bool) -> Self {
        self.lean = Some(lean);
        self
    }
}

/// Options for `get`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetOptions {
    pub cache: Option<Duration>,
    pub lean: Option<bool>,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(ttl);
        self
    }

    pub fn lean(mut self, lean: bool) -> Self {
        self.lean = Some(lean);
        self
    }
}

/// Options for `number_of`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountOptions {
    pub cache: Option<Duration>,
}

impl CountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(ttl);
        self
    }
}
