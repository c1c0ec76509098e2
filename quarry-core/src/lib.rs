//! QUARRY Core - Field Resolution and Cache Keys
//!
//! Pure data types and resolution logic with no I/O. Storage collaborators,
//! the query orchestrator and invalidation live in `quarry-storage`.

pub mod cache_key;
pub mod classify;
pub mod document;
pub mod error;
pub mod path;
pub mod policy;
pub mod query;
pub mod schema;

/// Field holding the document id.
pub const ID_FIELD: &str = "_id";

/// Field holding the document version counter.
pub const VERSION_KEY: &str = "__v";

pub use cache_key::{
    canonical_json, count_shape, matches_pattern, plan_shape, shape_hash, CacheDescriptor,
    CacheKeyBuilder, CacheOperation, ReadMode,
};
pub use classify::{Classification, Extras, FieldClassifier, PopulateNode, PopulateTree, Selection};
pub use document::{Document, DocumentId};
pub use error::{CacheError, ConfigError, QuarryError, QuarryResult, StorageError};
pub use path::{walk_prefixes, FieldPath, FieldPrefixes};
pub use policy::{FieldPolicy, PolicyConfig, DEFAULT_LIMIT};
pub use query::{
    effective_limit, parse_limit, CountOptions, GetOptions, ListOptions, Lookup, Projection, Query,
    QueryPlan, SortKey, SortOrder, SortSpec, TEXT_SCORE_FIELD, TEXT_SEARCH_OPERATOR,
};
pub use schema::{FieldType, ModelSchema, SchemaCatalog, SchemaIntrospect, SchemaView};
