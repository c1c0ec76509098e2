//! Async document store trait.
//!
//! The storage backend is an external collaborator. `Model` only talks to it
//! through this trait, handing over a complete [`QueryPlan`] per read instead
//! of building a query chain step by step.

use async_trait::async_trait;
use quarry_core::{Document, DocumentId, QuarryResult, Query, QueryPlan, SchemaIntrospect};
use serde_json::{Map, Value};

/// Async storage trait for one model's documents.
///
/// Implementations surface their own failures as
/// [`quarry_core::StorageError`]; `Model` passes them on unchanged.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Schema introspection for this model.
    fn schema(&self) -> Box<dyn SchemaIntrospect + '_>;

    // ========================================================================
    // READS
    // ========================================================================

    /// Documents matching `plan.query`, projected, populated, sorted and
    /// paged as the plan says.
    async fn find(&self, plan: &QueryPlan) -> QuarryResult<Vec<Document>>;

    /// First document matching `plan.query`.
    async fn find_one(&self, plan: &QueryPlan) -> QuarryResult<Option<Document>>;

    /// Number of documents matching `query`.
    async fn count(&self, query: &Query) -> QuarryResult<u64>;

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Insert a new document. An id is generated when `fields` has no `_id`.
    async fn insert(&self, fields: Map<String, Value>) -> QuarryResult<Document>;

    /// Set `set` on the stored document with `id` and return it as persisted.
    ///
    /// Keys of `set` are dotted paths merged into the stored fields; fields
    /// not named in `set` keep their stored values.
    async fn update_one(
        &self,
        id: &DocumentId,
        set: &Map<String, Value>,
    ) -> QuarryResult<Document>;

    /// Delete a document by id.
    async fn remove(&self, id: &DocumentId) -> QuarryResult<()>;

    /// Set `set` on every document matching `query`, returning how many
    /// documents were modified.
    async fn update_many(&self, query: &Query, set: &Map<String, Value>) -> QuarryResult<u64>;
}
