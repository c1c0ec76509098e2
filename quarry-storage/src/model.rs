//! Query helpers bound to one model.
//!
//! A [`Model`] pairs a [`DocumentStore`] with the model's [`FieldPolicy`] and
//! the optional cache capabilities. Reads resolve requested field paths into
//! a projection and populate tree, clamp the page size, and go through the
//! cache when the read is lean and a TTL applies. Writes invalidate the
//! model's cache entries once they have succeeded.

use quarry_core::path::is_same_or_nested;
use quarry_core::{
    count_shape, effective_limit, plan_shape, CacheDescriptor, CacheKeyBuilder, CacheOperation,
    Classification, CountOptions, Document, DocumentId, Extras, FieldClassifier, FieldPolicy,
    GetOptions, ListOptions, Lookup, QuarryResult, Query, QueryPlan, ReadMode, SchemaIntrospect,
    SortSpec, ID_FIELD, VERSION_KEY,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

use crate::cache::{CacheClear, CacheStore};
use crate::invalidation::InvalidationDispatcher;
use crate::store::DocumentStore;

/// Query helpers for one model.
pub struct Model<S: DocumentStore> {
    store: Arc<S>,
    policy: Arc<FieldPolicy>,
    cache: Option<Arc<dyn CacheStore>>,
    invalidation: InvalidationDispatcher,
}

impl<S: DocumentStore> Clone for Model<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: Arc::clone(&self.policy),
            cache: self.cache.clone(),
            invalidation: self.invalidation.clone(),
        }
    }
}

impl<S: DocumentStore> std::fmt::Debug for Model<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("policy", &self.policy)
            .field("cache", &self.cache.is_some())
            .field("invalidation", &self.invalidation)
            .finish()
    }
}

impl<S: DocumentStore> Model<S> {
    /// Create a model without caching.
    pub fn new(store: Arc<S>, policy: Arc<FieldPolicy>) -> Self {
        let invalidation = InvalidationDispatcher::new(policy.model_name(), None);
        Self {
            store,
            policy,
            cache: None,
            invalidation,
        }
    }

    /// Cache reads in `cache`.
    pub fn with_cache_store(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Invalidate through `clear` after writes.
    pub fn with_cache_clear(mut self, clear: Arc<dyn CacheClear>) -> Self {
        self.invalidation = InvalidationDispatcher::new(self.policy.model_name(), Some(clear));
        self
    }

    /// Use one backend for both caching and invalidation.
    pub fn with_cache<C>(self, cache: Arc<C>) -> Self
    where
        C: CacheStore + CacheClear + 'static,
    {
        self.with_cache_store(cache.clone() as Arc<dyn CacheStore>)
            .with_cache_clear(cache as Arc<dyn CacheClear>)
    }

    pub fn policy(&self) -> &FieldPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn invalidation(&self) -> &InvalidationDispatcher {
        &self.invalidation
    }

    /// Wait for dispatched invalidations to finish.
    pub async fn settle(&self) {
        self.invalidation.settle().await;
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Documents matching `query`.
    ///
    /// `extras` are field paths requested on top of the policy's common
    /// fields; dotted paths through references populate those references.
    pub async fn list(
        &self,
        query: Query,
        extras: impl Into<Extras>,
        options: ListOptions,
    ) -> QuarryResult<Vec<Document>> {
        let extras = extras.into();
        let lean = options.lean.unwrap_or(self.policy.lean());

        let sort = match options.sort {
            Some(pairs) => SortSpec::from_directions(pairs),
            None if query.is_text_search() => SortSpec::by_text_score(),
            None => SortSpec::none(),
        };
        let mut plan = self.plan(query, &extras, lean);
        plan.sort = sort;
        plan.limit = Some(effective_limit(options.limit, self.policy.limit()));
        plan.skip = options.skip;

        let descriptor = self.descriptor(CacheOperation::List, None, options.cache, lean);
        let shape = plan_shape(&plan);
        self.read_through(&descriptor, &shape, || self.store.find(&plan))
            .await
    }

    /// One document, by id or by query.
    pub async fn get(
        &self,
        lookup: impl Into<Lookup>,
        extras: impl Into<Extras>,
        options: GetOptions,
    ) -> QuarryResult<Option<Document>> {
        let extras = extras.into();
        let lean = options.lean.unwrap_or(self.policy.lean());

        let (id, query) = match lookup.into() {
            Lookup::Id(id) => {
                let query = Query::all().where_eq(ID_FIELD, id.as_str());
                (Some(id), query)
            }
            Lookup::Query(query) => (None, query),
        };
        let plan = self.plan(query, &extras, lean);

        let descriptor = self.descriptor(CacheOperation::Get, id.as_ref(), options.cache, lean);
        let shape = plan_shape(&plan);
        self.read_through(&descriptor, &shape, || self.store.find_one(&plan))
            .await
    }

    /// Number of documents matching `query`.
    ///
    /// Counts are plain numbers, so they are cacheable whatever the lean
    /// setting.
    pub async fn number_of(&self, query: Query, options: CountOptions) -> QuarryResult<u64> {
        let descriptor = self.descriptor(CacheOperation::Count, None, options.cache, true);
        let shape = count_shape(&query);
        self.read_through(&descriptor, &shape, || self.store.count(&query))
            .await
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Apply `patch` to `document` and persist the result.
    ///
    /// Only the patch delta is written, keyed by the document id, so fields
    /// missing from a projected `document` keep their stored values.
    /// Read-only fields, `_id`, `__v` and fields the schema does not declare
    /// are left untouched. Returns the document as persisted, without its
    /// secret fields.
    pub async fn patch(
        &self,
        document: &Document,
        patch: Map<String, Value>,
    ) -> QuarryResult<Document> {
        let set: Map<String, Value> = self.writable(patch).into_iter().collect();

        let mut saved = self.store.update_one(&document.id, &set).await?;
        self.invalidation.on_mutation(Some(&saved.id)).await;
        for secret in self.policy.secret_fields() {
            saved.remove_path(secret);
        }
        Ok(saved)
    }

    /// Insert a new document built from `fields`.
    pub async fn create(&self, fields: Map<String, Value>) -> QuarryResult<Document> {
        let created = self.store.insert(fields).await?;
        self.invalidation.on_mutation(Some(&created.id)).await;
        Ok(created)
    }

    /// Delete `document`.
    pub async fn remove(&self, document: &Document) -> QuarryResult<()> {
        self.remove_by_id(&document.id).await
    }

    /// Delete the document with `id`.
    pub async fn remove_by_id(&self, id: &DocumentId) -> QuarryResult<()> {
        self.store.remove(id).await?;
        self.invalidation.on_mutation(Some(id)).await;
        Ok(())
    }

    /// Set `set` on every document matching `query`.
    ///
    /// The same field filtering as [`Model::patch`] applies. Because the
    /// touched ids are unknown, every cached get of the model is cleared.
    pub async fn update_where(&self, query: Query, set: Map<String, Value>) -> QuarryResult<u64> {
        let set: Map<String, Value> = self.writable(set).into_iter().collect();
        if set.is_empty() {
            return Ok(0);
        }
        let modified = self.store.update_many(&query, &set).await?;
        if modified > 0 {
            self.invalidation.on_mutation(None).await;
        }
        Ok(modified)
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn classify(&self, extras: &Extras) -> Classification {
        let schema = self.store.schema();
        let classification =
            FieldClassifier::from_policy(&self.policy).classify(schema.as_ref(), extras);
        tracing::trace!(
            model = %self.policy.model_name(),
            requested = extras.paths().len(),
            selected = classification.selection.len(),
            populated = classification.populate.len(),
            "Fields classified"
        );
        classification
    }

    /// Plan with projection and population resolved; no sort or paging.
    fn plan(&self, query: Query, extras: &Extras, lean: bool) -> QueryPlan {
        let Classification {
            selection,
            populate,
        } = self.classify(extras);

        let mut plan = QueryPlan {
            populate,
            lean,
            ..Default::default()
        };
        plan.projection.include = selection;
        plan.projection.exclude = self.policy.secret_fields().to_vec();
        plan.projection.text_score = query.is_text_search();
        plan.query = query;
        plan
    }

    fn descriptor(
        &self,
        operation: CacheOperation,
        id: Option<&DocumentId>,
        requested: Option<std::time::Duration>,
        lean: bool,
    ) -> CacheDescriptor {
        let prefix = CacheKeyBuilder::new(self.policy.model_name()).prefix(operation, id);
        CacheDescriptor::resolve(
            prefix,
            requested,
            self.policy.cache_ttl(),
            ReadMode::from_lean(lean),
        )
    }

    /// Patch entries that may be written.
    fn writable(&self, fields: Map<String, Value>) -> Vec<(String, Value)> {
        let schema = self.store.schema();
        let mut out = Vec::new();
        for (field, value) in fields {
            self.collect_writable(schema.as_ref(), field, value, &mut out);
        }
        out
    }

    /// Push `field` when writable. A value that would overwrite a read-only
    /// descendant is split into its sub-paths instead.
    fn collect_writable(
        &self,
        schema: &dyn SchemaIntrospect,
        field: String,
        value: Value,
        out: &mut Vec<(String, Value)>,
    ) {
        if !self.is_writable(schema, &field) {
            return;
        }
        let guards_descendant = self
            .policy
            .read_only_fields()
            .iter()
            .any(|read_only| read_only != &field && is_same_or_nested(read_only, &field));
        if !guards_descendant {
            out.push((field, value));
            return;
        }
        match value {
            Value::Object(children) => {
                for (child, value) in children {
                    self.collect_writable(schema, format!("{field}.{child}"), value, out);
                }
            }
            _ => tracing::trace!(
                model = %self.policy.model_name(),
                field = %field,
                reason = "read-only descendant",
                "Patch field skipped"
            ),
        }
    }

    fn is_writable(&self, schema: &dyn SchemaIntrospect, field: &str) -> bool {
        let reason = if field == ID_FIELD || field == VERSION_KEY {
            "reserved"
        } else if self.policy.is_read_only(field) {
            "read-only"
        } else if !schema.field_exists(field) {
            "unknown"
        } else {
            return true;
        };
        tracing::trace!(
            model = %self.policy.model_name(),
            field,
            reason,
            "Patch field skipped"
        );
        false
    }

    /// Serve from cache when possible, otherwise fetch and fill the cache.
    ///
    /// Cache failures never fail the read: a failed get is a miss and a
    /// failed put is dropped.
    async fn read_through<T, F, Fut>(
        &self,
        descriptor: &CacheDescriptor,
        shape: &Value,
        fetch: F,
    ) -> QuarryResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = QuarryResult<T>>,
    {
        let cache = match &self.cache {
            Some(cache) if descriptor.is_enabled() => cache,
            _ => return fetch().await,
        };
        let key = descriptor.key(shape);

        match cache.get(&key).await {
            Ok(Some(cached)) => match serde_json::from_value::<T>(cached) {
                Ok(value) => {
                    tracing::debug!(key = %key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Cached value could not be decoded");
                }
            },
            Ok(None) => tracing::debug!(key = %key, "Cache miss"),
            Err(e) => tracing::debug!(key = %key, error = %e, "Cache read failed"),
        }

        let value = fetch().await?;
        match serde_json::to_value(&value) {
            Ok(encoded) => {
                if let Err(e) = cache.put(&key, encoded, descriptor.ttl).await {
                    tracing::debug!(key = %key, error = %e, "Cache write failed");
                }
            }
            Err(e) => tracing::debug!(key = %key, error = %e, "Result could not be encoded"),
        }
        Ok(value)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::mock::{MockCollection, MockDatabase};
    use quarry_core::{FieldType, ModelSchema, SchemaCatalog, SortOrder, StorageError};
    use serde_json::json;
    use std::time::Duration;

    fn database() -> MockDatabase {
        let db = MockDatabase::new(
            SchemaCatalog::new()
                .with(
                    ModelSchema::new("Item")
                        .field("name", FieldType::String)
                        .field("price", FieldType::Number)
                        .field("internalNote", FieldType::String)
                        .field("createdBy", FieldType::String)
                        .field("author", FieldType::reference("Author"))
                        .text_index(["name"]),
                )
                .with(ModelSchema::new("Author").field("name", FieldType::String)),
        );
        db.seed("Author", json!({"_id": "a1", "name": "Ada"})).unwrap();
        let rows = [("1", "red lamp", 30), ("2", "blue lamp", 10), ("3", "chair", 20)];
        for (id, name, price) in rows {
            db.seed(
                "Item",
                json!({"_id": id, "name": name, "price": price, "internalNote": "x",
                       "createdBy": "u1", "author": "a1"}),
            )
            .unwrap();
        }
        db
    }

    fn policy() -> Arc<FieldPolicy> {
        Arc::new(
            FieldPolicy::builder("Item")
                .with_common_fields(["name"])
                .with_secret_fields(["internalNote", "__v"])
                .with_read_only_fields(["createdBy"])
                .with_limit(2)
                .build()
                .unwrap(),
        )
    }

    fn model(db: &MockDatabase) -> Model<MockCollection> {
        Model::new(Arc::new(db.collection("Item").unwrap()), policy())
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_list_projects_common_and_extras_without_secrets() {
        let db = database();
        let items = model(&db);

        let found = items
            .list(Query::all(), ["internalNote", "price"], ListOptions::new())
            .await
            .unwrap();

        for doc in &found {
            assert!(doc.get("name").is_some());
            assert!(doc.get("price").is_some());
            assert!(doc.get("internalNote").is_none());
            assert!(doc.get("__v").is_none());
        }
    }

    #[tokio::test]
    async fn test_list_clamps_limit() {
        let db = database();
        let items = model(&db);

        let found = items
            .list(Query::all(), Extras::none(), ListOptions::new().limit(50))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(db.last_plan().and_then(|p| p.limit), Some(2));

        items
            .list(Query::all(), Extras::none(), ListOptions::new().limit(-1))
            .await
            .unwrap();
        assert_eq!(db.last_plan().and_then(|p| p.limit), Some(2));

        items
            .list(Query::all(), Extras::none(), ListOptions::new().limit(1))
            .await
            .unwrap();
        assert_eq!(db.last_plan().and_then(|p| p.limit), Some(1));
    }

    #[tokio::test]
    async fn test_text_search_defaults_to_score_sort() {
        let db = database();
        let items = model(&db);

        items
            .list(Query::all().text("lamp"), Extras::none(), ListOptions::new())
            .await
            .unwrap();
        let plan = db.last_plan().unwrap();
        assert!(plan.projection.text_score);
        assert_eq!(plan.sort, SortSpec::by_text_score());

        items
            .list(
                Query::all().text("lamp"),
                Extras::none(),
                ListOptions::new().sort_by("price", 3),
            )
            .await
            .unwrap();
        let plan = db.last_plan().unwrap();
        assert_eq!(plan.sort.keys()[0].order, SortOrder::Ascending);
        assert!(!plan.sort.uses_text_score());
    }

    #[tokio::test]
    async fn test_get_by_id_populates_reference() {
        let db = database();
        let items = model(&db);

        let found = items
            .get(Lookup::id("1"), "author.name", GetOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get("author"), Some(&json!({"_id": "a1", "name": "Ada"})));
        assert!(found.get("price").is_none());
    }

    #[tokio::test]
    async fn test_patch_skips_read_only_and_unknown_fields() {
        let db = database();
        let items = model(&db);
        let doc = db.stored("Item", &"1".into()).unwrap().unwrap();

        let saved = items
            .patch(
                &doc,
                fields(json!({"name": "x", "createdBy": "u2", "bogus": 1, "_id": "9"})),
            )
            .await
            .unwrap();

        assert_eq!(saved.id.as_str(), "1");
        assert_eq!(saved.get("name"), Some(&json!("x")));
        assert_eq!(saved.get("createdBy"), Some(&json!("u1")));
        assert!(saved.get("bogus").is_none());
    }

    #[tokio::test]
    async fn test_patch_of_projected_document_keeps_stored_fields() {
        let db = database();
        let items = model(&db);
        let projected = items
            .get(DocumentId::new("1"), "author.name", GetOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert!(projected.get("createdBy").is_none());

        let saved = items
            .patch(&projected, fields(json!({"price": 31, "createdBy": "u2"})))
            .await
            .unwrap();

        let stored = db.stored("Item", &"1".into()).unwrap().unwrap();
        assert_eq!(stored.get("price"), Some(&json!(31)));
        assert_eq!(stored.get("createdBy"), Some(&json!("u1")));
        assert_eq!(stored.get("internalNote"), Some(&json!("x")));
        assert_eq!(stored.get("author"), Some(&json!("a1")));
        assert!(saved.get("internalNote").is_none());
        assert!(saved.get("__v").is_none());
    }

    #[tokio::test]
    async fn test_patch_cannot_overwrite_nested_read_only_through_parent() {
        let db = MockDatabase::new(SchemaCatalog::new().with(
            ModelSchema::new("Item").field("name", FieldType::String).field(
                "meta",
                FieldType::object([("color", FieldType::String), ("size", FieldType::Number)]),
            ),
        ));
        db.seed("Item", json!({"_id": "1", "name": "lamp", "meta": {"color": "red", "size": 2}}))
            .unwrap();
        let policy = FieldPolicy::builder("Item")
            .with_read_only_fields(["meta.color"])
            .build()
            .unwrap();
        let items = Model::new(Arc::new(db.collection("Item").unwrap()), Arc::new(policy));
        let doc = db.stored("Item", &"1".into()).unwrap().unwrap();

        items
            .patch(&doc, fields(json!({"meta": {"color": "green", "size": 3}})))
            .await
            .unwrap();
        items
            .patch(&doc, fields(json!({"meta.color": "blue"})))
            .await
            .unwrap();
        items
            .patch(&doc, fields(json!({"meta": null})))
            .await
            .unwrap();

        let stored = db.stored("Item", &"1".into()).unwrap().unwrap();
        assert_eq!(stored.lookup("meta.color"), Some(&json!("red")));
        assert_eq!(stored.lookup("meta.size"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_failed_patch_does_not_invalidate() {
        let db = database();
        let cache = Arc::new(InMemoryCache::new());
        let items = model(&db).with_cache(cache.clone());
        let doc = db.stored("Item", &"1".into()).unwrap().unwrap();
        db.fail_next_write(StorageError::Unavailable {
            reason: "down".to_string(),
        });

        let err = items
            .patch(&doc, fields(json!({"name": "x"})))
            .await
            .unwrap_err();
        items.settle().await;

        assert!(matches!(
            err,
            quarry_core::QuarryError::Storage(StorageError::Unavailable { .. })
        ));
        assert!(cache.cleared_patterns().await.is_empty());
    }

    #[tokio::test]
    async fn test_number_of_is_cached() {
        let db = database();
        let cache = Arc::new(InMemoryCache::new());
        let items = model(&db).with_cache(cache.clone());
        let options = CountOptions::new().cache(Duration::from_secs(60));

        assert_eq!(items.number_of(Query::all(), options.clone()).await.unwrap(), 3);
        assert_eq!(items.number_of(Query::all(), options).await.unwrap(), 3);
        assert_eq!(db.read_count(), 1);
        assert_eq!(cache.stats().await.hits, 1);
    }

    #[tokio::test]
    async fn test_hydrated_reads_bypass_cache() {
        let db = database();
        let cache = Arc::new(InMemoryCache::new());
        let items = model(&db).with_cache(cache.clone());
        let options = ListOptions::new().cache(Duration::from_secs(60)).lean(false);

        items.list(Query::all(), Extras::none(), options.clone()).await.unwrap();
        items.list(Query::all(), Extras::none(), options).await.unwrap();

        assert_eq!(db.read_count(), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_where_filters_fields_and_clears_all_gets() {
        let db = database();
        let cache = Arc::new(InMemoryCache::new());
        let items = model(&db).with_cache(cache.clone());

        let modified = items
            .update_where(
                Query::all().where_eq("author", "a1"),
                fields(json!({"price": 1, "createdBy": "u9"})),
            )
            .await
            .unwrap();
        items.settle().await;

        assert_eq!(modified, 3);
        let stored = db.stored("Item", &"2".into()).unwrap().unwrap();
        assert_eq!(stored.get("createdBy"), Some(&json!("u1")));
        assert_eq!(
            cache.cleared_patterns().await,
            vec!["Item:count*", "Item:list*", "Item:get*"]
        );
    }
}
