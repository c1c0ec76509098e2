//! In-memory document store for testing.
//!
//! Supports equality filters on dotted paths, `$text` search over the
//! model's text index, sorting, paging, projection and reference population,
//! which is everything `Model` asks of a backend.

use async_trait::async_trait;
use quarry_core::document::{lookup_in, set_in};
use quarry_core::{
    Document, DocumentId, FieldType, ModelSchema, PopulateNode, Projection, QuarryResult, Query,
    QueryPlan, SchemaCatalog, SchemaIntrospect, SortOrder, SortSpec, StorageError, ID_FIELD,
    TEXT_SCORE_FIELD, TEXT_SEARCH_OPERATOR, VERSION_KEY,
};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::store::DocumentStore;

type Collection = BTreeMap<DocumentId, Document>;
type Collections = HashMap<String, Collection>;

// ============================================================================
// MOCK DATABASE
// ============================================================================

/// In-memory database shared by the [`MockCollection`]s of every model in a
/// [`SchemaCatalog`].
#[derive(Debug, Clone, Default)]
pub struct MockDatabase {
    catalog: Arc<SchemaCatalog>,
    collections: Arc<RwLock<Collections>>,
    write_failure: Arc<Mutex<Option<StorageError>>>,
    reads: Arc<AtomicU64>,
    last_plan: Arc<Mutex<Option<QueryPlan>>>,
}

impl MockDatabase {
    /// Create a new mock database for the models of `catalog`.
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            ..Default::default()
        }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Store handle for one registered model.
    pub fn collection(&self, model: &str) -> QuarryResult<MockCollection> {
        if !self.catalog.contains(model) {
            return Err(StorageError::UnknownModel {
                model: model.to_string(),
            }
            .into());
        }
        Ok(MockCollection {
            model: model.to_string(),
            db: self.clone(),
        })
    }

    /// Insert a document directly, bypassing failure injection.
    pub fn seed(&self, model: &str, fields: Value) -> QuarryResult<Document> {
        let fields = match fields {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        self.insert_into(model, fields)
    }

    /// Make the next write fail with `error`.
    pub fn fail_next_write(&self, error: StorageError) {
        let mut failure = self
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *failure = Some(error);
    }

    /// Number of reads (`find`, `find_one`, `count`) served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(AtomicOrdering::SeqCst)
    }

    /// The plan of the most recent `find` or `find_one`.
    pub fn last_plan(&self) -> Option<QueryPlan> {
        self.last_plan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stored document by id, unprojected.
    pub fn stored(&self, model: &str, id: &DocumentId) -> QuarryResult<Option<Document>> {
        let collections = self.read()?;
        Ok(collections.get(model).and_then(|c| c.get(id)).cloned())
    }

    /// Number of stored documents of `model`.
    pub fn document_count(&self, model: &str) -> QuarryResult<usize> {
        Ok(self.read()?.get(model).map_or(0, BTreeMap::len))
    }

    /// Clear all stored data.
    pub fn clear(&self) -> QuarryResult<()> {
        self.write()?.clear();
        Ok(())
    }

    fn read(&self) -> QuarryResult<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> QuarryResult<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn take_write_failure(&self) -> Option<StorageError> {
        self.write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn record_read(&self, plan: Option<&QueryPlan>) {
        self.reads.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(plan) = plan {
            *self.last_plan.lock().unwrap_or_else(PoisonError::into_inner) = Some(plan.clone());
        }
    }

    fn insert_into(&self, model: &str, fields: Map<String, Value>) -> QuarryResult<Document> {
        let id = fields
            .get(ID_FIELD)
            .and_then(DocumentId::from_json)
            .unwrap_or_else(|| DocumentId::new(Uuid::now_v7().to_string()));
        let mut document = Document::new(id, fields);
        document.fields.insert(VERSION_KEY.to_string(), json!(0));

        let mut collections = self.write()?;
        let collection = collections.entry(model.to_string()).or_default();
        if collection.contains_key(&document.id) {
            return Err(StorageError::InsertFailed {
                model: model.to_string(),
                reason: format!("duplicate id {}", document.id),
            }
            .into());
        }
        collection.insert(document.id.clone(), document.clone());
        Ok(document)
    }
}

// ============================================================================
// MOCK COLLECTION
// ============================================================================

/// [`DocumentStore`] over one model of a [`MockDatabase`].
#[derive(Debug, Clone)]
pub struct MockCollection {
    model: String,
    db: MockDatabase,
}

impl MockCollection {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn database(&self) -> &MockDatabase {
        &self.db
    }

    fn schema_decl(&self) -> Option<&ModelSchema> {
        self.db.catalog.get(&self.model)
    }

    /// Matching documents with their text scores, sorted and paged.
    fn select(&self, plan: &QueryPlan, limit: Option<u32>) -> QuarryResult<Vec<Document>> {
        let collections = self.db.read()?;
        let mut matched = Vec::new();
        if let Some(collection) = collections.get(&self.model) {
            for document in collection.values() {
                if let Some(score) = self.evaluate(&plan.query, document)? {
                    matched.push((document, score));
                }
            }
        }

        matched.sort_by(|a, b| compare_matches(a, b, &plan.sort));

        let skip = plan.skip.unwrap_or(0) as usize;
        let take = limit.map_or(usize::MAX, |n| n as usize);
        Ok(matched
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|(document, score)| self.render(&collections, document, score, plan))
            .collect())
    }

    /// Text score of a matching document, `None` when it does not match.
    fn evaluate(&self, query: &Query, document: &Document) -> QuarryResult<Option<f64>> {
        let mut score = 0.0;
        for (key, condition) in query.conditions() {
            if key == TEXT_SEARCH_OPERATOR {
                let search = query
                    .text_search()
                    .ok_or_else(|| self.unsupported(TEXT_SEARCH_OPERATOR))?;
                score = self.text_score(document, search);
                if score == 0.0 {
                    return Ok(None);
                }
                continue;
            }
            if key.starts_with('$') {
                return Err(self.unsupported(key).into());
            }
            if let Some(operator) = condition
                .as_object()
                .and_then(|map| map.keys().find(|k| k.starts_with('$')))
            {
                return Err(self.unsupported(operator).into());
            }

            let id;
            let actual = if key == ID_FIELD {
                id = Value::String(document.id.to_string());
                Some(&id)
            } else {
                document.lookup(key)
            };
            if !value_matches(actual, condition) {
                return Ok(None);
            }
        }
        Ok(Some(score))
    }

    /// Number of search terms found in the text-indexed fields.
    fn text_score(&self, document: &Document, search: &str) -> f64 {
        let indexed: Vec<&str> = match self.schema_decl() {
            Some(schema) if !schema.text_index.is_empty() => {
                schema.text_index.iter().map(String::as_str).collect()
            }
            _ => document.fields.keys().map(String::as_str).collect(),
        };
        let words: Vec<String> = indexed
            .iter()
            .filter_map(|field| document.lookup(field)?.as_str())
            .flat_map(|text| text.split_whitespace())
            .map(str::to_lowercase)
            .collect();

        search
            .split_whitespace()
            .map(str::to_lowercase)
            .map(|term| words.iter().filter(|word| **word == term).count())
            .sum::<usize>() as f64
    }

    fn render(
        &self,
        collections: &Collections,
        document: &Document,
        score: f64,
        plan: &QueryPlan,
    ) -> Document {
        let mut out = document.clone();
        populate(
            &self.db.catalog,
            &self.model,
            &mut out.fields,
            plan.populate.nodes(),
            collections,
        );
        project(&mut out, &plan.projection);
        if plan.projection.text_score {
            out.fields.insert(TEXT_SCORE_FIELD.to_string(), json!(score));
        }
        out
    }

    fn unsupported(&self, operator: &str) -> StorageError {
        StorageError::UnsupportedOperator {
            model: self.model.clone(),
            operator: operator.to_string(),
        }
    }

    fn not_found(&self, id: &DocumentId) -> StorageError {
        StorageError::NotFound {
            model: self.model.clone(),
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for MockCollection {
    fn schema(&self) -> Box<dyn SchemaIntrospect + '_> {
        match self.db.catalog.view(&self.model) {
            Some(view) => Box::new(view),
            None => Box::new(ModelSchema::new(self.model.clone())),
        }
    }

    async fn find(&self, plan: &QueryPlan) -> QuarryResult<Vec<Document>> {
        self.db.record_read(Some(plan));
        self.select(plan, plan.limit)
    }

    async fn find_one(&self, plan: &QueryPlan) -> QuarryResult<Option<Document>> {
        self.db.record_read(Some(plan));
        Ok(self.select(plan, Some(1))?.into_iter().next())
    }

    async fn count(&self, query: &Query) -> QuarryResult<u64> {
        self.db.record_read(None);
        let collections = self.db.read()?;
        let mut count = 0;
        if let Some(collection) = collections.get(&self.model) {
            for document in collection.values() {
                if self.evaluate(query, document)?.is_some() {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn insert(&self, fields: Map<String, Value>) -> QuarryResult<Document> {
        if let Some(error) = self.db.take_write_failure() {
            return Err(error.into());
        }
        self.db.insert_into(&self.model, fields)
    }

    async fn update_one(
        &self,
        id: &DocumentId,
        set: &Map<String, Value>,
    ) -> QuarryResult<Document> {
        if let Some(error) = self.db.take_write_failure() {
            return Err(error.into());
        }
        let mut collections = self.db.write()?;
        let stored = collections
            .get_mut(&self.model)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| self.not_found(id))?;

        apply_set(stored, set);
        Ok(stored.clone())
    }

    async fn remove(&self, id: &DocumentId) -> QuarryResult<()> {
        if let Some(error) = self.db.take_write_failure() {
            return Err(error.into());
        }
        let mut collections = self.db.write()?;
        collections
            .get_mut(&self.model)
            .and_then(|c| c.remove(id))
            .map(|_| ())
            .ok_or_else(|| self.not_found(id).into())
    }

    async fn update_many(&self, query: &Query, set: &Map<String, Value>) -> QuarryResult<u64> {
        if let Some(error) = self.db.take_write_failure() {
            return Err(error.into());
        }
        let mut collections = self.db.write()?;
        let Some(collection) = collections.get_mut(&self.model) else {
            return Ok(0);
        };

        let mut ids = Vec::new();
        for document in collection.values() {
            if self.evaluate(query, document)?.is_some() {
                ids.push(document.id.clone());
            }
        }
        for id in &ids {
            if let Some(document) = collection.get_mut(id) {
                apply_set(document, set);
            }
        }
        Ok(ids.len() as u64)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Merge `set` into `document` and bump its version.
fn apply_set(document: &mut Document, set: &Map<String, Value>) {
    for (path, value) in set {
        document.set_path(path, value.clone());
    }
    let version = next_version(document);
    document
        .fields
        .insert(VERSION_KEY.to_string(), json!(version));
}

fn next_version(document: &Document) -> u64 {
    document
        .get(VERSION_KEY)
        .and_then(Value::as_u64)
        .map_or(0, |v| v + 1)
}

/// Equality, with array fields matching any element.
fn value_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(value) => value == expected,
    }
}

fn compare_matches(a: &(&Document, f64), b: &(&Document, f64), sort: &SortSpec) -> Ordering {
    for key in sort.keys() {
        let ordering = match key.order {
            SortOrder::TextScore => b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal),
            SortOrder::Ascending => {
                compare_values(sort_value(a.0, &key.field), sort_value(b.0, &key.field))
            }
            SortOrder::Descending => {
                compare_values(sort_value(a.0, &key.field), sort_value(b.0, &key.field)).reverse()
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn sort_value(document: &Document, field: &str) -> Option<Value> {
    if field == ID_FIELD {
        return Some(Value::String(document.id.to_string()));
    }
    document.lookup(field).cloned()
}

/// Missing < null < bool < number < string < array < object.
fn compare_values(a: Option<Value>, b: Option<Value>) -> Ordering {
    fn rank(value: &Option<Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (&a, &b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(&a).cmp(&rank(&b)),
    }
}

/// Replace reference ids with the referenced documents.
fn populate<'n>(
    catalog: &SchemaCatalog,
    model: &str,
    fields: &mut Map<String, Value>,
    nodes: impl Iterator<Item = &'n PopulateNode>,
    collections: &Collections,
) {
    for node in nodes {
        let Some(target) = catalog
            .get(model)
            .and_then(|schema| schema.resolve(&node.path))
            .and_then(FieldType::reference_target)
        else {
            continue;
        };
        let Some(current) = lookup_in(fields, &node.path).cloned() else {
            continue;
        };

        let expanded = match current {
            Value::Array(ids) => Value::Array(
                ids.iter()
                    .map(|id| expand_reference(catalog, target, id, node, collections))
                    .collect(),
            ),
            single => expand_reference(catalog, target, &single, node, collections),
        };
        set_in(fields, &node.path, expanded);
    }
}

fn expand_reference(
    catalog: &SchemaCatalog,
    target: &str,
    reference: &Value,
    node: &PopulateNode,
    collections: &Collections,
) -> Value {
    let Some(id) = DocumentId::from_json(reference) else {
        return reference.clone();
    };
    let Some(document) = collections.get(target).and_then(|c| c.get(&id)) else {
        return Value::Null;
    };

    let mut fields = document.fields.clone();
    populate(catalog, target, &mut fields, node.children.values(), collections);

    let selected: Vec<&str> = node.selected().collect();
    let mut out = Map::new();
    out.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    if selected.is_empty() {
        out.extend(fields);
    } else {
        for path in selected {
            if let Some(value) = lookup_in(&fields, path) {
                set_in(&mut out, path, value.clone());
            }
        }
    }
    Value::Object(out)
}

fn project(document: &mut Document, projection: &Projection) {
    if !projection.include.is_empty() {
        document
            .fields
            .retain(|field, _| projection.include.contains(field));
    }
    for path in &projection.exclude {
        document.remove_path(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{Extras, FieldClassifier, Selection};

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new()
            .with(
                ModelSchema::new("Item")
                    .field("name", FieldType::String)
                    .field("price", FieldType::Number)
                    .field("tags", FieldType::list(FieldType::String))
                    .field("author", FieldType::reference("Author"))
                    .text_index(["name"]),
            )
            .with(
                ModelSchema::new("Author")
                    .field("name", FieldType::String)
                    .field("email", FieldType::String)
                    .field("company", FieldType::reference("Company")),
            )
            .with(
                ModelSchema::new("Company")
                    .field("name", FieldType::String)
                    .field("country", FieldType::String),
            )
    }

    fn seeded() -> MockDatabase {
        let db = MockDatabase::new(catalog());
        db.seed("Company", json!({"_id": "c1", "name": "Acme", "country": "NL"}))
            .unwrap();
        db.seed(
            "Author",
            json!({"_id": "a1", "name": "Ada", "email": "ada@example.com", "company": "c1"}),
        )
        .unwrap();
        db.seed(
            "Item",
            json!({"_id": "1", "name": "red lamp", "price": 30, "tags": ["home"], "author": "a1"}),
        )
        .unwrap();
        db.seed(
            "Item",
            json!({"_id": "2", "name": "blue lamp", "price": 10, "tags": ["office"]}),
        )
        .unwrap();
        db.seed("Item", json!({"_id": "3", "name": "red chair", "price": 20}))
            .unwrap();
        db
    }

    fn ids(documents: &[Document]) -> Vec<&str> {
        documents.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_unknown_model_rejected() {
        let db = MockDatabase::new(catalog());
        assert!(db.collection("Nope").is_err());
    }

    #[tokio::test]
    async fn test_equality_filter_and_array_membership() {
        let items = seeded().collection("Item").unwrap();
        let plan = QueryPlan {
            query: Query::all().where_eq("tags", "home"),
            ..Default::default()
        };
        assert_eq!(ids(&items.find(&plan).await.unwrap()), vec!["1"]);

        let plan = QueryPlan {
            query: Query::all().where_eq(ID_FIELD, "3"),
            ..Default::default()
        };
        assert_eq!(ids(&items.find(&plan).await.unwrap()), vec!["3"]);
    }

    #[tokio::test]
    async fn test_sort_skip_limit() {
        let items = seeded().collection("Item").unwrap();
        let plan = QueryPlan {
            sort: SortSpec::from_directions([("price", 1)]),
            skip: Some(1),
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(ids(&items.find(&plan).await.unwrap()), vec!["3"]);

        let plan = QueryPlan {
            sort: SortSpec::from_directions([("price", -1)]),
            ..Default::default()
        };
        assert_eq!(ids(&items.find(&plan).await.unwrap()), vec!["1", "3", "2"]);
    }

    #[tokio::test]
    async fn test_text_search_scores_and_sorts() {
        let items = seeded().collection("Item").unwrap();
        let mut plan = QueryPlan {
            query: Query::all().text("red lamp"),
            sort: SortSpec::by_text_score(),
            ..Default::default()
        };
        plan.projection.text_score = true;

        let found = items.find(&plan).await.unwrap();
        assert_eq!(ids(&found)[0], "1");
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].get(TEXT_SCORE_FIELD), Some(&json!(2.0)));
    }

    #[tokio::test]
    async fn test_unsupported_operator() {
        let items = seeded().collection("Item").unwrap();
        let query = Query::from(json!({"price": {"$gt": 5}}));
        let err = items.count(&query).await.unwrap_err();
        assert!(matches!(
            err,
            quarry_core::QuarryError::Storage(StorageError::UnsupportedOperator { .. })
        ));
    }

    #[tokio::test]
    async fn test_projection_and_population_from_classification() {
        let db = seeded();
        let items = db.collection("Item").unwrap();
        let common = vec!["name".to_string()];
        let secret = vec![VERSION_KEY.to_string()];
        let classification = FieldClassifier::new(&common, &secret).classify(
            items.schema().as_ref(),
            &Extras::from(["author.name", "author.company.country"]),
        );

        let mut plan = QueryPlan {
            query: Query::all().where_eq(ID_FIELD, "1"),
            populate: classification.populate,
            ..Default::default()
        };
        plan.projection.include = classification.selection;
        plan.projection.exclude = secret;

        let found = items.find_one(&plan).await.unwrap().unwrap();
        assert_eq!(found.get("price"), None);
        assert_eq!(found.get(VERSION_KEY), None);
        assert_eq!(
            found.get("author"),
            Some(&json!({"_id": "a1", "name": "Ada", "company": {"_id": "c1", "country": "NL"}}))
        );
    }

    #[tokio::test]
    async fn test_population_of_missing_reference_is_null() {
        let db = seeded();
        db.seed("Item", json!({"_id": "9", "name": "orphan", "author": "ghost"}))
            .unwrap();
        let items = db.collection("Item").unwrap();
        let mut plan = QueryPlan {
            query: Query::all().where_eq(ID_FIELD, "9"),
            ..Default::default()
        };
        plan.populate.merge_node(PopulateNode::new("author"));
        plan.projection.include = Selection::from_iter(["author"]);

        let found = items.find_one(&plan).await.unwrap().unwrap();
        assert_eq!(found.get("author"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_insert_generates_id_and_version() {
        let db = MockDatabase::new(catalog());
        let items = db.collection("Item").unwrap();
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!("stool"));

        let created = items.insert(fields.clone()).await.unwrap();
        assert!(Uuid::parse_str(created.id.as_str()).is_ok());
        assert_eq!(created.get(VERSION_KEY), Some(&json!(0)));

        fields.insert(ID_FIELD.to_string(), json!(created.id.as_str()));
        assert!(items.insert(fields).await.is_err());
    }

    #[tokio::test]
    async fn test_update_one_merges_and_bumps_version() {
        let db = seeded();
        let items = db.collection("Item").unwrap();
        let before = db.stored("Item", &"1".into()).unwrap().unwrap();
        let mut set = Map::new();
        set.insert("price".to_string(), json!(11));

        let saved = items.update_one(&"1".into(), &set).await.unwrap();
        assert_eq!(saved.get("price"), Some(&json!(11)));
        assert_eq!(saved.get(VERSION_KEY), Some(&json!(1)));
        assert_eq!(saved.get("name"), before.get("name"));
        assert_eq!(saved.get("author"), before.get("author"));

        let err = items.update_one(&"nope".into(), &set).await.unwrap_err();
        assert!(matches!(
            err,
            quarry_core::QuarryError::Storage(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let db = seeded();
        let items = db.collection("Item").unwrap();
        db.fail_next_write(StorageError::Unavailable {
            reason: "down".to_string(),
        });

        assert!(items.remove(&"1".into()).await.is_err());
        assert_eq!(db.document_count("Item").unwrap(), 3);

        items.remove(&"1".into()).await.unwrap();
        assert_eq!(db.document_count("Item").unwrap(), 2);
        assert!(items.remove(&"1".into()).await.is_err());
    }

    #[tokio::test]
    async fn test_update_many_sets_nested_paths() {
        let db = seeded();
        let items = db.collection("Item").unwrap();
        let mut set = Map::new();
        set.insert("price".to_string(), json!(5));

        let modified = items
            .update_many(&Query::all().where_eq("tags", "office"), &set)
            .await
            .unwrap();
        assert_eq!(modified, 1);

        let stored = db.stored("Item", &"2".into()).unwrap().unwrap();
        assert_eq!(stored.get("price"), Some(&json!(5)));
        assert_eq!(stored.get(VERSION_KEY), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_read_count_and_last_plan() {
        let db = seeded();
        let items = db.collection("Item").unwrap();
        let plan = QueryPlan {
            limit: Some(2),
            ..Default::default()
        };
        items.find(&plan).await.unwrap();
        items.count(&Query::all()).await.unwrap();

        assert_eq!(db.read_count(), 2);
        assert_eq!(db.last_plan().and_then(|p| p.limit), Some(2));
    }
}
