//! QUARRY Test Utilities
//!
//! Centralized test infrastructure for the Quarry workspace:
//! - Proptest generators for field paths, policies and queries
//! - Test fixtures for the Item / Author / Company scenario
//! - Custom assertions for Quarry-specific validation
//! - Tracing setup for tests

// Re-export mock collaborators from their source crate
pub use quarry_storage::{InMemoryCache, MockCollection, MockDatabase};

// Re-export core types for convenience
pub use quarry_core::{
    CacheError, ConfigError, Document, DocumentId, Extras, FieldPolicy, FieldType, ModelSchema,
    QuarryError, QuarryResult, Query, SchemaCatalog, StorageError,
};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a fmt subscriber filtered by `RUST_LOG` (default `quarry=debug`).
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quarry_storage=debug,warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Quarry types.

    use super::*;
    use proptest::prelude::*;
    use quarry_core::{PolicyConfig, SortSpec};

    /// A single path segment.
    pub fn arb_segment() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z0-9_]{0,7}"
    }

    /// A well-formed dotted path of 1 to 4 segments.
    pub fn arb_field_path() -> impl Strategy<Value = String> {
        prop::collection::vec(arb_segment(), 1..=4).prop_map(|segments| segments.join("."))
    }

    /// Text that is not a valid path: empty, or with an empty segment.
    pub fn arb_malformed_path() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            Just(".".to_string()),
            arb_field_path().prop_map(|p| format!(".{p}")),
            arb_field_path().prop_map(|p| format!("{p}.")),
            (arb_field_path(), arb_field_path()).prop_map(|(a, b)| format!("{a}..{b}")),
        ]
    }

    /// A path made of fixture field names, valid or not for the Item schema.
    pub fn arb_item_path() -> impl Strategy<Value = String> {
        let heads = prop::sample::select(vec![
            "name", "price", "internalNote", "createdBy", "author", "tags", "meta", "bogus",
        ]);
        let tails = prop::option::of(prop::sample::select(vec![
            "name", "email", "company", "company.name", "color", "owner.name", "x",
        ]));
        (heads, tails).prop_map(|(head, tail)| match tail {
            Some(tail) => format!("{head}.{tail}"),
            None => head.to_string(),
        })
    }

    /// Caller extras drawn from [`arb_item_path`].
    pub fn arb_item_extras() -> impl Strategy<Value = Extras> {
        prop::collection::vec(arb_item_path(), 0..6).prop_map(Extras::from)
    }

    /// A valid policy for the fixture Item model.
    pub fn arb_item_policy() -> impl Strategy<Value = FieldPolicy> {
        let fields = || {
            prop::collection::vec(
                prop::sample::select(vec!["name", "price", "internalNote", "meta", "createdBy"]),
                0..3,
            )
        };
        (fields(), fields(), 1u32..200, prop::option::of(0u64..600), any::<bool>()).prop_filter_map(
            "policy must validate",
            |(common, secret, limit, cache, lean)| {
                let mut config = PolicyConfig::new("Item")
                    .with_common_fields(common)
                    .with_secret_fields(secret)
                    .with_limit(limit)
                    .with_lean(lean);
                config.cache = cache;
                config.build().ok()
            },
        )
    }

    /// A requested page size, including the invalid ones.
    pub fn arb_requested_limit() -> impl Strategy<Value = Option<i64>> {
        prop_oneof![
            Just(None),
            (i64::MIN..=0).prop_map(Some),
            (1i64..10_000).prop_map(Some),
        ]
    }

    /// Sort pairs with arbitrary numeric directions.
    pub fn arb_sort_pairs() -> impl Strategy<Value = Vec<(String, i64)>> {
        prop::collection::vec((arb_segment(), any::<i64>()), 0..4)
    }

    pub fn arb_sort_spec() -> impl Strategy<Value = SortSpec> {
        arb_sort_pairs().prop_map(SortSpec::from_directions)
    }

    /// An equality filter over a few scalar fields.
    pub fn arb_query() -> impl Strategy<Value = Query> {
        prop::collection::btree_map(arb_segment(), any::<i32>(), 0..4).prop_map(|conditions| {
            conditions
                .into_iter()
                .fold(Query::all(), |query, (field, value)| query.where_eq(field, value))
        })
    }

    /// A document id as the mock store would see it.
    pub fn arb_document_id() -> impl Strategy<Value = DocumentId> {
        prop_oneof![
            (1u64..100_000).prop_map(DocumentId::from),
            "[a-f0-9]{8,24}".prop_map(DocumentId::new),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use quarry_storage::Model;
    use serde_json::{json, Map, Value};
    use std::sync::Arc;
    use std::time::Duration;

    /// Item, Author and Company schemas. `Item.author` and `Author.company`
    /// are references; `Item.meta` is an embedded object.
    pub fn catalog() -> SchemaCatalog {
        SchemaCatalog::new()
            .with(
                ModelSchema::new("Item")
                    .field("name", FieldType::String)
                    .field("description", FieldType::String)
                    .field("price", FieldType::Number)
                    .field("internalNote", FieldType::String)
                    .field("createdBy", FieldType::String)
                    .field("tags", FieldType::list(FieldType::String))
                    .field("author", FieldType::reference("Author"))
                    .field(
                        "meta",
                        FieldType::object([
                            ("color", FieldType::String),
                            ("owner", FieldType::reference("Author")),
                        ]),
                    )
                    .text_index(["name", "description"]),
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

    /// The Item policy: `name` always selected, `internalNote` secret,
    /// `createdBy` read-only, page size 10.
    pub fn item_policy() -> FieldPolicy {
        FieldPolicy::builder("Item")
            .with_common_fields(["name"])
            .with_secret_fields(["internalNote", "__v"])
            .with_read_only_fields(["createdBy"])
            .with_limit(10)
            .build()
            .expect("fixture policy is valid")
    }

    /// Same as [`item_policy`] with a default cache TTL.
    pub fn cached_item_policy(ttl: Duration) -> FieldPolicy {
        FieldPolicy::builder("Item")
            .with_common_fields(["name"])
            .with_secret_fields(["internalNote", "__v"])
            .with_read_only_fields(["createdBy"])
            .with_limit(10)
            .with_cache(ttl)
            .build()
            .expect("fixture policy is valid")
    }

    /// A database seeded with one company, two authors and twelve items.
    ///
    /// Item `42` is the "red lamp" by author `a1`.
    pub fn seeded_database() -> MockDatabase {
        let db = MockDatabase::new(catalog());
        db.seed("Company", json!({"_id": "c1", "name": "Acme", "country": "NL"}))
            .expect("seed company");
        db.seed(
            "Author",
            json!({"_id": "a1", "name": "Ada", "email": "ada@example.com", "company": "c1"}),
        )
        .expect("seed author");
        db.seed(
            "Author",
            json!({"_id": "a2", "name": "Grace", "email": "grace@example.com", "company": "c1"}),
        )
        .expect("seed author");

        db.seed(
            "Item",
            json!({
                "_id": "42",
                "name": "red lamp",
                "description": "a lamp that is red",
                "price": 30,
                "internalNote": "supplier margin 40%",
                "createdBy": "u1",
                "tags": ["home", "light"],
                "author": "a1",
                "meta": {"color": "red", "owner": "a2"}
            }),
        )
        .expect("seed item");
        for n in 1..=11u64 {
            db.seed(
                "Item",
                json!({
                    "_id": n.to_string(),
                    "name": format!("item {n}"),
                    "description": if n % 2 == 0 { "lamp" } else { "chair" },
                    "price": n * 5,
                    "internalNote": "n/a",
                    "createdBy": "u1",
                    "author": if n % 2 == 0 { "a1" } else { "a2" }
                }),
            )
            .expect("seed item");
        }
        db
    }

    /// Item model over `db` without caching.
    pub fn item_model(db: &MockDatabase) -> Model<MockCollection> {
        Model::new(
            Arc::new(db.collection("Item").expect("Item is registered")),
            Arc::new(item_policy()),
        )
    }

    /// Item model over `db` caching in `cache` with a default TTL.
    pub fn cached_item_model(
        db: &MockDatabase,
        cache: Arc<InMemoryCache>,
        ttl: Duration,
    ) -> Model<MockCollection> {
        Model::new(
            Arc::new(db.collection("Item").expect("Item is registered")),
            Arc::new(cached_item_policy(ttl)),
        )
        .with_cache(cache)
    }

    /// JSON object literal to a field map.
    pub fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected a JSON object, got {other}"),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for Quarry-specific validation.

    use super::*;
    use quarry_core::{Classification, PopulateTree};

    /// Assert that a QuarryResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &QuarryResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a QuarryResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &QuarryResult<T>) {
        match result {
            Err(QuarryError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a policy build failed on `field`.
    #[track_caller]
    pub fn assert_invalid_field<T: std::fmt::Debug>(result: &Result<T, ConfigError>, field: &str) {
        match result {
            Err(ConfigError::InvalidValue { field: f, .. }) => {
                assert_eq!(f, field, "Wrong field in InvalidValue error");
            }
            other => panic!("Expected InvalidValue for {field}, got: {:?}", other),
        }
    }

    /// Assert the cleared patterns, ignoring order.
    #[track_caller]
    pub fn assert_patterns(actual: &[String], expected: &[&str]) {
        let mut actual: Vec<&str> = actual.iter().map(String::as_str).collect();
        let mut expected = expected.to_vec();
        actual.sort_unstable();
        expected.sort_unstable();
        assert_eq!(actual, expected, "cleared patterns differ");
    }

    /// Assert the selection, compared as a sorted list.
    #[track_caller]
    pub fn assert_selection(classification: &Classification, expected: &[&str]) {
        let mut expected = expected.to_vec();
        expected.sort_unstable();
        assert_eq!(classification.selection.sorted(), expected);
    }

    /// Assert that every populate node hangs off a selected field.
    #[track_caller]
    pub fn assert_populate_rooted(classification: &Classification) {
        for node in classification.populate.nodes() {
            let head = node.path.split('.').next().unwrap_or_default();
            assert!(
                classification.selection.contains(head),
                "populate path {} is not under a selected field",
                node.path
            );
        }
    }

    /// Assert that a populate tree has exactly the given top-level paths.
    #[track_caller]
    pub fn assert_populate_paths(populate: &PopulateTree, expected: &[&str]) {
        let paths: Vec<&str> = populate.iter().map(|(path, _)| path).collect();
        assert_eq!(paths, expected);
    }

    /// Assert that no field of `document`, at any depth, is named `field`.
    #[track_caller]
    pub fn assert_field_absent(document: &Document, field: &str) {
        fn contains(value: &serde_json::Value, field: &str) -> bool {
            match value {
                serde_json::Value::Object(map) => {
                    map.contains_key(field) || map.values().any(|v| contains(v, field))
                }
                serde_json::Value::Array(items) => items.iter().any(|v| contains(v, field)),
                _ => false,
            }
        }
        assert!(
            !contains(&document.to_value(), field),
            "field {field} present in document {}",
            document.id
        );
    }
}
