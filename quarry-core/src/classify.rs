//! Field classification: from requested dotted paths to a projection and a
//! populate tree.
//!
//! The classifier merges the policy's common fields with the caller's extras,
//! strips secret fields, drops paths the schema does not know, and stops each
//! path at its first reference boundary. Whatever follows the boundary becomes
//! the child selection of a [`PopulateNode`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::path::{is_same_or_nested, walk_prefixes};
use crate::policy::FieldPolicy;
use crate::schema::SchemaIntrospect;

/// Extra fields requested by a caller: a single path or a list of paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ExtrasRepr", into = "Vec<String>")]
pub struct Extras(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtrasRepr {
    One(String),
    Many(Vec<String>),
}

impl From<ExtrasRepr> for Extras {
    fn from(repr: ExtrasRepr) -> Self {
        match repr {
            ExtrasRepr::One(path) => Self(vec![path]),
            ExtrasRepr::Many(paths) => Self(paths),
        }
    }
}

impl Extras {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Extras> for Vec<String> {
    fn from(extras: Extras) -> Self {
        extras.0
    }
}

impl From<&str> for Extras {
    fn from(path: &str) -> Self {
        Self(vec![path.to_string()])
    }
}

impl From<String> for Extras {
    fn from(path: String) -> Self {
        Self(vec![path])
    }
}

impl From<Vec<String>> for Extras {
    fn from(paths: Vec<String>) -> Self {
        Self(paths)
    }
}

impl From<&[&str]> for Extras {
    fn from(paths: &[&str]) -> Self {
        Self(paths.iter().map(|p| p.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Extras {
    fn from(paths: [&str; N]) -> Self {
        Self(paths.iter().map(|p| p.to_string()).collect())
    }
}

impl<T: Into<Extras>> From<Option<T>> for Extras {
    fn from(extras: Option<T>) -> Self {
        extras.map(Into::into).unwrap_or_default()
    }
}

/// Ordered set of top-level field names to project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(Vec<String>);

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, keeping the first position of duplicates.
    /// Returns false when the field was already selected.
    pub fn insert(&mut self, field: impl Into<String>) -> bool {
        let field = field.into();
        if self.contains(&field) {
            return false;
        }
        self.0.push(field);
        true
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|f| f == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The fields sorted by name, for order-independent comparisons.
    pub fn sorted(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.iter().collect();
        fields.sort_unstable();
        fields
    }
}

impl<S: Into<String>> FromIterator<S> for Selection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut selection = Selection::new();
        for field in iter {
            selection.insert(field);
        }
        selection
    }
}

/// Expansion instruction for one reference field.
///
/// An empty `select` expands the referenced document with all its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulateNode {
    pub path: String,
    #[serde(default)]
    pub select: BTreeMap<String, bool>,
    #[serde(default)]
    pub children: BTreeMap<String, PopulateNode>,
}

impl PopulateNode {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            select: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    /// Fields of the referenced document to keep.
    pub fn selected(&self) -> impl Iterator<Item = &str> {
        self.select
            .iter()
            .filter(|(_, included)| **included)
            .map(|(field, _)| field.as_str())
    }

    /// Fold another node for the same path into this one.
    pub fn merge(&mut self, other: PopulateNode) {
        self.select.extend(other.select);
        for (name, child) in other.children {
            match self.children.get_mut(&name) {
                Some(existing) => existing.merge(child),
                None => {
                    self.children.insert(name, child);
                }
            }
        }
    }
}

/// Populate instructions keyed by reference path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PopulateTree(BTreeMap<String, PopulateNode>);

impl PopulateTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&PopulateNode> {
        self.0.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PopulateNode)> {
        self.0.iter().map(|(path, node)| (path.as_str(), node))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PopulateNode> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert `node`, merging it into an existing node for the same path.
    pub fn merge_node(&mut self, node: PopulateNode) {
        match self.0.get_mut(&node.path) {
            Some(existing) => existing.merge(node),
            None => {
                self.0.insert(node.path.clone(), node);
            }
        }
    }
}

/// Output of the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub selection: Selection,
    pub populate: PopulateTree,
}

/// Resolves requested paths against a schema under a field policy.
#[derive(Debug, Clone, Copy)]
pub struct FieldClassifier<'a> {
    common_fields: &'a [String],
    secret_fields: &'a [String],
}

impl<'a> FieldClassifier<'a> {
    pub fn new(common_fields: &'a [String], secret_fields: &'a [String]) -> Self {
        Self {
            common_fields,
            secret_fields,
        }
    }

    pub fn from_policy(policy: &'a FieldPolicy) -> Self {
        Self::new(policy.common_fields(), policy.secret_fields())
    }

    /// Whether `path` is a secret field or nested under one.
    pub fn is_secret(&self, path: &str) -> bool {
        self.secret_fields
            .iter()
            .any(|secret| is_same_or_nested(path, secret))
    }

    /// Common fields followed by the extras, with secrets removed.
    pub fn requested_paths<'e>(&self, extras: &'e Extras) -> Vec<&'e str>
    where
        'a: 'e,
    {
        self.common_fields
            .iter()
            .chain(extras.paths())
            .map(String::as_str)
            .filter(|path| !self.is_secret(path))
            .collect()
    }

    /// Classify the requested extras against `schema`.
    pub fn classify(&self, schema: &dyn SchemaIntrospect, extras: &Extras) -> Classification {
        let mut classification = Classification::default();
        for path in self.requested_paths(extras) {
            resolve_path(schema, path, &mut classification);
        }
        classification
    }
}

/// Resolve one path, committing to `out` only when the whole path resolves.
fn resolve_path(schema: &dyn SchemaIntrospect, path: &str, out: &mut Classification) -> bool {
    let walker = walk_prefixes(path);
    let mut boundary = None;
    for prefix in walker.clone() {
        if !schema.field_exists(prefix) {
            return false;
        }
        if schema.is_reference(prefix) {
            boundary = Some(prefix);
            break;
        }
    }

    let head = match walker.clone().next() {
        Some(head) => head,
        None => return false,
    };

    if let Some(reference) = boundary {
        let mut node = PopulateNode::new(reference);
        if let Some(rest) = walker.remainder_after(reference) {
            if !expand_remainder(schema, reference, rest, &mut node) {
                return false;
            }
        }
        out.populate.merge_node(node);
    }

    out.selection.insert(head);
    true
}

/// Turn the segments after a reference boundary into child selections.
fn expand_remainder(
    schema: &dyn SchemaIntrospect,
    reference: &str,
    rest: &str,
    node: &mut PopulateNode,
) -> bool {
    match schema.referenced_schema(reference) {
        Some(target) => {
            let mut nested = Classification::default();
            if !resolve_path(target.as_ref(), rest, &mut nested) {
                return false;
            }
            for field in nested.selection.iter() {
                node.select.insert(field.to_string(), true);
            }
            for child in nested.populate.0.into_values() {
                match node.children.get_mut(&child.path) {
                    Some(existing) => existing.merge(child),
                    None => {
                        node.children.insert(child.path.clone(), child);
                    }
                }
            }
            true
        }
        // Without the target schema a dotted remainder is projected verbatim.
        None => {
            node.select.insert(rest.to_string(), true);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, ModelSchema, SchemaCatalog};

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new()
            .with(
                ModelSchema::new("Item")
                    .field("name", FieldType::String)
                    .field("price", FieldType::Number)
                    .field("internalNote", FieldType::String)
                    .field("author", FieldType::reference("Author"))
                    .field("sponsor", FieldType::reference("Sponsor"))
                    .field(
                        "meta",
                        FieldType::object([
                            ("color", FieldType::String),
                            ("owner", FieldType::reference("Author")),
                        ]),
                    ),
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

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_common_fields_injected_and_secret_dropped() {
        let catalog = catalog();
        let schema = catalog.view("Item").unwrap();
        let common = strings(&["name"]);
        let secret = strings(&["internalNote"]);
        let classifier = FieldClassifier::new(&common, &secret);

        let out = classifier.classify(&schema, &Extras::from(["internalNote", "price"]));

        assert_eq!(out.selection.iter().collect::<Vec<_>>(), vec!["name", "price"]);
        assert!(out.populate.is_empty());
    }

    #[test]
    fn test_reference_path_builds_populate_node() {
        let catalog = catalog();
        let schema = catalog.view("Item").unwrap();
        let classifier = FieldClassifier::new(&[], &[]);

        let out = classifier.classify(&schema, &Extras::from("author.name"));

        assert!(out.selection.contains("author"));
        let node = out.populate.get("author").expect("author populated");
        assert_eq!(node.path, "author");
        assert_eq!(node.select.get("name"), Some(&true));
        assert!(node.children.is_empty());
    }

    #[test]
    fn test_reference_without_remainder_populates_everything() {
        let catalog = catalog();
        let schema = catalog.view("Item").unwrap();
        let classifier = FieldClassifier::new(&[], &[]);

        let out = classifier.classify(&schema, &Extras::from("author"));

        let node = out.populate.get("author").unwrap();
        assert!(node.select.is_empty());
    }

    #[test]
    fn test_same_reference_merges_child_selections() {
        let catalog = catalog();
        let schema = catalog.view("Item").unwrap();
        let classifier = FieldClassifier::new(&[], &[]);

        let out = classifier.classify(&schema, &Extras::from(["author.name", "author.email"]));

        assert_eq!(out.selection.len(), 1);
        assert_eq!(out.populate.len(), 1);
        let node = out.populate.get("author").unwrap();
        assert_eq!(node.selected().collect::<Vec<_>>(), vec!["email", "name"]);
    }

    #[test]
    fn test_unknown_paths_are_dropped() {
        let catalog = catalog();
        let schema = catalog.view("Item").unwrap();
        let classifier = FieldClassifier::new(&[], &[]);

        let out = classifier.classify(
            &schema,
            &Extras::from(["nope", "meta.missing", "", "price..x", "author.bogus"]),
        );

        assert!(out.selection.is_empty());
        assert!(out.populate.is_empty());
    }

    #[test]
    fn test_embedded_path_selects_top_level() {
        let catalog = catalog();
        let schema = catalog.view("Item").unwrap();
        let classifier = FieldClassifier::new(&[], &[]);

        let out = classifier.classify(&schema, &Extras::from(["meta.color", "meta.owner.name"]));

        assert_eq!(out.selection.iter().collect::<Vec<_>>(), vec!["meta"]);
        let node = out.populate.get("meta.owner").expect("nested reference populated");
        assert_eq!(node.select.get("name"), Some(&true));
    }

    #[test]
    fn test_chained_references_nest_one_level_per_boundary() {
        let catalog = catalog();
        let schema = catalog.view("Item").unwrap();
        let classifier = FieldClassifier::new(&[], &[]);

        let out = classifier.classify(&schema, &Extras::from("author.company.name"));

        let author = out.populate.get("author").unwrap();
        assert_eq!(author.select.get("company"), Some(&true));
        let company = author.children.get("company").expect("company chained");
        assert_eq!(company.path, "company");
        assert_eq!(company.select.get("name"), Some(&true));
    }

    #[test]
    fn test_unknown_target_keeps_remainder_verbatim() {
        let catalog = catalog();
        let schema = catalog.view("Item").unwrap();
        let classifier = FieldClassifier::new(&[], &[]);

        // Sponsor is not registered in the catalog.
        let out = classifier.classify(&schema, &Extras::from("sponsor.contact.email"));

        let node = out.populate.get("sponsor").unwrap();
        assert_eq!(node.select.get("contact.email"), Some(&true));
    }

    #[test]
    fn test_plain_schema_groups_single_remainder() {
        let schema = ModelSchema::new("Item").field("author", FieldType::reference("Author"));
        let classifier = FieldClassifier::new(&[], &[]);

        let out = classifier.classify(&schema, &Extras::from("author.name"));

        assert_eq!(out.populate.get("author").unwrap().select.get("name"), Some(&true));
    }

    #[test]
    fn test_secret_wins_over_common_and_nested_requests() {
        let catalog = catalog();
        let schema = catalog.view("Item").unwrap();
        let common = strings(&["name", "meta"]);
        let secret = strings(&["meta", "name"]);
        let classifier = FieldClassifier::new(&common, &secret);

        let out = classifier.classify(&schema, &Extras::from(["meta.color", "price"]));

        assert_eq!(out.selection.iter().collect::<Vec<_>>(), vec!["price"]);
    }

    #[test]
    fn test_selection_is_deduplicated_in_first_seen_order() {
        let catalog = catalog();
        let schema = catalog.view("Item").unwrap();
        let common = strings(&["price", "name"]);
        let classifier = FieldClassifier::new(&common, &[]);

        let out = classifier.classify(&schema, &Extras::from(["name", "price", "author.name"]));

        assert_eq!(
            out.selection.iter().collect::<Vec<_>>(),
            vec!["price", "name", "author"]
        );
    }

    #[test]
    fn test_extras_deserialize_one_or_many() {
        let one: Extras = serde_json::from_str("\"author.name\"").unwrap();
        assert_eq!(one.paths(), &["author.name".to_string()]);

        let many: Extras = serde_json::from_str("[\"a\", \"b\"]").unwrap();
        assert_eq!(many.paths().len(), 2);

        let none: Extras = Extras::from(None::<&str>);
        assert!(none.is_empty());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::schema::{FieldType, ModelSchema};
    use proptest::prelude::*;

    const FIELDS: [&str; 6] = ["name", "price", "secret", "owner", "notes", "tags"];

    fn schema() -> ModelSchema {
        FIELDS
            .iter()
            .fold(ModelSchema::new("Doc"), |schema, field| {
                let field_type = if *field == "owner" {
                    FieldType::reference("User")
                } else {
                    FieldType::object([("inner", FieldType::String)])
                };
                schema.field(*field, field_type)
            })
    }

    fn arb_field() -> impl Strategy<Value = String> {
        (prop::sample::select(FIELDS.to_vec()), prop::option::of("inner|name|x"))
            .prop_map(|(head, tail)| match tail {
                Some(tail) => format!("{head}.{tail}"),
                None => head.to_string(),
            })
    }

    fn arb_top_level() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(prop::sample::select(FIELDS.to_vec()), 0..4)
            .prop_map(|fields| fields.into_iter().map(String::from).collect())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// The selection never contains a secret field, whether it was
        /// requested or listed as common.
        #[test]
        fn prop_selection_excludes_secrets(
            extras in prop::collection::vec(arb_field(), 0..8),
            common in arb_top_level(),
            secret in arb_top_level(),
        ) {
            let schema = schema();
            let classifier = FieldClassifier::new(&common, &secret);
            let out = classifier.classify(&schema, &Extras::from(extras));

            for field in out.selection.iter() {
                prop_assert!(!secret.iter().any(|s| s == field), "secret {} selected", field);
            }
            for node in out.populate.nodes() {
                prop_assert!(!secret.iter().any(|s| s == &node.path));
            }
        }

        /// Every populate node hangs off a selected top-level field.
        #[test]
        fn prop_populate_paths_are_selected(
            extras in prop::collection::vec(arb_field(), 0..8),
        ) {
            let schema = schema();
            let classifier = FieldClassifier::new(&[], &[]);
            let out = classifier.classify(&schema, &Extras::from(extras));

            for node in out.populate.nodes() {
                let head = node.path.split('.').next().unwrap();
                prop_assert!(out.selection.contains(head));
            }
        }
    }
}
