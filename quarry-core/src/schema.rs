//! Schema declarations and the introspection capability the classifier needs.
//!
//! Storage collaborators describe their documents through [`SchemaIntrospect`].
//! [`ModelSchema`] and [`SchemaCatalog`] are a ready-made declaration format
//! for collaborators that do not carry their own schema metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::path::{is_valid_path, PATH_SEPARATOR};
use crate::{ID_FIELD, VERSION_KEY};

/// Schema introspection supplied by the storage collaborator.
pub trait SchemaIntrospect: Send + Sync {
    /// Whether `path` names a field of this schema.
    fn field_exists(&self, path: &str) -> bool;

    /// Whether `path` names a reference (foreign-key-like) field.
    fn is_reference(&self, path: &str) -> bool;

    /// Schema of the documents a reference field points to, when known.
    fn referenced_schema(&self, _path: &str) -> Option<Box<dyn SchemaIntrospect + '_>> {
        None
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    /// Reference to a document of another model.
    Ref { target: String },
    /// Homogeneous list. A list of references is itself a reference field.
    List { items: Box<FieldType> },
    /// Embedded sub-document.
    Object {
        #[serde(default)]
        fields: BTreeMap<String, FieldType>,
    },
}

impl FieldType {
    /// Shorthand for a reference to `target`.
    pub fn reference(target: impl Into<String>) -> Self {
        Self::Ref {
            target: target.into(),
        }
    }

    /// Shorthand for a list of `items`.
    pub fn list(items: FieldType) -> Self {
        Self::List {
            items: Box::new(items),
        }
    }

    /// Shorthand for an embedded object.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldType)>,
        K: Into<String>,
    {
        Self::Object {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Target model when this field is a reference or a list of references.
    pub fn reference_target(&self) -> Option<&str> {
        match self {
            Self::Ref { target } => Some(target),
            Self::List { items } => items.reference_target(),
            _ => None,
        }
    }

    /// Embedded fields reachable through this field, if it can be descended.
    fn nested_fields(&self) -> Option<&BTreeMap<String, FieldType>> {
        match self {
            Self::Object { fields } => Some(fields),
            Self::List { items } => items.nested_fields(),
            _ => None,
        }
    }
}

/// Declared fields of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
    /// Fields covered by the full-text index.
    #[serde(default)]
    pub text_index: Vec<String>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            text_index: Vec::new(),
        }
    }

    /// Add a field declaration.
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    /// Declare the fields covered by the full-text index.
    pub fn text_index<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_index = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve a dotted path to its declared type.
    ///
    /// Resolution descends through embedded objects and lists of objects. It
    /// never crosses a reference: `"author.name"` does not resolve when
    /// `author` is a reference, because `name` belongs to another model.
    pub fn resolve(&self, path: &str) -> Option<&FieldType> {
        if !is_valid_path(path) {
            return None;
        }
        let mut fields = &self.fields;
        let mut segments = path.split(PATH_SEPARATOR).peekable();
        while let Some(segment) = segments.next() {
            let field_type = fields.get(segment)?;
            if segments.peek().is_none() {
                return Some(field_type);
            }
            fields = field_type.nested_fields()?;
        }
        None
    }

    fn is_implicit(path: &str) -> bool {
        path == ID_FIELD || path == VERSION_KEY
    }
}

impl SchemaIntrospect for ModelSchema {
    fn field_exists(&self, path: &str) -> bool {
        Self::is_implicit(path) || self.resolve(path).is_some()
    }

    fn is_reference(&self, path: &str) -> bool {
        self.resolve(path)
            .and_then(FieldType::reference_target)
            .is_some()
    }
}

/// A set of model schemas whose references can be followed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    #[serde(default)]
    models: BTreeMap<String, ModelSchema>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog from JSON of the form `{"models": {"Item": {...}}}`.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Register a model, replacing any previous schema of the same name.
    pub fn register(&mut self, schema: ModelSchema) -> &mut Self {
        self.models.insert(schema.name.clone(), schema);
        self
    }

    /// Builder-style variant of [`SchemaCatalog::register`].
    pub fn with(mut self, schema: ModelSchema) -> Self {
        self.register(schema);
        self
    }

    pub fn get(&self, model: &str) -> Option<&ModelSchema> {
        self.models.get(model)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Introspection view of one model that can follow references.
    pub fn view<'a>(&'a self, model: &str) -> Option<SchemaView<'a>> {
        self.models.get(model).map(|schema| SchemaView {
            catalog: self,
            schema,
        })
    }
}

/// One model of a [`SchemaCatalog`], seen through [`SchemaIntrospect`].
#[derive(Debug, Clone, Copy)]
pub struct SchemaView<'a> {
    catalog: &'a SchemaCatalog,
    schema: &'a ModelSchema,
}

impl<'a> SchemaView<'a> {
    pub fn schema(&self) -> &'a ModelSchema {
        self.schema
    }
}

impl SchemaIntrospect for SchemaView<'_> {
    fn field_exists(&self, path: &str) -> bool {
        self.schema.field_exists(path)
    }

    fn is_reference(&self, path: &str) -> bool {
        self.schema.is_reference(path)
    }

    fn referenced_schema(&self, path: &str) -> Option<Box<dyn SchemaIntrospect + '_>> {
        let target = self.schema.resolve(path)?.reference_target()?;
        let view = self.catalog.view(target)?;
        Some(Box::new(view))
    }
}
