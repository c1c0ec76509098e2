//! Persisted documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::path::PATH_SEPARATOR;
use crate::ID_FIELD;

/// Identifier of a persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read an id stored as a JSON string or unsigned integer.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) if !id.is_empty() => Some(Self(id.clone())),
            Value::Number(n) => n.as_u64().map(Self::from),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for DocumentId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// A document as stored by the backend: an id plus its JSON fields.
///
/// Populated references appear inline as nested objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, fields: Map<String, Value>) -> Self {
        let mut fields = fields;
        fields.remove(ID_FIELD);
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a document from a JSON object. Non-object values give an empty
    /// document.
    pub fn from_value(id: impl Into<DocumentId>, value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::new(id, fields),
            _ => Self::new(id, Map::new()),
        }
    }

    /// Top-level field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Value at a dotted path, descending through nested objects.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if path == ID_FIELD {
            return None;
        }
        lookup_in(&self.fields, path)
    }

    /// Set the value at a dotted path, creating or replacing intermediate
    /// objects as needed. Setting `_id` is ignored.
    pub fn set_path(&mut self, path: &str, value: Value) {
        if path == ID_FIELD {
            return;
        }
        set_in(&mut self.fields, path, value);
    }

    /// Remove the value at a dotted path, returning it.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        remove_in(&mut self.fields, path)
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    /// The document as one JSON object including `_id`.
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert(ID_FIELD.to_string(), Value::String(self.id.to_string()));
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

/// Value at a dotted `path` inside `map`.
pub fn lookup_in<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split(PATH_SEPARATOR);
    let first = segments.next()?;
    let mut current = map.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set `value` at a dotted `path` inside `map`.
pub fn set_in(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once(PATH_SEPARATOR) {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                set_in(inner, rest, value);
            }
        }
    }
}

/// Remove the value at a dotted `path` inside `map`.
pub fn remove_in(map: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match path.split_once(PATH_SEPARATOR) {
        None => map.remove(path),
        Some((head, rest)) => match map.get_mut(head)? {
            Value::Object(inner) => remove_in(inner, rest),
            _ => None,
        },
    }
}
