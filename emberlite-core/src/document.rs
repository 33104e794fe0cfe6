// src/document.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Engine-native document: an ordered JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Document(Map::new())
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Document(map)),
            other => Err(EngineError::BadValue(format!(
                "expected a document, found {}",
                type_name(&other)
            ))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The `_id` field, if present.
    pub fn id(&self) -> Option<&Value> {
        self.0.get("_id")
    }

    /// Assign a fresh object id unless the document already has one.
    pub fn ensure_id(&mut self) -> &Value {
        if !self.0.contains_key("_id") {
            // Keep `_id` first, the way stored documents read back.
            let mut map = Map::with_capacity(self.0.len() + 1);
            map.insert("_id".to_string(), new_object_id());
            map.extend(std::mem::take(&mut self.0));
            self.0 = map;
        }
        &self.0["_id"]
    }

    /// Canonical key used for `_id` uniqueness checks.
    pub fn id_key(&self) -> Option<String> {
        self.id().map(|id| id.to_string())
    }

    /// Field lookup; dotted paths walk into embedded documents.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// First key of the document; commands are dispatched on it.
    pub fn first_key(&self) -> Option<&str> {
        self.0.keys().next().map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Typed accessors used by command handlers.
    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::BadValue(format!("'{}' must be a string", key)))
    }

    pub fn get_document(&self, key: &str) -> Result<Option<Document>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Document::from_value(value.clone()).map(Some),
        }
    }

    pub fn get_array(&self, key: &str) -> Result<&Vec<Value>> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| EngineError::BadValue(format!("'{}' must be an array", key)))
    }

    /// Optional positive integer field, e.g. `batchSize`.
    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .or_else(|| value.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
                .map(|n| Some(n as usize))
                .ok_or_else(|| EngineError::BadValue(format!("'{}' must be a non-negative integer", key))),
        }
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Document(map)
    }
}

impl TryFrom<Value> for Document {
    type Error = EngineError;

    fn try_from(value: Value) -> Result<Self> {
        Document::from_value(value)
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Value);
    type IntoIter = serde_json::map::Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// New object id in extended-JSON form: `{"$oid": "<24 hex chars>"}`.
pub fn new_object_id() -> Value {
    let hex = Uuid::new_v4().simple().to_string();
    serde_json::json!({ "$oid": &hex[..24] })
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "double",
        Value::Number(_) => "long",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
