// src/codec.rs
// serde-based conversion between user types and engine documents

use emberlite_core::Document;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Encodes `T: Serialize` into documents and decodes documents into
/// `T: DeserializeOwned`. Any serde type that serializes to a JSON object
/// can be stored.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    generate_ids: bool,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        CodecRegistry { generate_ids: true }
    }
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// When disabled, inserted documents without `_id` get one from the engine
    /// instead of the client, and the id is not reported back.
    pub fn generate_ids(mut self, generate_ids: bool) -> Self {
        self.generate_ids = generate_ids;
        self
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Document> {
        let value = serde_json::to_value(value)?;
        if !value.is_object() {
            return Err(Error::InvalidDocument(format!("expected an object, got {}", json_kind(&value))));
        }
        Ok(Document::from_value(value)?)
    }

    pub fn encode_for_insert<T: Serialize + ?Sized>(&self, value: &T) -> Result<Document> {
        let mut document = self.encode(value)?;
        if self.generate_ids {
            document.ensure_id();
        }
        Ok(document)
    }

    pub fn decode<T: DeserializeOwned>(&self, document: Document) -> Result<T> {
        Ok(serde_json::from_value(document.into_value())?)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: u32,
    }

    #[test]
    fn test_encode_struct() {
        let codec = CodecRegistry::new();
        let doc = codec.encode(&Person { name: "Ada".into(), age: 36 }).unwrap();
        assert_eq!(doc.get("name"), Some(&json!("Ada")));
        assert!(doc.id().is_none());
    }

    #[test]
    fn test_encode_for_insert_adds_id_first() {
        let codec = CodecRegistry::new();
        let doc = codec.encode_for_insert(&json!({"x": 1})).unwrap();
        assert_eq!(doc.first_key(), Some("_id"));

        let kept = codec.encode_for_insert(&json!({"_id": 7, "x": 1})).unwrap();
        assert_eq!(kept.id(), Some(&json!(7)));

        let plain = CodecRegistry::new().generate_ids(false);
        assert!(plain.encode_for_insert(&json!({"x": 1})).unwrap().id().is_none());
    }

    #[test]
    fn test_encode_rejects_non_objects() {
        let codec = CodecRegistry::new();
        assert!(matches!(codec.encode(&42), Err(Error::InvalidDocument(_))));
        assert!(matches!(codec.encode(&vec![1, 2]), Err(Error::InvalidDocument(_))));
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let codec = CodecRegistry::new();
        let doc = Document::from_value(json!({"_id": 1, "name": "Ada", "age": 36})).unwrap();
        let person: Person = codec.decode(doc).unwrap();
        assert_eq!(person, Person { name: "Ada".into(), age: 36 });

        let bad = Document::from_value(json!({"name": "Ada"})).unwrap();
        assert!(matches!(codec.decode::<Person>(bad), Err(Error::Codec(_))));
    }
}
