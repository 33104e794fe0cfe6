// src/operation/insert.rs

use emberlite_core::Document;
use serde_json::{json, Value};

use super::{command_document, reply_u64, Namespace, Operation, WriteOperation};
use crate::binding::ServerBinding;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted_count: u64,
}

/// Insert already-encoded documents into one collection.
#[derive(Debug, Clone)]
pub struct InsertOperation {
    namespace: Namespace,
    documents: Vec<Document>,
}

impl InsertOperation {
    pub fn new(namespace: Namespace, documents: Vec<Document>) -> Result<Self> {
        if documents.is_empty() {
            return Err(Error::InvalidDocument("insert requires at least one document".to_string()));
        }
        Ok(InsertOperation { namespace, documents })
    }
}

impl Operation for InsertOperation {
    type Output = InsertSummary;

    const NAME: &'static str = "insert";

    fn execute(&self, binding: &ServerBinding) -> Result<InsertSummary> {
        let documents: Vec<Value> = self.documents.iter().cloned().map(Document::into_value).collect();
        let command = command_document(json!({
            "insert": self.namespace.collection(),
            "documents": documents,
        }))?;

        let reply = binding.command(self.namespace.database(), &command)?;
        Ok(InsertSummary { inserted_count: reply_u64(Self::NAME, &reply, "n")? })
    }
}

impl WriteOperation for InsertOperation {}
