// src/operation/count.rs

use emberlite_core::Document;
use serde_json::json;

use super::{command_document, reply_u64, Namespace, Operation, ReadOperation};
use crate::binding::ServerBinding;
use crate::error::Result;

/// Count documents, optionally only those matching a filter.
#[derive(Debug, Clone)]
pub struct CountOperation {
    namespace: Namespace,
    filter: Option<Document>,
}

impl CountOperation {
    pub fn new(namespace: Namespace) -> Self {
        CountOperation { namespace, filter: None }
    }

    pub fn with_filter(namespace: Namespace, filter: Document) -> Self {
        CountOperation { namespace, filter: Some(filter) }
    }
}

impl Operation for CountOperation {
    type Output = u64;

    const NAME: &'static str = "count";

    fn execute(&self, binding: &ServerBinding) -> Result<u64> {
        let mut command = command_document(json!({ "count": self.namespace.collection() }))?;
        if let Some(filter) = &self.filter {
            command.insert("query", filter.clone().into_value());
        }

        let reply = binding.command(self.namespace.database(), &command)?;
        reply_u64(Self::NAME, &reply, "n")
    }
}

impl ReadOperation for CountOperation {}
