// src/operation/mod.rs
// Immutable descriptors of one unit of work each

mod aggregate;
mod command;
mod count;
mod cursor_ops;
mod drop;
mod insert;
mod list;

use emberlite_core::{CursorId, Document};
use serde_json::Value;
use std::fmt;

use crate::binding::ServerBinding;
use crate::error::{Error, Result};

pub use aggregate::AggregateOperation;
pub use command::CommandReadOperation;
pub use count::CountOperation;
pub use cursor_ops::{GetMoreOperation, KillCursorsOperation};
pub use drop::{DropCollectionOperation, DropDatabaseOperation};
pub use insert::{InsertOperation, InsertSummary};
pub use list::{ListCollectionsOperation, ListDatabasesOperation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperationKind {
    Read,
    Write,
}

/// One unit of work, run against a binding acquired for that call only.
///
/// Implement [`ReadOperation`] or [`WriteOperation`] as well: the executor
/// only accepts operations through one of the two.
pub trait Operation {
    type Output;

    const NAME: &'static str;

    fn execute(&self, binding: &ServerBinding) -> Result<Self::Output>;
}

/// Operations that leave stored data untouched. Run with
/// [`OperationExecutor::execute_read`](crate::OperationExecutor::execute_read).
pub trait ReadOperation: Operation {}

/// Operations that change stored data or server state. Run with
/// [`OperationExecutor::execute_write`](crate::OperationExecutor::execute_write).
pub trait WriteOperation: Operation {}

/// `database.collection`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Result<Self> {
        let database = database.into();
        let collection = collection.into();
        validate_database_name(&database)?;
        if collection.is_empty() || collection.starts_with('.') || collection.contains(['$', '\0']) {
            return Err(Error::InvalidNamespace(format!("invalid collection name '{}'", collection)));
        }
        Ok(Namespace { database, collection })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

pub(crate) fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['.', ' ', '$', '/', '\\', '\0']) {
        return Err(Error::InvalidNamespace(format!("invalid database name '{}'", name)));
    }
    Ok(())
}

/// `{ cursor: { id, ns, firstBatch | nextBatch } }`
#[derive(Debug, Clone, PartialEq)]
pub struct CursorReply {
    pub id: CursorId,
    pub documents: Vec<Document>,
}

impl CursorReply {
    pub(crate) fn parse(command: &'static str, reply: &Document, batch_field: &str) -> Result<Self> {
        let bad = |reason: String| Error::UnexpectedReply { command, reason };

        let cursor = reply
            .get("cursor")
            .and_then(Value::as_object)
            .ok_or_else(|| bad("missing 'cursor' document".to_string()))?;
        let id = cursor
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| bad("missing cursor id".to_string()))?;
        let documents = cursor
            .get(batch_field)
            .and_then(Value::as_array)
            .ok_or_else(|| bad(format!("missing '{}'", batch_field)))?
            .iter()
            .cloned()
            .map(|v| Document::from_value(v).map_err(Error::from))
            .collect::<Result<Vec<_>>>()?;

        Ok(CursorReply { id, documents })
    }
}

/// Integer field from a reply, e.g. `n`.
pub(crate) fn reply_u64(command: &'static str, reply: &Document, field: &str) -> Result<u64> {
    reply
        .get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::UnexpectedReply { command, reason: format!("missing '{}'", field) })
}

pub(crate) fn command_document(value: Value) -> Result<Document> {
    Ok(Document::from_value(value)?)
}
