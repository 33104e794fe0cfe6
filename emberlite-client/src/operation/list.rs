// src/operation/list.rs

use serde_json::{json, Value};

use super::{command_document, validate_database_name, CursorReply, Operation, ReadOperation};
use crate::binding::ServerBinding;
use crate::error::{Error, Result};

/// Names of the collections in one database.
#[derive(Debug, Clone)]
pub struct ListCollectionsOperation {
    database: String,
}

impl ListCollectionsOperation {
    pub fn new(database: impl Into<String>) -> Result<Self> {
        let database = database.into();
        validate_database_name(&database)?;
        Ok(ListCollectionsOperation { database })
    }
}

impl Operation for ListCollectionsOperation {
    type Output = Vec<String>;

    const NAME: &'static str = "listCollections";

    fn execute(&self, binding: &ServerBinding) -> Result<Vec<String>> {
        let reply = binding.command(&self.database, &command_document(json!({ "listCollections": 1 }))?)?;
        // The listing always fits in the first batch.
        let cursor = CursorReply::parse(Self::NAME, &reply, "firstBatch")?;
        Ok(names(Self::NAME, cursor.documents.iter().map(|d| d.get("name")))?)
    }
}

impl ReadOperation for ListCollectionsOperation {}

/// Names of every database holding data.
#[derive(Debug, Clone, Default)]
pub struct ListDatabasesOperation;

impl Operation for ListDatabasesOperation {
    type Output = Vec<String>;

    const NAME: &'static str = "listDatabases";

    fn execute(&self, binding: &ServerBinding) -> Result<Vec<String>> {
        let reply = binding.command("admin", &command_document(json!({ "listDatabases": 1 }))?)?;
        let databases = reply.get("databases").and_then(Value::as_array).ok_or_else(|| {
            Error::UnexpectedReply { command: Self::NAME, reason: "missing 'databases'".to_string() }
        })?;
        names(Self::NAME, databases.iter().map(|d| d.get("name")))
    }
}

impl ReadOperation for ListDatabasesOperation {}

fn names<'a>(command: &'static str, values: impl Iterator<Item = Option<&'a Value>>) -> Result<Vec<String>> {
    values
        .map(|v| {
            v.and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::UnexpectedReply { command, reason: "entry without a name".to_string() })
        })
        .collect()
}
