// src/operation/drop.rs

use serde_json::{json, Value};

use super::{command_document, validate_database_name, Namespace, Operation, WriteOperation};
use crate::binding::ServerBinding;
use crate::error::Result;

/// Drop a whole database. Dropping a missing database succeeds.
#[derive(Debug, Clone)]
pub struct DropDatabaseOperation {
    database: String,
}

impl DropDatabaseOperation {
    pub fn new(database: impl Into<String>) -> Result<Self> {
        let database = database.into();
        validate_database_name(&database)?;
        Ok(DropDatabaseOperation { database })
    }
}

impl Operation for DropDatabaseOperation {
    type Output = ();

    const NAME: &'static str = "dropDatabase";

    fn execute(&self, binding: &ServerBinding) -> Result<()> {
        binding.command(&self.database, &command_document(json!({ "dropDatabase": 1 }))?)?;
        Ok(())
    }
}

impl WriteOperation for DropDatabaseOperation {}

/// Drop one collection; yields whether it existed.
#[derive(Debug, Clone)]
pub struct DropCollectionOperation {
    namespace: Namespace,
}

impl DropCollectionOperation {
    pub fn new(namespace: Namespace) -> Self {
        DropCollectionOperation { namespace }
    }
}

impl Operation for DropCollectionOperation {
    type Output = bool;

    const NAME: &'static str = "drop";

    fn execute(&self, binding: &ServerBinding) -> Result<bool> {
        let command = command_document(json!({ "drop": self.namespace.collection() }))?;
        let reply = binding.command(self.namespace.database(), &command)?;
        Ok(reply.get("dropped").and_then(Value::as_bool).unwrap_or(false))
    }
}

impl WriteOperation for DropCollectionOperation {}
