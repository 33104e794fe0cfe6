// src/database.rs

use emberlite_core::Document;

use crate::codec::CodecRegistry;
use crate::collection::Collection;
use crate::error::Result;
use crate::executor::OperationExecutor;
use crate::operation::{
    validate_database_name, CommandReadOperation, DropDatabaseOperation, ListCollectionsOperation, Namespace,
};

/// Handle to one database. Holds no server state of its own.
#[derive(Debug, Clone)]
pub struct Database {
    name: String,
    executor: OperationExecutor,
    codec: CodecRegistry,
}

impl Database {
    pub(crate) fn new(name: &str, executor: OperationExecutor, codec: CodecRegistry) -> Result<Self> {
        validate_database_name(name)?;
        Ok(Database { name: name.to_string(), executor, codec })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Typed collection handle; `T` defaults to [`Document`].
    pub fn collection<T>(&self, name: &str) -> Result<Collection<T>> {
        let namespace = Namespace::new(self.name.as_str(), name)?;
        Ok(Collection::new(namespace, self.executor.clone(), self.codec.clone()))
    }

    /// Run a command document against this database and return the raw reply.
    pub fn run_command(&self, command: Document) -> Result<Document> {
        self.executor.execute_read(CommandReadOperation::new(self.name.as_str(), command)?)
    }

    pub fn drop(&self) -> Result<()> {
        self.executor.execute_write(DropDatabaseOperation::new(self.name.as_str())?)
    }

    pub fn list_collection_names(&self) -> Result<Vec<String>> {
        self.executor.execute_read(ListCollectionsOperation::new(self.name.as_str())?)
    }
}
