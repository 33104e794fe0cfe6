// src/operation/command.rs

use emberlite_core::Document;

use super::{validate_database_name, Operation, ReadOperation};
use crate::binding::ServerBinding;
use crate::error::{Error, Result};

/// Run an arbitrary command document and return the reply as is.
#[derive(Debug, Clone)]
pub struct CommandReadOperation {
    database: String,
    command: Document,
}

impl CommandReadOperation {
    pub fn new(database: impl Into<String>, command: Document) -> Result<Self> {
        let database = database.into();
        validate_database_name(&database)?;
        if command.is_empty() {
            return Err(Error::InvalidDocument("command document is empty".to_string()));
        }
        Ok(CommandReadOperation { database, command })
    }
}

impl Operation for CommandReadOperation {
    type Output = Document;

    const NAME: &'static str = "command";

    fn execute(&self, binding: &ServerBinding) -> Result<Document> {
        binding.command(&self.database, &self.command)
    }
}

impl ReadOperation for CommandReadOperation {}
