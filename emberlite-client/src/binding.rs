// src/binding.rs
// Per-operation access to the embedded server, released exactly once

use emberlite_core::{Connection, ConnectionId, Document};

use crate::error::Result;
use crate::executor::OperationExecutor;
use crate::server::EmbeddedServer;

/// Scoped access to the engine for one operation.
///
/// Created only by [`OperationExecutor`]. `release` consumes the binding, so a
/// second release cannot be written; if the binding is dropped without being
/// released (early return, panic), `Drop` releases it.
pub struct ServerBinding {
    server: EmbeddedServer,
    connection: Option<Connection>,
    id: ConnectionId,
}

impl ServerBinding {
    pub(crate) fn acquire(server: &EmbeddedServer) -> Result<Self> {
        let connection = server.bind()?;
        let id = connection.id();
        tracing::debug!(binding = id, "binding acquired");
        Ok(ServerBinding { server: server.clone(), connection: Some(connection), id })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Run one command against database `db` through this binding.
    pub fn command(&self, db: &str, command: &Document) -> Result<Document> {
        match &self.connection {
            Some(connection) => Ok(connection.command(db, command)?),
            None => unreachable!("binding used after release"),
        }
    }

    /// Executor over the same server, for work that outlives this binding
    /// (cursor fetches). Each call it makes acquires its own binding.
    pub fn executor(&self) -> OperationExecutor {
        OperationExecutor::new(self.server.clone())
    }

    pub(crate) fn release(mut self) -> Result<()> {
        self.release_connection()
    }

    fn release_connection(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(connection) => {
                let result = self.server.release(connection);
                tracing::debug!(binding = self.id, ok = result.is_ok(), "binding released");
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for ServerBinding {
    fn drop(&mut self) {
        if self.connection.is_some() {
            if let Err(e) = self.release_connection() {
                tracing::error!(binding = self.id, error = %e, "failed to release dropped binding");
            }
        }
    }
}

impl std::fmt::Debug for ServerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBinding")
            .field("id", &self.id)
            .field("released", &self.connection.is_none())
            .finish()
    }
}
