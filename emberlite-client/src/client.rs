// src/client.rs
// Entry point: owns the embedded server for its whole lifetime

use emberlite_core::{PumpStats, ServerOptions};

use crate::codec::CodecRegistry;
use crate::database::Database;
use crate::error::Result;
use crate::executor::OperationExecutor;
use crate::operation::ListDatabasesOperation;
use crate::server::{BindingStats, EmbeddedServer};

/// Client over one embedded engine instance.
///
/// Created from a startup argument list and closed once with [`Client::close`].
/// Clones share the same engine.
#[derive(Debug, Clone)]
pub struct Client {
    executor: OperationExecutor,
    codec: CodecRegistry,
}

impl Client {
    /// # Example
    ///
    /// ```no_run
    /// let client = emberlite::Client::create(["--dbpath=/tmp/emberlite"])?;
    /// client.close()?;
    /// # Ok::<(), emberlite::Error>(())
    /// ```
    pub fn create<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::with_server(EmbeddedServer::create(args)?))
    }

    pub fn with_options(options: ServerOptions) -> Result<Self> {
        Ok(Self::with_server(EmbeddedServer::with_options(options)?))
    }

    fn with_server(server: EmbeddedServer) -> Self {
        tracing::info!(durable = server.options().journal_path().is_some(), "client created");
        Client { executor: OperationExecutor::new(server), codec: CodecRegistry::default() }
    }

    /// Replace the codec used by databases and collections obtained afterwards.
    pub fn with_codec(mut self, codec: CodecRegistry) -> Self {
        self.codec = codec;
        self
    }

    pub fn database(&self, name: &str) -> Result<Database> {
        Database::new(name, self.executor.clone(), self.codec.clone())
    }

    pub fn list_database_names(&self) -> Result<Vec<String>> {
        self.executor.execute_read(ListDatabasesOperation)
    }

    /// Maintenance tick: expires idle cursors and syncs the journal.
    /// Never runs on its own.
    pub fn pump(&self) -> Result<PumpStats> {
        self.executor.server().pump()
    }

    pub fn close(&self) -> Result<()> {
        self.executor.server().close()
    }

    pub fn is_closed(&self) -> bool {
        self.executor.server().is_closed()
    }

    pub fn executor(&self) -> &OperationExecutor {
        &self.executor
    }

    pub fn binding_stats(&self) -> BindingStats {
        self.executor.server().binding_stats()
    }
}
