// src/engine.rs
// The in-process engine instance: lifecycle, connection table and server cursors

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::commands;
use crate::document::Document;
use crate::error::{EngineError, Result};
use crate::options::ServerOptions;
use crate::storage::StorageEngine;

pub type ConnectionId = u64;
pub type CursorId = i64;

/// Result set parked between `getMore` calls.
#[derive(Debug)]
pub(crate) struct ServerCursor {
    pub namespace: String,
    pub remaining: VecDeque<Document>,
    pub last_used: Instant,
}

#[derive(Debug, Default)]
pub(crate) struct OpCounters {
    pub insert: AtomicU64,
    pub query: AtomicU64,
    pub getmore: AtomicU64,
    pub command: AtomicU64,
}

/// What one `pump` tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub cursors_reaped: usize,
    pub journal_synced: bool,
}

/// Embedded engine instance. Shared behind an `Arc`; every method is safe to
/// call from several threads at once.
pub struct EmbeddedEngine {
    options: ServerOptions,
    pub(crate) storage: RwLock<StorageEngine>,
    connections: DashMap<ConnectionId, Instant>,
    pub(crate) cursors: DashMap<CursorId, ServerCursor>,
    next_connection_id: AtomicU64,
    next_cursor_id: AtomicI64,
    total_connections: AtomicU64,
    pub(crate) counters: OpCounters,
    started_at: DateTime<Utc>,
    closed: AtomicBool,
}

impl EmbeddedEngine {
    /// Start an engine from parsed startup options.
    pub fn create(options: ServerOptions) -> Result<Arc<Self>> {
        let storage = StorageEngine::open(&options)?;
        tracing::info!(
            dbpath = ?options.dbpath,
            durable = storage.is_durable(),
            batch_size = options.batch_size,
            "embedded engine started"
        );

        Ok(Arc::new(EmbeddedEngine {
            options,
            storage: RwLock::new(storage),
            connections: DashMap::new(),
            cursors: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
            next_cursor_id: AtomicI64::new(1),
            total_connections: AtomicU64::new(0),
            counters: OpCounters::default(),
            started_at: Utc::now(),
            closed: AtomicBool::new(false),
        }))
    }

    /// Parse `args` (e.g. `--dbpath=/tmp/db`) and start an engine.
    pub fn from_args<I, S>(args: I) -> Result<Arc<Self>>
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString> + Clone,
    {
        Self::create(ServerOptions::from_args(args)?)
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(EngineError::ShutdownInProgress)
        } else {
            Ok(())
        }
    }

    /// Register a new connection.
    pub fn open_connection(self: &Arc<Self>) -> Result<Connection> {
        self.ensure_open()?;

        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(id, Instant::now());
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(connection = id, "connection opened");

        Ok(Connection { id, engine: Arc::clone(self) })
    }

    pub fn open_connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn total_connection_count(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn open_cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub(crate) fn next_cursor_id(&self) -> CursorId {
        self.next_cursor_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Maintenance tick: reap idle cursors and sync the journal.
    pub fn pump(&self) -> Result<PumpStats> {
        self.ensure_open()?;

        let timeout = self.options.cursor_timeout();
        let before = self.cursors.len();
        self.cursors.retain(|_, cursor| cursor.last_used.elapsed() < timeout);
        let cursors_reaped = before.saturating_sub(self.cursors.len());

        let journal_synced = self.storage.write().flush()?;

        if cursors_reaped > 0 {
            tracing::debug!(cursors_reaped, "pump reaped idle cursors");
        }
        Ok(PumpStats { cursors_reaped, journal_synced })
    }

    /// Shut the engine down. A second call is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let open_connections = self.connections.len();
        let open_cursors = self.cursors.len();
        self.cursors.clear();
        self.connections.clear();

        let flushed = self.storage.write().flush();
        tracing::info!(open_connections, open_cursors, "embedded engine closed");
        flushed.map(|_| ())
    }
}

/// One registered connection. `close` is the release primitive.
pub struct Connection {
    id: ConnectionId,
    engine: Arc<EmbeddedEngine>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Run one command against database `db`.
    pub fn command(&self, db: &str, command: &Document) -> Result<Document> {
        self.engine.ensure_open()?;
        if !self.engine.connections.contains_key(&self.id) {
            return Err(EngineError::UnknownConnection(self.id));
        }
        commands::run(&self.engine, self.id, db, command)
    }

    /// Deregister the connection.
    pub fn close(self) -> Result<()> {
        match self.engine.connections.remove(&self.id) {
            Some(_) => {
                tracing::trace!(connection = self.id, "connection closed");
                Ok(())
            }
            None if self.engine.is_closed() => Err(EngineError::ShutdownInProgress),
            None => Err(EngineError::UnknownConnection(self.id)),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}
