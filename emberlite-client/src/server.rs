// src/server.rs
// Process-wide handle to the one embedded engine a client owns

use emberlite_core::{Connection, EmbeddedEngine, PumpStats, ServerOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Snapshot of binding acquisition/release counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingStats {
    pub acquired: u64,
    /// Release attempts, successful or not.
    pub released: u64,
    pub release_failures: u64,
}

impl BindingStats {
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

#[derive(Default)]
struct BindingCounters {
    acquired: AtomicU64,
    released: AtomicU64,
    release_failures: AtomicU64,
}

struct ServerInner {
    engine: Arc<EmbeddedEngine>,
    bindings: BindingCounters,
}

/// Cheap to clone; every clone refers to the same engine instance.
#[derive(Clone)]
pub struct EmbeddedServer {
    inner: Arc<ServerInner>,
}

impl EmbeddedServer {
    /// Start the engine from a startup argument list, e.g. `["--dbpath=/tmp/db"]`.
    pub fn create<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        let options = ServerOptions::from_args(&args)?;
        Self::with_options(options)
    }

    pub fn with_options(options: ServerOptions) -> Result<Self> {
        let engine = EmbeddedEngine::create(options)?;
        Ok(EmbeddedServer {
            inner: Arc::new(ServerInner { engine, bindings: BindingCounters::default() }),
        })
    }

    pub fn options(&self) -> &ServerOptions {
        self.inner.engine.options()
    }

    /// Caller-driven maintenance tick.
    pub fn pump(&self) -> Result<PumpStats> {
        if self.is_closed() {
            return Err(Error::ServerClosed);
        }
        Ok(self.inner.engine.pump()?)
    }

    /// Shut the engine down. Bindings still outstanding fail to release.
    pub fn close(&self) -> Result<()> {
        let outstanding = self.binding_stats().outstanding();
        if outstanding > 0 {
            tracing::warn!(outstanding, "closing embedded server with bindings still held");
        }
        Ok(self.inner.engine.close()?)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.engine.is_closed()
    }

    /// Counters are read release-side first, so a snapshot taken while other
    /// threads run never shows more releases than acquisitions.
    pub fn binding_stats(&self) -> BindingStats {
        let counters = &self.inner.bindings;
        let release_failures = counters.release_failures.load(Ordering::Acquire);
        let released = counters.released.load(Ordering::Acquire);
        let acquired = counters.acquired.load(Ordering::Acquire);
        BindingStats { acquired, released, release_failures }
    }

    /// Open cursors held by the engine.
    pub fn open_cursor_count(&self) -> usize {
        self.inner.engine.open_cursor_count()
    }

    /// The binding-acquisition primitive. Only `binding` calls this.
    pub(crate) fn bind(&self) -> Result<Connection> {
        if self.is_closed() {
            return Err(Error::ServerClosed);
        }
        let connection = self.inner.engine.open_connection()?;
        self.inner.bindings.acquired.fetch_add(1, Ordering::AcqRel);
        Ok(connection)
    }

    /// The release primitive, paired with `bind`.
    pub(crate) fn release(&self, connection: Connection) -> Result<()> {
        let result = connection.close();
        let counters = &self.inner.bindings;
        if result.is_err() {
            counters.release_failures.fetch_add(1, Ordering::AcqRel);
        }
        counters.released.fetch_add(1, Ordering::AcqRel);
        Ok(result?)
    }
}

impl std::fmt::Debug for EmbeddedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedServer")
            .field("closed", &self.is_closed())
            .field("bindings", &self.binding_stats())
            .finish()
    }
}
