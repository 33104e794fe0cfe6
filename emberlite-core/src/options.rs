// src/options.rs
// Engine startup options, parsed from the argument list handed to `create`

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Default number of documents per cursor batch.
pub const DEFAULT_BATCH_SIZE: usize = 101;

/// Default idle time before `pump` reaps an open cursor.
pub const DEFAULT_CURSOR_TIMEOUT_SECS: u64 = 600;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "emberlite", about = "Embedded Emberlite engine options", no_binary_name = true)]
pub struct ServerOptions {
    /// Directory holding the journal. In-memory only when unset.
    #[arg(long, env = "EMBERLITE_DBPATH")]
    pub dbpath: Option<PathBuf>,

    /// Documents per batch when a command does not ask for a size.
    #[arg(long, env = "EMBERLITE_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Idle seconds before an open cursor is reaped by `pump`.
    #[arg(long, env = "EMBERLITE_CURSOR_TIMEOUT_SECS", default_value_t = DEFAULT_CURSOR_TIMEOUT_SECS)]
    pub cursor_timeout_secs: u64,

    /// Keep data in memory even when `--dbpath` is set.
    #[arg(long, env = "EMBERLITE_NO_JOURNAL")]
    pub no_journal: bool,
}

impl ServerOptions {
    /// Parse startup arguments such as `["--dbpath=/tmp/db"]`.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString> + Clone,
    {
        let options = ServerOptions::try_parse_from(args)
            .map_err(|e| EngineError::InvalidArgument(e.to_string().trim().to_string()))?;

        if options.batch_size == 0 {
            return Err(EngineError::InvalidArgument("--batch-size must be positive".to_string()));
        }
        Ok(options)
    }

    pub fn cursor_timeout(&self) -> Duration {
        Duration::from_secs(self.cursor_timeout_secs)
    }

    /// Journal location, if durability is enabled.
    pub fn journal_path(&self) -> Option<PathBuf> {
        match (&self.dbpath, self.no_journal) {
            (Some(dir), false) => Some(dir.join("journal.emj")),
            _ => None,
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            dbpath: None,
            batch_size: DEFAULT_BATCH_SIZE,
            cursor_timeout_secs: DEFAULT_CURSOR_TIMEOUT_SECS,
            no_journal: false,
        }
    }
}
