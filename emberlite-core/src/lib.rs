// emberlite-core/src/lib.rs
// Pure Rust in-process document engine

pub mod error;
pub mod document;
pub mod query;
pub mod aggregation;
pub mod options;
pub mod storage;
pub mod engine;
mod commands;

// Public exports
pub use error::{EngineError, Result};
pub use document::Document;
pub use query::Query;
pub use aggregation::Pipeline;
pub use options::ServerOptions;
pub use storage::StorageEngine;
pub use engine::{Connection, ConnectionId, CursorId, EmbeddedEngine, PumpStats};
pub use commands::MAX_DOCUMENT_SIZE;
