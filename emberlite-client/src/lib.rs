// emberlite-client/src/lib.rs
// Client access layer over the embedded Emberlite engine

pub mod error;
pub mod server;
pub mod binding;
pub mod executor;
pub mod operation;
pub mod cursor;
pub mod iterator;
pub mod codec;
pub mod client;
pub mod database;
pub mod collection;

// Public exports
pub use error::{Error, Result};
pub use server::{BindingStats, EmbeddedServer};
pub use binding::ServerBinding;
pub use executor::OperationExecutor;
pub use operation::{Namespace, Operation, ReadOperation, WriteOperation};
pub use cursor::{BatchCursor, CommandBatchCursor};
pub use iterator::ResultIterator;
pub use codec::CodecRegistry;
pub use client::Client;
pub use database::Database;
pub use collection::{AggregateIterable, Collection, InsertOneResult};

pub use emberlite_core::{Document, ServerOptions};
