// src/error.rs
use emberlite_core::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Reported by the embedded engine while running a command.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Embedded server has been closed")]
    ServerClosed,

    #[error("Cursor exhausted: no more results")]
    CursorExhausted,

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Unexpected reply to '{command}': {reason}")]
    UnexpectedReply { command: &'static str, reason: String },
}

impl Error {
    /// Engine error code, when the failure came from the engine.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Engine(e) => Some(e.code()),
            _ => None,
        }
    }

    /// True when the server (or the engine under it) is shut down.
    pub fn is_server_closed(&self) -> bool {
        matches!(self, Error::ServerClosed | Error::Engine(EngineError::ShutdownInProgress))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
