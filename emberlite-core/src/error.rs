// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid startup argument: {0}")]
    InvalidArgument(String),

    #[error("Embedded engine has been shut down")]
    ShutdownInProgress,

    #[error("Unknown connection id {0}")]
    UnknownConnection(u64),

    #[error("Cursor {0} not found")]
    CursorNotFound(i64),

    #[error("No such command: '{0}'")]
    CommandNotFound(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Bad command: {0}")]
    BadValue(String),

    #[error("E11000 duplicate key error collection: {namespace} dup key: {{ _id: {key} }}")]
    DuplicateKey { namespace: String, key: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Aggregation error: {0}")]
    AggregationError(String),

    #[error("Journal corruption: {0}")]
    Corruption(String),
}

impl EngineError {
    /// Numeric code reported in failed command replies.
    pub fn code(&self) -> i32 {
        match self {
            EngineError::Io(_) => 1,
            EngineError::BadValue(_) | EngineError::Serialization(_) => 2,
            EngineError::InvalidArgument(_) => 2,
            EngineError::InvalidQuery(_) => 2,
            EngineError::CursorNotFound(_) => 43,
            EngineError::CommandNotFound(_) => 59,
            EngineError::InvalidNamespace(_) => 73,
            EngineError::ShutdownInProgress => 91,
            EngineError::UnknownConnection(_) => 6,
            EngineError::DuplicateKey { .. } => 11000,
            EngineError::AggregationError(_) => 40324,
            EngineError::Corruption(_) => 14,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
