//! Error types for the IVF-Flat index

use thiserror::Error;

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IvfError>;

/// Error types that can occur while building, mutating, searching or persisting an index
#[derive(Error, Debug)]
pub enum IvfError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Insufficient data: need at least {required} training vectors, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Corrupt data: {0}")]
    CorruptData(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Resource error: {0}")]
    ResourceError(String),
}

impl IvfError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        IvfError::InvalidParameter(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        IvfError::CorruptData(msg.into())
    }
}
