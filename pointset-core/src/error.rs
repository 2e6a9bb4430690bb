//! Error types for pointset

use thiserror::Error;

/// Main error type for pointset operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

/// Result type alias for pointset operations
pub type Result<T> = std::result::Result<T, Error>;
