//! Error types for the validator

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Validator error type.
///
/// Only structural failures surface here. Rule violations are issues, not errors.
#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Dataset root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Dataset root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Failed to read directory {}: {source}", path.display())]
    Traversal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Task error: {0}")]
    Task(String),
}

impl From<toml::de::Error> for ValidatorError {
    fn from(err: toml::de::Error) -> Self {
        ValidatorError::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ValidatorError {
    fn from(err: tokio::task::JoinError) -> Self {
        ValidatorError::Task(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ValidatorError>;
