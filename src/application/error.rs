//! Application-level errors (wraps domain errors)

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::DomainError;

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("invalid fit file {path}: {message}")]
    InvalidFit { path: PathBuf, message: String },

    #[error("unknown branch label in fit: {0}")]
    UnknownEdge(String),

    #[error("branch given twice in fit: {0}")]
    DuplicateEdge(String),

    #[error("no fit files found under {0}")]
    NoFits(PathBuf),

    #[error("fits {first} and {second} would both be recorded to {target}")]
    RecordCollision {
        target: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
