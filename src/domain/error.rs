//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::branch::BranchId;

/// Domain errors represent precondition violations and numerical failures.
/// These are independent of file and terminal concerns.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("matrix for branch {branch} is not square: {rows}x{cols}")]
    NotSquare {
        branch: String,
        rows: usize,
        cols: usize,
    },

    #[error("matrix for branch {0} is empty")]
    EmptyMatrix(String),

    #[error("matrix for branch {branch} has {found} states, expected {expected}")]
    SizeMismatch {
        branch: String,
        expected: usize,
        found: usize,
    },

    #[error("no matrix for branch {0}")]
    MissingBranch(BranchId),

    #[error("branch {0} is not an edge of the tree")]
    UnknownBranch(BranchId),

    #[error("node not found in tree: {0}")]
    UnknownNode(String),

    #[error("duplicate node name in tree: {0}")]
    DuplicateNode(String),

    #[error("invalid tree: {0}")]
    InvalidTree(String),

    #[error("newick parse error at offset {position}: {message}")]
    NewickParse { position: usize, message: String },

    #[error("cannot reroot at tip: {0}")]
    RerootAtTip(String),

    #[error("stationary distribution undetermined for branch {branch}: singular system")]
    Singular { branch: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
