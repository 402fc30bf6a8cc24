//! Domain layer: phylogenetic limits and identifiability
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod boundary;
pub mod branch;
pub mod category;
pub mod classify;
pub mod error;
pub mod identifiability;
pub mod newick;
pub mod notice;
pub mod psubs;
pub mod record;
pub mod stationary;

pub use arena::{NodeData, PhyloTree, TreeNode};
pub use boundary::{check_boundary, BoundaryChecker, BoundsViolation, ParamRule, ParamValue, Violation};
pub use branch::BranchId;
pub use category::MatrixCategory;
pub use classify::{classify, delta_col, MatrixClassifier, Tolerance};
pub use error::{DomainError, DomainResult};
pub use identifiability::{
    check_identifiability, IdentCause, IdentCheckRes, IdentifiabilityChecker, PathStrategy,
};
pub use newick::{parse_newick, MAX_NESTING};
pub use notice::Notice;
pub use psubs::{classify_all, ModelMatrixCategories, ModelPsubs};
pub use record::{PhyloLimitRec, RecordAssembler};
pub use stationary::stationary_distribution;
