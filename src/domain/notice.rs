//! Advisory notices returned alongside results instead of side-channel warnings.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::domain::branch::BranchId;

/// Non-fatal, informational findings. Computation continues regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Non-strict mode folded identity matrices into DLC.
    IdentityTreatedAsDlc { branches: Vec<BranchId> },
    /// Some matrices reached their limit distribution.
    LimitPresent { branches: Vec<BranchId> },
    /// A per-branch diagnostic could not be computed.
    StationaryUndetermined { branch: BranchId, reason: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::IdentityTreatedAsDlc { branches } => write!(
                f,
                "identity matrices treated as DLC, topology may be unidentifiable: {}",
                branches.iter().join(", ")
            ),
            Notice::LimitPresent { branches } => {
                write!(f, "fit contains limit matrices: {}", branches.iter().join(", "))
            }
            Notice::StationaryUndetermined { branch, reason } => {
                write!(f, "no stationary distribution for {branch}: {reason}")
            }
        }
    }
}
