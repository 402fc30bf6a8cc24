//! Matrix categories produced by the classifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of substitution-matrix categories.
///
/// Exactly one category is assigned per matrix. Serialized as the plain
/// lowercase string (`"DLC"` keeps its conventional capitalisation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatrixCategory {
    #[serde(rename = "identity")]
    Identity,
    #[serde(rename = "limit")]
    Limit,
    #[serde(rename = "DLC")]
    Dlc,
    #[serde(rename = "chainsaw")]
    Chainsaw,
    #[serde(rename = "sympathetic")]
    Sympathetic,
}

impl MatrixCategory {
    pub const ALL: [MatrixCategory; 5] = [
        MatrixCategory::Identity,
        MatrixCategory::Limit,
        MatrixCategory::Dlc,
        MatrixCategory::Chainsaw,
        MatrixCategory::Sympathetic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatrixCategory::Identity => "identity",
            MatrixCategory::Limit => "limit",
            MatrixCategory::Dlc => "DLC",
            MatrixCategory::Chainsaw => "chainsaw",
            MatrixCategory::Sympathetic => "sympathetic",
        }
    }

    /// Categories that break a DLC path between two nodes.
    pub fn breaks_path(&self) -> bool {
        matches!(self, MatrixCategory::Sympathetic | MatrixCategory::Limit)
    }
}

impl fmt::Display for MatrixCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatrixCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MatrixCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown matrix category: {s}"))
    }
}
