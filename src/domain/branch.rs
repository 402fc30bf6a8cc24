//! Branch identity: an unordered pair of adjacent node names.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifies a branch by its two endpoint names.
///
/// Endpoints are stored sorted, so `BranchId::new("A", "X") == BranchId::new("X", "A")`.
/// Adjacency, not direction, defines a branch; the id survives rerooting
/// as long as node names are preserved.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchId {
    low: String,
    high: String,
}

impl BranchId {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// Both endpoint names, sorted.
    pub fn nodes(&self) -> (&str, &str) {
        (&self.low, &self.high)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.low, self.high)
    }
}

impl Serialize for BranchId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [&self.low, &self.high].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BranchId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [a, b] = <[String; 2]>::deserialize(deserializer)?;
        Ok(Self::new(a, b))
    }
}
