//! Tree-wide identifiability from per-branch matrix categories.
//!
//! A fit is identifiable when no branch is a chainsaw (nor an identity in
//! strict mode) and every internal node reaches at least one tip through DLC
//! branches only. Nodes of degree two are rooting artifacts and never need a
//! path of their own.
//!
//! Two formulations of the path test are provided and must agree:
//! [`PathStrategy::PathUnion`] breaks every tip-to-root path at
//! path-breaking branches and merges the surviving runs into components;
//! [`PathStrategy::Rerooting`] reroots at each internal node and searches
//! downward through DLC branches for a tip.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use generational_arena::Index;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::arena::PhyloTree;
use crate::domain::branch::BranchId;
use crate::domain::category::MatrixCategory;
use crate::domain::error::DomainResult;
use crate::domain::notice::Notice;
use crate::domain::psubs::ModelMatrixCategories;

/// Why a fit was found non-identifiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentCause {
    /// A chainsaw (or, in strict mode, an identity) matrix is present.
    BadMatrix,
    /// Some internal node has no DLC path to a tip.
    BadPath,
}

impl fmt::Display for IdentCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentCause::BadMatrix => f.write_str("bad_matrix"),
            IdentCause::BadPath => f.write_str("bad_path"),
        }
    }
}

/// Which formulation of the path test to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathStrategy {
    #[default]
    PathUnion,
    Rerooting,
}

impl FromStr for PathStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path-union" => Ok(PathStrategy::PathUnion),
            "rerooting" => Ok(PathStrategy::Rerooting),
            other => Err(format!("unknown path strategy: {other}")),
        }
    }
}

/// Outcome of an identifiability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentCheckRes {
    pub source: String,
    pub identifiable: bool,
    pub strict: bool,
    /// Nodes implicated in non-identifiability; `None` when identifiable.
    pub bad_nodes: Option<BTreeSet<String>>,
    pub cause: Option<IdentCause>,
    #[serde(default)]
    pub notices: Vec<Notice>,
}

/// Runs the two-phase identifiability check.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifiabilityChecker {
    strict: bool,
    strategy: PathStrategy,
}

impl IdentifiabilityChecker {
    /// `strict` makes identity matrices fatal instead of DLC-equivalent.
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            strategy: PathStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: PathStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    #[instrument(level = "debug", skip_all, fields(source = %mcats.source, strict = self.strict))]
    pub fn check(&self, mcats: &ModelMatrixCategories, tree: &PhyloTree) -> DomainResult<IdentCheckRes> {
        mcats.validate_against(tree)?;

        let mut notices = Vec::new();
        let identities = mcats.branches_with(MatrixCategory::Identity);
        if !self.strict && !identities.is_empty() {
            let notice = Notice::IdentityTreatedAsDlc {
                branches: identities.iter().cloned().collect(),
            };
            warn!("{}", notice);
            notices.push(notice);
        }
        let limits = mcats.branches_with(MatrixCategory::Limit);
        if !limits.is_empty() {
            let notice = Notice::LimitPresent {
                branches: limits.into_iter().collect(),
            };
            warn!("{}", notice);
            notices.push(notice);
        }

        let result = |identifiable: bool,
                      bad_nodes: Option<BTreeSet<String>>,
                      cause: Option<IdentCause>,
                      notices: Vec<Notice>| {
            IdentCheckRes {
                source: mcats.source.clone(),
                identifiable,
                strict: self.strict,
                bad_nodes,
                cause,
                notices,
            }
        };

        // Phase 1: forbidden categories
        let mut fatal = mcats.branches_with(MatrixCategory::Chainsaw);
        if self.strict {
            fatal.extend(identities);
        }
        if !fatal.is_empty() {
            let nodes = fatal
                .iter()
                .map(|branch| tree.child_endpoint(branch).map(|idx| tree.name(idx).to_string()))
                .collect::<DomainResult<BTreeSet<_>>>()?;
            debug!("bad matrices on {} branches", fatal.len());
            return Ok(result(false, Some(nodes), Some(IdentCause::BadMatrix), notices));
        }

        let breaking: BTreeSet<BranchId> = mcats
            .iter()
            .filter(|(_, c)| c.breaks_path())
            .map(|(b, _)| b.clone())
            .collect();
        if breaking.is_empty() {
            return Ok(result(true, None, None, notices));
        }

        // Phase 2: path connectivity
        let bad = match self.strategy {
            PathStrategy::PathUnion => path_union_bad_nodes(tree, &breaking)?,
            PathStrategy::Rerooting => rerooting_bad_nodes(tree, &breaking)?,
        };
        debug!("{} path-breaking branches, {} bad nodes", breaking.len(), bad.len());
        if bad.is_empty() {
            Ok(result(true, None, None, notices))
        } else {
            Ok(result(false, Some(bad), Some(IdentCause::BadPath), notices))
        }
    }
}

/// Checks `mcats` against `tree` with the default path strategy.
pub fn check_identifiability(
    mcats: &ModelMatrixCategories,
    tree: &PhyloTree,
    strict: bool,
) -> DomainResult<IdentCheckRes> {
    IdentifiabilityChecker::new(strict).check(mcats, tree)
}

/// Internal nodes that must reach a tip: degree two nodes are exempt.
fn required_nodes(tree: &PhyloTree) -> Vec<Index> {
    tree.internal_nodes()
        .into_iter()
        .filter(|&idx| tree.degree(idx) >= 3)
        .collect()
}

/// Node names from each tip towards the root, in tip order.
///
/// Each path stops at the first node already covered by an earlier path
/// (that node is kept, so the paths stay connected).
pub fn trav_tip_to_root(tree: &PhyloTree) -> Vec<Vec<String>> {
    let mut visited: HashSet<Index> = HashSet::new();
    let mut traversed = Vec::new();
    for tip in tree.tips() {
        let mut path = vec![tip];
        for ancestor in tree.ancestors(tip) {
            path.push(ancestor);
            if visited.contains(&ancestor) {
                break;
            }
        }
        visited.extend(path.iter().copied());
        traversed.push(path.into_iter().map(|idx| tree.name(idx).to_string()).collect());
    }
    traversed
}

/// Splits a tip-to-root path into runs linked by DLC branches.
///
/// `breakers` holds the nodes whose branch to their parent breaks paths:
/// such a node closes the current run and the next run starts above it.
/// Runs of a single node link nothing and are dropped.
pub fn break_path(path: &[String], breakers: &HashSet<String>) -> Vec<BTreeSet<String>> {
    let mut runs = Vec::new();
    let mut linked = BTreeSet::new();
    for node in path {
        if breakers.contains(node) {
            if !linked.is_empty() {
                linked.insert(node.clone());
                runs.push(std::mem::take(&mut linked));
            }
        } else {
            linked.insert(node.clone());
        }
    }
    if linked.len() > 1 {
        runs.push(linked);
    }
    runs
}

/// Unions runs that share a node, keeping components in order of first appearance.
pub fn merge_runs(runs: Vec<BTreeSet<String>>) -> Vec<BTreeSet<String>> {
    let mut components: Vec<BTreeSet<String>> = Vec::new();
    for run in runs {
        let overlapping: Vec<usize> = components
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_disjoint(&run))
            .map(|(i, _)| i)
            .collect();
        match overlapping.split_first() {
            None => components.push(run),
            Some((&first, rest)) => {
                for &i in rest.iter().rev() {
                    let absorbed = components.remove(i);
                    components[first].extend(absorbed);
                }
                components[first].extend(run);
            }
        }
    }
    components
}

/// Nodes of `nodes` not covered by any component that contains a tip.
pub fn find_bad_nodes(
    components: &[BTreeSet<String>],
    tips: &BTreeSet<String>,
    nodes: &BTreeSet<String>,
) -> BTreeSet<String> {
    let good: BTreeSet<&String> = components
        .iter()
        .filter(|c| !c.is_disjoint(tips))
        .flatten()
        .collect();
    nodes.iter().filter(|n| !good.contains(n)).cloned().collect()
}

/// Bad nodes by breaking tip-to-root paths and merging the runs.
#[instrument(level = "debug", skip_all)]
pub fn path_union_bad_nodes(
    tree: &PhyloTree,
    breaking: &BTreeSet<BranchId>,
) -> DomainResult<BTreeSet<String>> {
    // one non-DLC branch cannot isolate an internal node from every tip
    if breaking.len() < 2 {
        return Ok(BTreeSet::new());
    }
    let breakers = breaking
        .iter()
        .map(|b| tree.child_endpoint(b).map(|idx| tree.name(idx).to_string()))
        .collect::<DomainResult<HashSet<_>>>()?;
    let tips: BTreeSet<String> = tree.tip_names().into_iter().collect();
    let nodes: BTreeSet<String> = required_nodes(tree)
        .into_iter()
        .map(|idx| tree.name(idx).to_string())
        .collect();

    let runs: Vec<BTreeSet<String>> = trav_tip_to_root(tree)
        .iter()
        .flat_map(|path| break_path(path, &breakers))
        .collect();
    let components = merge_runs(runs);
    Ok(find_bad_nodes(&components, &tips, &nodes))
}

/// Depth-first descent from `node` through non-breaking branches.
///
/// Returns true once a tip is reached; every node on the successful descent
/// is appended to `linked`, deepest first.
pub fn cherry_picker(
    tree: &PhyloTree,
    node: Index,
    breaking: &BTreeSet<BranchId>,
    linked: &mut Vec<String>,
) -> bool {
    // (node, index of the next child to try)
    let mut stack: Vec<(Index, usize)> = vec![(node, 0)];
    while let Some(top) = stack.last_mut() {
        let (current, next) = *top;
        top.1 += 1;
        let Some(&child) = tree.children(current).get(next) else {
            stack.pop();
            continue;
        };
        let branch = BranchId::new(tree.name(child), tree.name(current));
        if breaking.contains(&branch) {
            continue;
        }
        if tree.is_tip(child) {
            linked.extend(stack.iter().rev().map(|&(n, _)| tree.name(n).to_string()));
            return true;
        }
        stack.push((child, 0));
    }
    false
}

/// Bad nodes by rerooting at every internal node and searching for a DLC descent.
#[instrument(level = "debug", skip_all)]
pub fn rerooting_bad_nodes(
    tree: &PhyloTree,
    breaking: &BTreeSet<BranchId>,
) -> DomainResult<BTreeSet<String>> {
    let mut fine: HashSet<String> = HashSet::new();
    let mut bad = BTreeSet::new();
    for idx in required_nodes(tree) {
        let name = tree.name(idx).to_string();
        if fine.contains(&name) {
            continue;
        }
        let mut rerooted = tree.clone();
        rerooted.reroot(&name)?;
        let mut linked = Vec::new();
        if cherry_picker(&rerooted, rerooted.node_index(&name)?, breaking, &mut linked) {
            fine.extend(linked);
        } else {
            bad.insert(name);
        }
    }
    Ok(bad)
}
