//! Per-branch matrix collections for one model fit.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;
use tracing::{debug, instrument};

use crate::domain::arena::PhyloTree;
use crate::domain::branch::BranchId;
use crate::domain::category::MatrixCategory;
use crate::domain::classify::{check_square, MatrixClassifier};
use crate::domain::error::{DomainError, DomainResult};

/// Transition probability matrices of one fit, keyed by branch.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPsubs {
    pub source: String,
    psubs: BTreeMap<BranchId, Array2<f64>>,
}

impl ModelPsubs {
    pub fn new(source: impl Into<String>, psubs: BTreeMap<BranchId, Array2<f64>>) -> Self {
        Self {
            source: source.into(),
            psubs,
        }
    }

    pub fn get(&self, branch: &BranchId) -> Option<&Array2<f64>> {
        self.psubs.get(branch)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BranchId, &Array2<f64>)> {
        self.psubs.iter()
    }

    pub fn len(&self) -> usize {
        self.psubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.psubs.is_empty()
    }

    /// Shared state-space size; every matrix must be square and the same size.
    pub fn alphabet_size(&self) -> DomainResult<usize> {
        let mut expected = None;
        for (branch, p) in &self.psubs {
            let n = check_square(&p.view(), &branch.to_string())?;
            match expected {
                None => expected = Some(n),
                Some(e) if e != n => {
                    return Err(DomainError::SizeMismatch {
                        branch: branch.to_string(),
                        expected: e,
                        found: n,
                    })
                }
                Some(_) => {}
            }
        }
        expected.ok_or_else(|| DomainError::EmptyMatrix("<no branches>".to_string()))
    }

    /// Fails unless the keys are exactly the tree's edges and all matrices agree in shape.
    pub fn validate_against(&self, tree: &PhyloTree) -> DomainResult<()> {
        check_keys(self.psubs.keys(), tree)?;
        self.alphabet_size()?;
        Ok(())
    }
}

/// Category of every branch of one fit. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMatrixCategories {
    pub source: String,
    mcats: BTreeMap<BranchId, MatrixCategory>,
}

impl ModelMatrixCategories {
    pub fn new(source: impl Into<String>, mcats: BTreeMap<BranchId, MatrixCategory>) -> Self {
        Self {
            source: source.into(),
            mcats,
        }
    }

    pub fn get(&self, branch: &BranchId) -> Option<MatrixCategory> {
        self.mcats.get(branch).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BranchId, MatrixCategory)> {
        self.mcats.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.mcats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mcats.is_empty()
    }

    /// Branches carrying `category`.
    pub fn branches_with(&self, category: MatrixCategory) -> BTreeSet<BranchId> {
        self.iter()
            .filter(|&(_, c)| c == category)
            .map(|(b, _)| b.clone())
            .collect()
    }

    /// Everything that is not DLC, for reporting.
    pub fn non_dlc(&self) -> BTreeMap<BranchId, MatrixCategory> {
        self.iter()
            .filter(|&(_, c)| c != MatrixCategory::Dlc)
            .map(|(b, c)| (b.clone(), c))
            .collect()
    }

    pub fn counts(&self) -> BTreeMap<MatrixCategory, usize> {
        let mut counts = BTreeMap::new();
        for (_, category) in self.iter() {
            *counts.entry(category).or_insert(0) += 1;
        }
        counts
    }

    pub fn validate_against(&self, tree: &PhyloTree) -> DomainResult<()> {
        check_keys(self.mcats.keys(), tree)
    }
}

fn check_keys<'a>(keys: impl Iterator<Item = &'a BranchId>, tree: &PhyloTree) -> DomainResult<()> {
    let edges: BTreeSet<BranchId> = tree.edges().into_iter().collect();
    let keys: BTreeSet<&BranchId> = keys.collect();
    if let Some(extra) = keys.iter().find(|k| !edges.contains(**k)) {
        return Err(DomainError::UnknownBranch((*extra).clone()));
    }
    if let Some(missing) = edges.iter().find(|e| !keys.contains(e)) {
        return Err(DomainError::MissingBranch(missing.clone()));
    }
    Ok(())
}

/// Labels every matrix of a fit; the source tag is carried over.
#[instrument(level = "debug", skip_all, fields(source = %psubs.source))]
pub fn classify_all(
    psubs: &ModelPsubs,
    classifier: &MatrixClassifier,
) -> DomainResult<ModelMatrixCategories> {
    let mut mcats = BTreeMap::new();
    for (branch, p) in psubs.iter() {
        let category = classifier.classify_view(p.view(), &branch.to_string())?;
        mcats.insert(branch.clone(), category);
    }
    let result = ModelMatrixCategories::new(psubs.source.clone(), mcats);
    debug!("category counts: {:?}", result.counts());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::newick::parse_newick;
    use ndarray::array;

    fn dlc() -> Array2<f64> {
        array![[0.9, 0.1], [0.2, 0.8]]
    }

    fn psubs_for(tree: &PhyloTree) -> BTreeMap<BranchId, Array2<f64>> {
        tree.edges().into_iter().map(|b| (b, dlc())).collect()
    }

    #[test]
    fn given_matching_keys_when_validating_then_ok() {
        let tree = parse_newick("((A,B)X,(C,D)Y)root;").unwrap();
        let psubs = ModelPsubs::new("fit", psubs_for(&tree));
        assert!(psubs.validate_against(&tree).is_ok());
        assert_eq!(psubs.alphabet_size().unwrap(), 2);
    }

    #[test]
    fn given_missing_branch_when_validating_then_names_it() {
        let tree = parse_newick("((A,B)X,(C,D)Y)root;").unwrap();
        let mut map = psubs_for(&tree);
        map.remove(&BranchId::new("C", "Y"));
        let err = ModelPsubs::new("fit", map).validate_against(&tree).unwrap_err();
        assert_eq!(err, DomainError::MissingBranch(BranchId::new("C", "Y")));
    }

    #[test]
    fn given_extra_branch_when_validating_then_unknown() {
        let tree = parse_newick("((A,B)X,(C,D)Y)root;").unwrap();
        let mut map = psubs_for(&tree);
        map.insert(BranchId::new("A", "C"), dlc());
        let err = ModelPsubs::new("fit", map).validate_against(&tree).unwrap_err();
        assert_eq!(err, DomainError::UnknownBranch(BranchId::new("A", "C")));
    }

    #[test]
    fn given_mixed_sizes_when_validating_then_size_mismatch() {
        let tree = parse_newick("(A,B,C);").unwrap();
        let mut map = psubs_for(&tree);
        map.insert(BranchId::new("C", "root"), Array2::eye(3));
        let err = ModelPsubs::new("fit", map).validate_against(&tree).unwrap_err();
        assert!(matches!(err, DomainError::SizeMismatch { expected: 2, found: 3, .. }));
    }

    #[test]
    fn given_psubs_when_classifying_all_then_source_and_labels_kept() {
        let tree = parse_newick("(A,B,C);").unwrap();
        let mut map = psubs_for(&tree);
        map.insert(BranchId::new("B", "root"), Array2::eye(2));
        let mcats = classify_all(&ModelPsubs::new("foo", map), &MatrixClassifier::default()).unwrap();
        assert_eq!(mcats.source, "foo");
        assert_eq!(mcats.len(), 3);
        assert_eq!(
            mcats.get(&BranchId::new("root", "B")),
            Some(MatrixCategory::Identity)
        );
        assert_eq!(mcats.non_dlc().len(), 1);
        assert_eq!(mcats.counts()[&MatrixCategory::Dlc], 2);
        assert!(mcats.validate_against(&tree).is_ok());
    }
}
