//! Fit files: the serialized output of an external model fit.
//!
//! ```json
//! {
//!   "source": "brca1.fasta",
//!   "model_name": "GN",
//!   "tree": "((Human,Chimp)edge.0,Mouse,Rat);",
//!   "psubs": [{"edge": "Human", "matrix": [[...], ...]}, ...],
//!   "params": [{"par_name": "A/G", "edge": "Human", "init": 1.2, "lower": 1e-6, "upper": 200}]
//! }
//! ```
//!
//! A psub `edge` is either the child node of the branch or the node pair.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::application::error_ext::{IoResultExt, JsonResultExt};
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{parse_newick, BranchId, DomainError, ModelPsubs, ParamRule, PhyloTree};
use crate::infrastructure::traits::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeLabel {
    Child(String),
    Pair([String; 2]),
}

impl EdgeLabel {
    /// Resolves to the branch it names in `tree`.
    pub fn resolve(&self, tree: &PhyloTree) -> ApplicationResult<BranchId> {
        match self {
            EdgeLabel::Child(name) => {
                let idx = tree.node_index(name)?;
                tree.branch_to_parent(idx)
                    .ok_or_else(|| ApplicationError::UnknownEdge(name.clone()))
            }
            EdgeLabel::Pair([a, b]) => Ok(BranchId::new(a.as_str(), b.as_str())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsubEntry {
    pub edge: EdgeLabel,
    pub matrix: Vec<Vec<f64>>,
}

/// Raw fit document as read from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitInput {
    pub source: String,
    #[serde(default)]
    pub model_name: Option<String>,
    pub tree: String,
    pub psubs: Vec<PsubEntry>,
    #[serde(default)]
    pub params: Vec<ParamRule>,
}

/// A fit resolved into domain types.
#[derive(Debug, Clone)]
pub struct Fit {
    pub source: String,
    pub model_name: Option<String>,
    pub tree: PhyloTree,
    pub psubs: ModelPsubs,
    pub params: Vec<ParamRule>,
}

fn to_array(rows: &[Vec<f64>], branch: &BranchId) -> ApplicationResult<Array2<f64>> {
    let n = rows.len();
    let m = rows.first().map(Vec::len).unwrap_or(0);
    if let Some(bad) = rows.iter().find(|r| r.len() != m) {
        return Err(DomainError::NotSquare {
            branch: branch.to_string(),
            rows: n,
            cols: bad.len(),
        }
        .into());
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((n, m), flat).map_err(|e| ApplicationError::OperationFailed {
        context: format!("matrix for branch {branch}"),
        source: Box::new(e),
    })
}

impl FitInput {
    pub fn from_json(text: &str, path: &Path) -> ApplicationResult<Self> {
        serde_json::from_str(text).with_fit_context(path)
    }

    /// Parses the tree and keys every matrix by branch.
    #[instrument(level = "debug", skip(self), fields(source = %self.source))]
    pub fn into_fit(self) -> ApplicationResult<Fit> {
        let tree = parse_newick(&self.tree)?;
        let mut psubs = BTreeMap::new();
        for entry in &self.psubs {
            let branch = entry.edge.resolve(&tree)?;
            let matrix = to_array(&entry.matrix, &branch)?;
            if psubs.insert(branch.clone(), matrix).is_some() {
                return Err(ApplicationError::DuplicateEdge(branch.to_string()));
            }
        }
        let psubs = ModelPsubs::new(self.source.clone(), psubs);
        psubs.validate_against(&tree)?;
        debug!("fit resolved: {} branches, {} params", psubs.len(), self.params.len());
        Ok(Fit {
            source: self.source,
            model_name: self.model_name,
            tree,
            psubs,
            params: self.params,
        })
    }
}

/// Reads and resolves one fit file.
pub fn load_fit(fs: &dyn FileSystem, path: &Path) -> ApplicationResult<Fit> {
    let text = fs.read_to_string(path).with_path_context("read fit", path)?;
    FitInput::from_json(&text, path)?.into_fit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn identity4() -> Vec<Vec<f64>> {
        (0..4)
            .map(|i| (0..4).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect()
    }

    fn input(edges: Vec<EdgeLabel>) -> FitInput {
        FitInput {
            source: "fit".to_string(),
            model_name: None,
            tree: "(A,B,C);".to_string(),
            psubs: edges
                .into_iter()
                .map(|edge| PsubEntry {
                    edge,
                    matrix: identity4(),
                })
                .collect(),
            params: vec![],
        }
    }

    #[test]
    fn given_child_and_pair_labels_when_resolving_then_same_branches() {
        let fit = input(vec![
            EdgeLabel::Child("A".to_string()),
            EdgeLabel::Pair(["root".to_string(), "B".to_string()]),
            EdgeLabel::Child("C".to_string()),
        ])
        .into_fit()
        .unwrap();
        assert_eq!(fit.psubs.len(), 3);
        assert!(fit.psubs.get(&BranchId::new("B", "root")).is_some());
    }

    #[test]
    fn given_root_label_when_resolving_then_unknown_edge() {
        let err = input(vec![EdgeLabel::Child("root".to_string())])
            .into_fit()
            .unwrap_err();
        assert!(matches!(err, ApplicationError::UnknownEdge(_)));
    }

    #[test]
    fn given_duplicate_branch_when_resolving_then_rejected() {
        let err = input(vec![
            EdgeLabel::Child("A".to_string()),
            EdgeLabel::Pair(["A".to_string(), "root".to_string()]),
        ])
        .into_fit()
        .unwrap_err();
        assert!(matches!(err, ApplicationError::DuplicateEdge(_)));
    }

    #[test]
    fn given_missing_branch_when_resolving_then_domain_error() {
        let err = input(vec![EdgeLabel::Child("A".to_string())])
            .into_fit()
            .unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::MissingBranch(_))
        ));
    }

    #[test]
    fn given_ragged_matrix_when_resolving_then_not_square() {
        let mut fit = input(vec![
            EdgeLabel::Child("A".to_string()),
            EdgeLabel::Child("B".to_string()),
            EdgeLabel::Child("C".to_string()),
        ]);
        fit.psubs[0].matrix[1].pop();
        assert!(matches!(
            fit.into_fit().unwrap_err(),
            ApplicationError::Domain(DomainError::NotSquare { .. })
        ));
    }

    #[test]
    fn given_json_document_when_parsing_then_labels_and_params_read() {
        let doc = json!({
            "source": "brca1",
            "tree": "(A,B,C);",
            "psubs": [
                {"edge": "A", "matrix": [[1.0, 0.0], [0.0, 1.0]]},
                {"edge": ["B", "root"], "matrix": [[1.0, 0.0], [0.0, 1.0]]}
            ],
            "params": [
                {"par_name": "A/G", "init": 1.5, "lower": 1e-6, "upper": 200.0},
                {"par_name": "mprobs", "init": {"A": 0.5, "G": 0.5}}
            ]
        });
        let input = FitInput::from_json(&doc.to_string(), &PathBuf::from("x.json")).unwrap();
        assert_eq!(input.psubs[0].edge, EdgeLabel::Child("A".to_string()));
        assert_eq!(
            input.psubs[1].edge,
            EdgeLabel::Pair(["B".to_string(), "root".to_string()])
        );
        assert_eq!(input.params.len(), 2);
        assert!(input.params[1].init.as_scalar().is_none());
    }
}
