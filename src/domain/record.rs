//! One structured report per model fit.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::boundary::{BoundsViolation, Violation};
use crate::domain::branch::BranchId;
use crate::domain::category::MatrixCategory;
use crate::domain::classify::delta_col;
use crate::domain::identifiability::{IdentCause, IdentCheckRes};
use crate::domain::notice::Notice;
use crate::domain::psubs::{ModelMatrixCategories, ModelPsubs};
use crate::domain::stationary::stationary_distribution;

/// A non-DLC branch and its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCategory {
    pub branch: BranchId,
    pub category: MatrixCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDelta {
    pub branch: BranchId,
    pub delta_col: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchStationary {
    pub branch: BranchId,
    pub distribution: Vec<f64>,
}

/// Everything known about the limits of one fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhyloLimitRec {
    pub source: String,
    #[serde(default)]
    pub model_name: String,
    pub version: String,
    pub identifiable: bool,
    pub strict: bool,
    pub bad_nodes: Option<BTreeSet<String>>,
    pub cause: Option<IdentCause>,
    #[serde(default)]
    pub notices: Vec<Notice>,
    #[serde(default)]
    pub boundary_values: Vec<Violation>,
    #[serde(rename = "ISCL_mcats", default)]
    pub iscl_mcats: Vec<BranchCategory>,
    #[serde(default)]
    pub delta_col: Vec<BranchDelta>,
    #[serde(default)]
    pub stationary: Vec<BranchStationary>,
}

impl PhyloLimitRec {
    pub fn has_boundary_values(&self) -> bool {
        !self.boundary_values.is_empty()
    }
}

/// Composes the per-fit results into a [`PhyloLimitRec`].
#[derive(Debug, Default)]
pub struct RecordAssembler {
    model_name: Option<String>,
}

impl RecordAssembler {
    pub fn new(model_name: Option<String>) -> Self {
        Self { model_name }
    }

    /// Numerical failures on single branches become notices; the record is always built.
    #[instrument(level = "debug", skip_all, fields(source = %ident.source))]
    pub fn assemble(
        &self,
        psubs: &ModelPsubs,
        mcats: &ModelMatrixCategories,
        ident: IdentCheckRes,
        bounds: BoundsViolation,
    ) -> PhyloLimitRec {
        let mut notices = ident.notices;

        let iscl_mcats = mcats
            .non_dlc()
            .into_iter()
            .map(|(branch, category)| BranchCategory { branch, category })
            .collect();

        let delta_col = psubs
            .iter()
            .map(|(branch, p)| BranchDelta {
                branch: branch.clone(),
                delta_col: delta_col(&p.view()),
            })
            .collect();

        let mut stationary = Vec::new();
        for (branch, p) in psubs.iter() {
            if !matches!(
                mcats.get(branch),
                Some(MatrixCategory::Limit | MatrixCategory::Sympathetic)
            ) {
                continue;
            }
            match stationary_distribution(&p.view(), &branch.to_string()) {
                Ok(pi) => stationary.push(BranchStationary {
                    branch: branch.clone(),
                    distribution: pi.to_vec(),
                }),
                Err(e) => {
                    debug!("{}", e);
                    notices.push(Notice::StationaryUndetermined {
                        branch: branch.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        PhyloLimitRec {
            source: ident.source,
            model_name: self.model_name.clone().unwrap_or_default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            identifiable: ident.identifiable,
            strict: ident.strict,
            bad_nodes: ident.bad_nodes,
            cause: ident.cause,
            notices,
            boundary_values: bounds.violations,
            iscl_mcats,
            delta_col,
            stationary,
        }
    }
}
