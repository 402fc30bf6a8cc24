//! Classification of a single substitution-probability matrix.
//!
//! The checks form a strict cascade, first match wins:
//! identity, limit, DLC, chainsaw, and sympathetic as the catch-all.
//! Every comparison goes through one [`Tolerance`]; near-ties between the
//! two largest entries of a column disqualify the stricter category.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

use crate::domain::category::MatrixCategory;
use crate::domain::error::{DomainError, DomainResult};

/// Closeness test `|a - b| <= atol + rtol * |b|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rtol: 1e-5,
            atol: 1e-8,
        }
    }
}

impl Tolerance {
    pub fn new(rtol: f64, atol: f64) -> Self {
        Self { rtol, atol }
    }

    pub fn is_close(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.atol + self.rtol * b.abs()
    }

    pub fn all_close<'a, I>(&self, a: I, b: I) -> bool
    where
        I: IntoIterator<Item = &'a f64>,
    {
        a.into_iter()
            .zip(b)
            .all(|(&x, &y)| self.is_close(x, y))
    }
}

/// Fails unless `p` is a non-empty square matrix.
pub fn check_square(p: &ArrayView2<'_, f64>, branch: &str) -> DomainResult<usize> {
    let (rows, cols) = p.dim();
    if rows == 0 || cols == 0 {
        return Err(DomainError::EmptyMatrix(branch.to_string()));
    }
    if rows != cols {
        return Err(DomainError::NotSquare {
            branch: branch.to_string(),
            rows,
            cols,
        });
    }
    Ok(rows)
}

/// Classifies matrices with a fixed tolerance.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixClassifier {
    tolerance: Tolerance,
}

impl MatrixClassifier {
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Assigns exactly one category to `p`.
    #[instrument(level = "trace", skip(self, p))]
    pub fn classify(&self, p: &Array2<f64>) -> DomainResult<MatrixCategory> {
        self.classify_view(p.view(), "<matrix>")
    }

    /// As [`classify`](Self::classify), naming `branch` in shape errors.
    pub fn classify_view(&self, p: ArrayView2<'_, f64>, branch: &str) -> DomainResult<MatrixCategory> {
        check_square(&p, branch)?;
        let category = if self.is_identity(&p) {
            MatrixCategory::Identity
        } else if self.is_limit(&p) {
            MatrixCategory::Limit
        } else if self.is_dlc(&p) {
            MatrixCategory::Dlc
        } else if self.is_chainsaw(&p) {
            MatrixCategory::Chainsaw
        } else {
            MatrixCategory::Sympathetic
        };
        trace!("classified {} as {}", branch, category);
        Ok(category)
    }

    pub fn is_identity(&self, p: &ArrayView2<'_, f64>) -> bool {
        let identity = Array2::<f64>::eye(p.nrows());
        self.tolerance.all_close(p.iter(), identity.iter())
    }

    /// Every row matches the first row: the chain has reached its limit.
    pub fn is_limit(&self, p: &ArrayView2<'_, f64>) -> bool {
        let first = p.row(0);
        p.axis_iter(Axis(0))
            .all(|row| self.tolerance.all_close(row.iter(), first.iter()))
    }

    /// Each diagonal entry is the strict, untied maximum of its column.
    pub fn is_dlc(&self, p: &ArrayView2<'_, f64>) -> bool {
        (0..p.ncols()).all(|col| {
            let diag = p[[col, col]];
            let off_max = p
                .column(col)
                .iter()
                .enumerate()
                .filter(|&(row, _)| row != col)
                .map(|(_, &v)| v)
                .fold(f64::NEG_INFINITY, f64::max);
            off_max < diag && !self.tolerance.is_close(off_max, diag)
        })
    }

    /// The column maxima sit on a derangement of the rows, and undoing that
    /// derangement yields a DLC matrix.
    pub fn is_chainsaw(&self, p: &ArrayView2<'_, f64>) -> bool {
        let Some(origins) = column_argmax_permutation(p) else {
            return false;
        };
        if origins.iter().enumerate().any(|(col, &row)| row == col) {
            return false;
        }
        let restored = p.select(Axis(0), &origins);
        self.is_dlc(&restored.view())
    }
}

/// Row index of each column's maximum, if those indices form a permutation.
///
/// The first maximal row wins on exact ties; near-ties are rejected later by
/// the DLC test on the restored matrix.
fn column_argmax_permutation(p: &ArrayView2<'_, f64>) -> Option<Vec<usize>> {
    let n = p.nrows();
    let mut seen = vec![false; n];
    let mut origins = Vec::with_capacity(n);
    for column in p.axis_iter(Axis(1)) {
        let (row, _) = column
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, &v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            });
        if seen[row] {
            return None;
        }
        seen[row] = true;
        origins.push(row);
    }
    Some(origins)
}

/// Classifies `p` with the default tolerance.
pub fn classify(p: &Array2<f64>) -> DomainResult<MatrixCategory> {
    MatrixClassifier::default().classify(p)
}

/// Smallest gap, over columns, between the diagonal and the largest
/// off-diagonal entry. Positive for DLC matrices.
pub fn delta_col(p: &ArrayView2<'_, f64>) -> f64 {
    (0..p.ncols())
        .map(|col| {
            let off_max = p
                .column(col)
                .iter()
                .enumerate()
                .filter(|&(row, _)| row != col)
                .map(|(_, &v)| v)
                .fold(f64::NEG_INFINITY, f64::max);
            p[[col, col]] - off_max
        })
        .fold(f64::INFINITY, f64::min)
}
