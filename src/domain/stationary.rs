//! Stationary distribution of a substitution-probability matrix.

use faer::linalg::solvers::Solve;
use faer::{Col, Mat};
use ndarray::{Array1, ArrayView2};

use crate::domain::classify::check_square;
use crate::domain::error::{DomainError, DomainResult};

/// Diagonal entries of `U` below this (relative to the largest) mark a rank-deficient system.
const RANK_TOL: f64 = 1e-12;

/// Solves `pi P = pi` with `sum(pi) = 1`.
///
/// Reducible chains (the identity matrix, block-diagonal matrices) have no
/// unique solution and fail with [`DomainError::Singular`] naming `branch`.
pub fn stationary_distribution(p: &ArrayView2<'_, f64>, branch: &str) -> DomainResult<Array1<f64>> {
    let n = check_square(p, branch)?;
    let singular = || DomainError::Singular {
        branch: branch.to_string(),
    };

    // (P^T - I) pi = 0, with the last equation replaced by sum(pi) = 1
    let a = Mat::<f64>::from_fn(n, n, |i, j| {
        if i == n - 1 {
            1.0
        } else if i == j {
            p[[j, i]] - 1.0
        } else {
            p[[j, i]]
        }
    });
    let b = Col::<f64>::from_fn(n, |i| if i == n - 1 { 1.0 } else { 0.0 });

    let lu = a.partial_piv_lu();
    let u = lu.U();
    let pivots: Vec<f64> = (0..n).map(|k| u[(k, k)].abs()).collect();
    let largest = pivots.iter().copied().fold(1.0_f64, f64::max);
    if pivots.iter().any(|&d| d < RANK_TOL * largest) {
        return Err(singular());
    }

    let x = lu.solve(&b);
    let pi: Array1<f64> = x.iter().copied().collect();
    if pi.iter().any(|v| !v.is_finite()) {
        return Err(singular());
    }
    Ok(pi)
}
