//! Systematic covariance matrices.
//!
//! Each systematic contributes a covariance built from its per-universe deltas
//! `δ = universe - nominal`:
//!
//! ```text
//! OneSided    δ δᵀ
//! TwoSided    ½ (δ_up δ_upᵀ + δ_dn δ_dnᵀ)
//! Multiverse  (1/N) Σ δ_i δ_iᵀ
//! ```
//!
//! The per-universe outer products are accumulated in parallel.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::SystType;

/// Covariance contributed by one systematic, given its deltas in universe order.
pub fn systematic_covariance(kind: SystType, deltas: &[DVector<f64>]) -> DMatrix<f64> {
    let Some(first) = deltas.first() else {
        return DMatrix::zeros(0, 0);
    };
    let n = first.len();
    let sum = deltas
        .par_iter()
        .map(|d| d * d.transpose())
        .reduce(|| DMatrix::zeros(n, n), |a, b| a + b);

    match kind {
        SystType::OneSided => sum,
        SystType::TwoSided | SystType::Multiverse => sum / deltas.len() as f64,
    }
}

/// Diagonal matrix from per-bin variances.
pub fn diagonal(variances: &[f64]) -> DMatrix<f64> {
    DMatrix::from_diagonal(&DVector::from_row_slice(variances))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(xs: &[f64]) -> DVector<f64> {
        DVector::from_row_slice(xs)
    }

    #[test]
    fn one_sided_is_outer_product() {
        let cov = systematic_covariance(SystType::OneSided, &[v(&[1.0, -2.0])]);
        assert_eq!(cov, DMatrix::from_row_slice(2, 2, &[1.0, -2.0, -2.0, 4.0]));
    }

    #[test]
    fn two_sided_averages_both_shifts() {
        let cov = systematic_covariance(SystType::TwoSided, &[v(&[2.0, 0.0]), v(&[0.0, -4.0])]);
        assert_eq!(cov, DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 8.0]));
    }

    #[test]
    fn multiverse_is_symmetric_and_normalised() {
        let deltas: Vec<DVector<f64>> = (0..50)
            .map(|i| {
                let x = (i as f64 * 0.37).sin();
                v(&[x, 2.0 * x, -x])
            })
            .collect();
        let cov = systematic_covariance(SystType::Multiverse, &deltas);
        let mean_sq: f64 = deltas.iter().map(|d| d[0] * d[0]).sum::<f64>() / 50.0;
        assert!((cov[(0, 0)] - mean_sq).abs() < 1e-12);
        assert!((cov[(1, 1)] - 4.0 * mean_sq).abs() < 1e-12);
        assert!((&cov - cov.transpose()).amax() < 1e-15);
    }
}
