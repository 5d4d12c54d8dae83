//! Generalised least squares.
//!
//! For templates `T` (one column per template), data `d` and covariance `C`:
//!
//! ```text
//! F = Tᵀ C⁻¹ T                 (Fisher information)
//! w = F⁻¹ Tᵀ C⁻¹ d             (best-fit weights)
//! χ² = (d - T w)ᵀ C⁻¹ (d - T w)
//! ```
//!
//! Both `C` and `F` are factorised with Cholesky; either one failing means the
//! problem is singular and is reported as such rather than patched up.

use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector, Dyn};

use crate::error::{Result, XsecError};

/// Largest tolerated `|C C⁻¹ - I|` entry before a warning is logged.
const INVERSION_TOL: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct GlsSolution {
    /// Best-fit weights, one per template column.
    pub params: DVector<f64>,
    /// `F⁻¹`, the covariance of the weights.
    pub covariance: DMatrix<f64>,
    pub chi2: f64,
}

impl GlsSolution {
    /// `sqrt(F⁻¹ᵢᵢ)`.
    pub fn error(&self, i: usize) -> f64 {
        self.covariance[(i, i)].max(0.0).sqrt()
    }
}

/// Factorise a covariance matrix once so it can be reused across many fits.
#[derive(Debug, Clone)]
pub struct CovarianceFactor {
    chol: Cholesky<f64, Dyn>,
    dim: usize,
}

impl CovarianceFactor {
    pub fn new(cov: &DMatrix<f64>) -> Result<Self> {
        if !cov.is_square() {
            return Err(XsecError::SingularMatrix(format!(
                "covariance is {}x{}",
                cov.nrows(),
                cov.ncols()
            )));
        }
        let chol = cov.clone().cholesky().ok_or_else(|| {
            XsecError::SingularMatrix("covariance is not positive definite".into())
        })?;

        let residual = cov * chol.inverse() - DMatrix::identity(cov.nrows(), cov.ncols());
        let worst = residual.amax();
        if worst > INVERSION_TOL {
            tracing::warn!(max_deviation = worst, "covariance inverse is inaccurate");
        } else {
            tracing::debug!(max_deviation = worst, "covariance inverted");
        }
        Ok(Self {
            chol,
            dim: cov.nrows(),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Solve `GLS` for templates `t` against data `d`.
    pub fn solve(&self, t: &DMatrix<f64>, d: &DVector<f64>) -> Result<GlsSolution> {
        if t.nrows() != self.dim() || d.len() != self.dim() {
            return Err(XsecError::BinningMismatch(format!(
                "covariance has {} bins, templates {} and data {}",
                self.dim(),
                t.nrows(),
                d.len()
            )));
        }
        if t.ncols() == 0 {
            return Err(XsecError::SingularMatrix("no free templates".into()));
        }

        let cinv_t = self.chol.solve(t);
        let cinv_d = self.chol.solve(d);
        let fisher = t.transpose() * &cinv_t;
        let fisher_chol = fisher.cholesky().ok_or_else(|| {
            XsecError::SingularMatrix("template Fisher matrix is not positive definite".into())
        })?;
        let covariance = fisher_chol.inverse();
        let params = &covariance * (t.transpose() * cinv_d);

        let residual = d - t * &params;
        let chi2 = residual.dot(&self.chol.solve(&residual));

        Ok(GlsSolution {
            params,
            covariance,
            chi2,
        })
    }

    /// `rᵀ C⁻¹ r` for a residual with nothing left to fit.
    pub fn chi2(&self, r: &DVector<f64>) -> Result<f64> {
        if r.len() != self.dim() {
            return Err(XsecError::BinningMismatch(format!(
                "covariance has {} bins, residual {}",
                self.dim(),
                r.len()
            )));
        }
        Ok(r.dot(&self.chol.solve(r)))
    }
}
