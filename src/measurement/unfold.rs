//! Response-matrix unfolding.
//!
//! The response `R[reco][true]` maps a true spectrum to the reconstructed one,
//! `r = R t`. Unfolding inverts it exactly; bin variances propagate as
//! `diag(R⁻¹ V R⁻ᵀ)` with `V = diag(reco variances)`.

use nalgebra::DMatrix;

use crate::error::{Result, XsecError};
use crate::hist::Histogram;
use crate::io::{Group, TYPE_KEY};
use crate::measurement::Unfold;

#[derive(Debug, Clone)]
pub struct MatrixUnfold {
    response: DMatrix<f64>,
    inverse: DMatrix<f64>,
}

impl MatrixUnfold {
    pub const TYPE_TAG: &'static str = "MatrixUnfold";

    /// Build from response rows (`rows[reco][true]`).
    ///
    /// The response must be square and invertible; the true binning is taken
    /// to be the reconstructed one.
    pub fn new(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.len();
        if n == 0 || rows.iter().any(|r| r.len() != n) {
            return Err(XsecError::SingularMatrix(format!(
                "response must be square, got {n} rows of lengths {:?}",
                rows.iter().map(Vec::len).collect::<Vec<_>>()
            )));
        }
        let response = DMatrix::from_fn(n, n, |i, j| rows[i][j]);
        let inverse = response
            .clone()
            .try_inverse()
            .filter(|m| m.iter().all(|v| v.is_finite()))
            .ok_or_else(|| XsecError::SingularMatrix("response matrix".into()))?;
        Ok(Self { response, inverse })
    }

    pub fn response(&self) -> &DMatrix<f64> {
        &self.response
    }

    pub fn load(group: &Group) -> Result<Self> {
        group.expect_type(Self::TYPE_TAG)?;
        Self::new(group.matrix("response")?)
    }

    fn rows(&self) -> Vec<Vec<f64>> {
        self.response
            .row_iter()
            .map(|r| r.iter().copied().collect())
            .collect()
    }
}

impl Unfold for MatrixUnfold {
    fn apply(&self, reco: &Histogram) -> Result<Histogram> {
        let n = self.response.nrows();
        if reco.nbins() != n {
            return Err(XsecError::BinningMismatch(format!(
                "response has {n} bins, spectrum has {}",
                reco.nbins()
            )));
        }

        let contents = (0..n)
            .map(|i| (0..n).map(|j| self.inverse[(i, j)] * reco.value(j)).sum::<f64>())
            .collect();
        let variances = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| self.inverse[(i, j)].powi(2) * reco.variances()[j])
                    .sum::<f64>()
            })
            .collect();
        reco.with_values(contents, variances)
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn save_to(&self, group: &mut Group, name: &str) -> Result<()> {
        let g = group.mkdir(name);
        g.put_text(TYPE_KEY, Self::TYPE_TAG);
        g.put_matrix("response", self.rows());
        Ok(())
    }
}
