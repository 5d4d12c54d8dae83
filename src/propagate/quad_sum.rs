//! Quadrature sum of independent systematics.
//!
//! Per systematic, the absolute uncertainty in each bin is:
//!
//! ```text
//! OneSided    |u - nom|
//! TwoSided    (|d_up| + |d_dn|) / 2      deltas of opposite sign (or zero)
//!             max(|d_up|, |d_dn|)        deltas of the same sign
//! Multiverse  sqrt( Σ (u_i - nom)² / N )
//! ```
//!
//! and the total is `sqrt(Σ_s u_s²)`.
//!
//! In asymmetric mode the upward and downward deviations are kept apart:
//! positive deltas feed the upward total, negative deltas the downward one.
//! Multiverse systematics are first collapsed to `±1σ` shifts.

use rayon::prelude::*;

use crate::domain::SystType;
use crate::error::Result;
use crate::hist::Histogram;
use crate::measurement::Measurement;
use crate::propagate::{SystematicMap, TOTAL_NAME, UncertaintyPropagator};
use crate::systematic::Systematic;

/// A fractional uncertainty and the bins where the nominal was zero.
#[derive(Debug, Clone)]
pub struct Fractional {
    pub hist: Histogram,
    /// Bins whose nominal content is zero; their values are `NaN` or `inf`.
    pub zero_bins: Vec<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleQuadSum {
    asymmetric: bool,
}

impl SimpleQuadSum {
    pub fn new() -> Self {
        Self { asymmetric: false }
    }

    /// Keep upward and downward deviations separate.
    pub fn asymmetric() -> Self {
        Self { asymmetric: true }
    }

    /// Symmetrized absolute uncertainty of one systematic.
    pub fn absolute_uncertainty(
        &self,
        nominal: &Histogram,
        syst: &Systematic<Histogram>,
    ) -> Result<Histogram> {
        let deltas = deltas(nominal, syst)?;
        let values = (0..nominal.nbins())
            .map(|bin| match syst.kind() {
                SystType::OneSided => deltas[0][bin].abs(),
                SystType::TwoSided => symmetrize(deltas[0][bin], deltas[1][bin]),
                SystType::Multiverse => {
                    let ss: f64 = deltas.iter().map(|d| d[bin] * d[bin]).sum();
                    (ss / deltas.len() as f64).sqrt()
                }
            })
            .collect();
        band(nominal, values)
    }

    /// Upward and downward absolute uncertainty of one systematic.
    pub fn asymmetric_uncertainty(
        &self,
        nominal: &Histogram,
        syst: &Systematic<Histogram>,
    ) -> Result<(Histogram, Histogram)> {
        let two = syst.to_two_sided(nominal)?;
        let deltas = deltas(nominal, &two)?;
        let mut up = vec![0.0; nominal.nbins()];
        let mut down = vec![0.0; nominal.nbins()];
        for d in &deltas {
            for (bin, &x) in d.iter().enumerate() {
                if x > 0.0 {
                    up[bin] = f64::max(up[bin], x);
                } else {
                    down[bin] = f64::max(down[bin], -x);
                }
            }
        }
        Ok((band(nominal, up)?, band(nominal, down)?))
    }

    /// `sqrt(Σ_s u_s²)` over all systematics.
    pub fn total_absolute_uncertainty(
        &self,
        nominal: &Histogram,
        systs: &[Systematic<Histogram>],
    ) -> Result<Histogram> {
        let parts = systs
            .iter()
            .map(|s| self.absolute_uncertainty(nominal, s))
            .collect::<Result<Vec<_>>>()?;
        quad_sum(nominal, &parts)
    }

    /// Upward and downward totals, each summed in quadrature.
    pub fn total_asymmetric_uncertainty(
        &self,
        nominal: &Histogram,
        systs: &[Systematic<Histogram>],
    ) -> Result<(Histogram, Histogram)> {
        let (ups, downs): (Vec<_>, Vec<_>) = systs
            .iter()
            .map(|s| self.asymmetric_uncertainty(nominal, s))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();
        Ok((quad_sum(nominal, &ups)?, quad_sum(nominal, &downs)?))
    }

    pub fn fractional_uncertainty(
        &self,
        nominal: &Histogram,
        syst: &Systematic<Histogram>,
    ) -> Result<Fractional> {
        fractional(nominal, &self.absolute_uncertainty(nominal, syst)?)
    }

    pub fn total_fractional_uncertainty(
        &self,
        nominal: &Histogram,
        systs: &[Systematic<Histogram>],
    ) -> Result<Fractional> {
        fractional(nominal, &self.total_absolute_uncertainty(nominal, systs)?)
    }

    /// Combine already evaluated systematics into the `[up, down]` band.
    pub fn combine(
        &self,
        nominal: &Histogram,
        systs: &[Systematic<Histogram>],
    ) -> Result<Systematic<Histogram>> {
        if self.asymmetric {
            let (up, down) = self.total_asymmetric_uncertainty(nominal, systs)?;
            Ok(Systematic::two_sided(TOTAL_NAME, up, down))
        } else {
            let total = self.total_absolute_uncertainty(nominal, systs)?;
            Ok(Systematic::two_sided(TOTAL_NAME, total.clone(), total))
        }
    }
}

impl UncertaintyPropagator for SimpleQuadSum {
    fn name(&self) -> &'static str {
        if self.asymmetric {
            "SimpleQuadSum (asymmetric)"
        } else {
            "SimpleQuadSum"
        }
    }

    fn propagate(
        &self,
        nominal: &dyn Measurement,
        systematics: &SystematicMap,
        data: &Histogram,
    ) -> Result<(Histogram, Systematic<Histogram>)> {
        let central = nominal.eval(data)?;
        let shifted = systematics
            .values()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|s| s.eval(data))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            propagator = self.name(),
            systematics = shifted.len(),
            "propagating uncertainties"
        );
        let total = self.combine(&central, &shifted)?;
        Ok((central, total))
    }
}

/// Per-universe `universe - nominal` contents.
fn deltas(nominal: &Histogram, syst: &Systematic<Histogram>) -> Result<Vec<Vec<f64>>> {
    syst.universes()
        .iter()
        .map(|u| {
            nominal.check_binning(u)?;
            Ok(u.contents()
                .iter()
                .zip(nominal.contents())
                .map(|(a, b)| a - b)
                .collect())
        })
        .collect()
}

fn symmetrize(up: f64, down: f64) -> f64 {
    if (up > 0.0 && down > 0.0) || (up < 0.0 && down < 0.0) {
        up.abs().max(down.abs())
    } else {
        (up.abs() + down.abs()) / 2.0
    }
}

fn band(nominal: &Histogram, values: Vec<f64>) -> Result<Histogram> {
    let n = values.len();
    nominal.with_values(values, vec![0.0; n])
}

fn quad_sum(nominal: &Histogram, parts: &[Histogram]) -> Result<Histogram> {
    let values = (0..nominal.nbins())
        .map(|bin| parts.iter().map(|p| p.value(bin).powi(2)).sum::<f64>().sqrt())
        .collect();
    band(nominal, values)
}

fn fractional(nominal: &Histogram, absolute: &Histogram) -> Result<Fractional> {
    let zero_bins: Vec<usize> = nominal
        .contents()
        .iter()
        .enumerate()
        .filter(|(_, v)| **v == 0.0)
        .map(|(i, _)| i)
        .collect();
    if !zero_bins.is_empty() {
        tracing::warn!(bins = ?zero_bins, "fractional uncertainty with zero nominal bins");
    }
    let values = absolute
        .contents()
        .iter()
        .zip(nominal.contents())
        .map(|(u, n)| u / n)
        .collect();
    Ok(Fractional {
        hist: band(nominal, values)?,
        zero_bins,
    })
}
