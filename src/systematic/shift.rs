//! N-sigma shifts for multiverse systematics.
//!
//! A multiverse ensemble is turned into a single shifted histogram by treating
//! the per-bin universe values as samples around the nominal value:
//!
//! ```text
//! s     = sqrt( Σ (u_i - nominal)² / (N - 1) )
//! shift = nominal + nsigma * s
//! ```
//!
//! With a single universe the spread is undefined and the nominal value is
//! returned unchanged. This lets multiverse systematics stand in wherever a
//! one- or two-sided shift is expected.

use crate::domain::SystType;
use crate::error::Result;
use crate::hist::Histogram;
use crate::systematic::Systematic;

/// Value `nsigma` standard deviations from `nominal` given per-universe values.
pub fn bin_sigma(nsigma: f64, universes: &[f64], nominal: f64) -> f64 {
    if universes.len() < 2 || nsigma == 0.0 {
        return nominal;
    }
    let ss: f64 = universes.iter().map(|u| (u - nominal) * (u - nominal)).sum();
    let spread = (ss / (universes.len() as f64 - 1.0)).sqrt();
    nominal + nsigma * spread
}

impl Systematic<Histogram> {
    /// Per-bin `nsigma` shift of a multiverse ensemble around `nominal`.
    ///
    /// The returned histogram keeps the nominal's binning and variances.
    pub fn nsigma_shift(&self, nsigma: f64, nominal: &Histogram) -> Result<Histogram> {
        if self.kind() != SystType::Multiverse {
            return Err(self.type_error("nsigma_shift", "Multiverse"));
        }
        for u in self.universes() {
            nominal.check_binning(u)?;
        }

        let mut values = Vec::with_capacity(self.len());
        let contents = (0..nominal.nbins())
            .map(|bin| {
                values.clear();
                values.extend(self.universes().iter().map(|u| u.value(bin)));
                bin_sigma(nsigma, &values, nominal.value(bin))
            })
            .collect();
        nominal.with_values(contents, nominal.variances().to_vec())
    }

    /// Collapse a multiverse ensemble into a two-sided `[+1σ, -1σ]` systematic.
    ///
    /// One- and two-sided systematics are returned unchanged.
    pub fn to_two_sided(&self, nominal: &Histogram) -> Result<Systematic<Histogram>> {
        match self.kind() {
            SystType::Multiverse => Ok(Systematic::two_sided(
                self.name(),
                self.nsigma_shift(1.0, nominal)?,
                self.nsigma_shift(-1.0, nominal)?,
            )),
            SystType::OneSided | SystType::TwoSided => Ok(self.clone()),
        }
    }
}
