//! Template-fit uncertainty propagation.
//!
//! 1. The nominal measurement supplies labelled templates (signal first).
//! 2. Every systematic universe supplies its own templates; the spread of the
//!    summed prediction around the nominal sum forms the systematic
//!    covariance. Data variances (and an optional explicit diagonal) are added.
//! 3. The template normalisations are fitted to data by generalised least
//!    squares. The fitted signal goes through the nominal measurement's
//!    correction chain to give the central value.
//! 4. Each universe is refitted under the same covariance and pushed through
//!    its own correction chain. The resulting shifts are reduced per
//!    systematic as in the quadrature sum, then combined in quadrature with
//!    the normalisation uncertainty `central · σ_w / w`.
//!
//! Several analyses can also be fitted jointly through [`TemplateFit::sample`]
//! and [`TemplateFit::fit_joint`].

use std::collections::BTreeMap;

use nalgebra::DMatrix;

use crate::domain::SystType;
use crate::error::{Result, XsecError};
use crate::fit::{
    FitOptions, FitSample, TemplateFitResult, fit_covariance, fit_joint, fit_templates,
    total_prediction,
};
use crate::hist::Histogram;
use crate::math::CovarianceFactor;
use crate::measurement::{Measurement, TemplateSet};
use crate::propagate::{SimpleQuadSum, SystematicMap, TOTAL_NAME, UncertaintyPropagator};
use crate::systematic::Systematic;

#[derive(Debug, Clone, Default)]
pub struct TemplateFit {
    opts: FitOptions,
}

impl TemplateFit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opts: FitOptions) -> Self {
        Self { opts }
    }

    /// Whether data variances enter the covariance (default: yes).
    pub fn include_stat(mut self, include: bool) -> Self {
        self.opts.include_stat = include;
        self
    }

    /// Add `noise` to every diagonal element of the covariance.
    pub fn noise(mut self, noise: f64) -> Self {
        self.opts.noise = noise;
        self
    }

    /// Hold the template `label` at weight `value`.
    pub fn fix_template(mut self, label: impl Into<String>, value: f64) -> Self {
        self.opts.fixed.insert(label.into(), value);
        self
    }

    /// Let a fixed template float again.
    pub fn release_template(mut self, label: &str) -> Self {
        self.opts.release(label);
        self
    }

    /// Leave `bin` out of the fit.
    pub fn mask_bin(mut self, bin: usize) -> Self {
        self.opts.masked.insert(bin);
        self
    }

    pub fn options(&self) -> &FitOptions {
        &self.opts
    }

    /// Templates, data and per-universe predictions of one analysis, ready
    /// for [`TemplateFit::fit_joint`].
    pub fn sample(
        &self,
        nominal: &dyn Measurement,
        systematics: &SystematicMap,
        data: &Histogram,
    ) -> Result<FitSample> {
        let systematics = systematics
            .iter()
            .map(|(name, syst)| {
                let totals = syst.par_try_invoke(|m| total_prediction(&templates_of(m)?))?;
                Ok((name.clone(), (syst.kind(), totals.into_universes())))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(FitSample {
            templates: templates_of(nominal)?,
            data: data.clone(),
            systematics,
        })
    }

    /// Fit shared normalisations to several samples at once.
    pub fn fit_joint(&self, samples: &BTreeMap<String, FitSample>) -> Result<TemplateFitResult> {
        fit_joint(&self.opts, samples)
    }

    /// Fit covariance for `nominal` and its systematics.
    pub fn covariance(
        &self,
        nominal: &dyn Measurement,
        systematics: &SystematicMap,
        data: &Histogram,
    ) -> Result<DMatrix<f64>> {
        let prediction = total_prediction(&templates_of(nominal)?)?;
        let spreads = systematics
            .values()
            .map(|syst| {
                let totals = syst.par_try_invoke(|m| total_prediction(&templates_of(m)?))?;
                Ok((syst.kind(), totals.into_universes()))
            })
            .collect::<Result<Vec<(SystType, Vec<Histogram>)>>>()?;
        fit_covariance(&self.opts, &prediction, &spreads, data)
    }

    /// Nominal template fit.
    pub fn fit(
        &self,
        nominal: &dyn Measurement,
        systematics: &SystematicMap,
        data: &Histogram,
    ) -> Result<TemplateFitResult> {
        let factor = CovarianceFactor::new(&self.covariance(nominal, systematics, data)?)?;
        fit_templates(&self.opts, &templates_of(nominal)?, data, &factor)
    }

    /// Refit `m`'s templates and push the fitted signal through its chain.
    fn corrected_signal(
        &self,
        m: &dyn Measurement,
        data: &Histogram,
        factor: &CovarianceFactor,
    ) -> Result<(Histogram, TemplateFitResult)> {
        let templates = templates_of(m)?;
        let fit = fit_templates(&self.opts, &templates, data, factor)?;
        let signal = templates.signal().scale(fit.signal_weight()).without_variance();
        Ok((m.eval_signal(&signal)?, fit))
    }
}

fn templates_of(m: &dyn Measurement) -> Result<TemplateSet> {
    m.templates()
        .ok_or(XsecError::IncompleteMeasurement { component: "templates" })
}

impl UncertaintyPropagator for TemplateFit {
    fn name(&self) -> &'static str {
        "TemplateFit"
    }

    fn propagate(
        &self,
        nominal: &dyn Measurement,
        systematics: &SystematicMap,
        data: &Histogram,
    ) -> Result<(Histogram, Systematic<Histogram>)> {
        let (central, total, _) = self.propagate_with_fit(nominal, systematics, data)?;
        Ok((central, total))
    }
}

impl TemplateFit {
    /// [`UncertaintyPropagator::propagate`], also returning the nominal fit.
    pub fn propagate_with_fit(
        &self,
        nominal: &dyn Measurement,
        systematics: &SystematicMap,
        data: &Histogram,
    ) -> Result<(Histogram, Systematic<Histogram>, TemplateFitResult)> {
        let factor = CovarianceFactor::new(&self.covariance(nominal, systematics, data)?)?;
        let (central, fit) = self.corrected_signal(nominal, data, &factor)?;
        tracing::info!(
            propagator = self.name(),
            systematics = systematics.len(),
            signal_weight = fit.signal_weight(),
            signal_error = fit.signal_error(),
            chi2 = fit.chi2,
            ndof = fit.ndof,
            "template fit converged"
        );

        let shifted = systematics
            .values()
            .map(|syst| {
                syst.par_try_invoke(|m| Ok(self.corrected_signal(m, data, &factor)?.0))
            })
            .collect::<Result<Vec<_>>>()?;
        let shape = SimpleQuadSum::new().total_absolute_uncertainty(&central, &shifted)?;

        let w = fit.signal_weight();
        let rel = if w != 0.0 {
            fit.signal_error() / w.abs()
        } else {
            tracing::warn!("fitted signal weight is zero; normalisation uncertainty dropped");
            0.0
        };
        let total: Vec<f64> = shape
            .contents()
            .iter()
            .zip(central.contents())
            .map(|(s, c)| s.hypot(c.abs() * rel))
            .collect();
        let total = central.with_values(total, vec![0.0; central.nbins()])?;

        Ok((
            central,
            Systematic::two_sided(TOTAL_NAME, total.clone(), total),
            fit,
        ))
    }
}
