//! Cross sections and cross-section ratios.
//!
//! ```text
//! signal   = estimator(data)
//! unfolded = unfold(signal)
//! xsec     = unfolded / (efficiency · flux · ntargets · 1e-4)
//! ```
//!
//! The `1e-4` converts a flux per m² into one per cm². A differential cross
//! section is further divided by the bin width.

use std::sync::Arc;

use crate::error::{Result, XsecError};
use crate::hist::Histogram;
use crate::io::{Group, TYPE_KEY};
use crate::measurement::{Efficiency, Flux, Measurement, SignalEstimator, TemplateSet, Unfold};

/// Flux unit conversion, m⁻² to cm⁻².
pub const FLUX_UNIT_CONVERSION: f64 = 1e-4;

#[derive(Debug, Clone, Default)]
pub struct CrossSection {
    efficiency: Option<Arc<dyn Efficiency>>,
    flux: Option<Arc<dyn Flux>>,
    unfold: Option<Arc<dyn Unfold>>,
    signal_estimator: Option<Arc<dyn SignalEstimator>>,
    ntargets: f64,
    differential: bool,
}

impl CrossSection {
    pub const TYPE_TAG: &'static str = "CrossSection";

    /// A complete cross section.
    pub fn new(
        efficiency: Arc<dyn Efficiency>,
        signal_estimator: Arc<dyn SignalEstimator>,
        flux: Arc<dyn Flux>,
        unfold: Arc<dyn Unfold>,
        ntargets: f64,
    ) -> Self {
        Self {
            efficiency: Some(efficiency),
            flux: Some(flux),
            unfold: Some(unfold),
            signal_estimator: Some(signal_estimator),
            ntargets,
            differential: false,
        }
    }

    /// A cross section with no components; fill it with the `with_*` setters.
    pub fn empty(ntargets: f64) -> Self {
        Self {
            ntargets,
            ..Self::default()
        }
    }

    pub fn with_efficiency(mut self, efficiency: Arc<dyn Efficiency>) -> Self {
        self.efficiency = Some(efficiency);
        self
    }

    pub fn with_flux(mut self, flux: Arc<dyn Flux>) -> Self {
        self.flux = Some(flux);
        self
    }

    pub fn with_unfold(mut self, unfold: Arc<dyn Unfold>) -> Self {
        self.unfold = Some(unfold);
        self
    }

    pub fn with_signal_estimator(mut self, signal_estimator: Arc<dyn SignalEstimator>) -> Self {
        self.signal_estimator = Some(signal_estimator);
        self
    }

    /// Divide the result by the bin width.
    pub fn differential(mut self) -> Self {
        self.differential = true;
        self
    }

    pub fn set_ntargets(&mut self, ntargets: f64) {
        self.ntargets = ntargets;
    }

    pub fn ntargets(&self) -> f64 {
        self.ntargets
    }

    pub fn is_differential(&self) -> bool {
        self.differential
    }

    pub fn is_complete(&self) -> bool {
        self.efficiency.is_some()
            && self.flux.is_some()
            && self.unfold.is_some()
            && self.signal_estimator.is_some()
    }

    pub fn signal_estimator(&self) -> Result<&Arc<dyn SignalEstimator>> {
        require(&self.signal_estimator, "signal estimator")
    }

    /// Reconstruct from a group written by [`Measurement::save_to`].
    pub fn load(group: &Group) -> Result<Self> {
        use crate::measurement::loader::{
            load_efficiency, load_flux, load_signal_estimator, load_unfold,
        };

        group.expect_type(Self::TYPE_TAG)?;
        let mut xs = Self::empty(group.scalar("ntargets")?);
        xs.differential = group.scalar("differential")? != 0.0;
        if group.has_group("efficiency") {
            xs.efficiency = Some(load_efficiency(group.group("efficiency")?)?);
        }
        if group.has_group("flux") {
            xs.flux = Some(load_flux(group.group("flux")?)?);
        }
        if group.has_group("unfold") {
            xs.unfold = Some(load_unfold(group.group("unfold")?)?);
        }
        if group.has_group("signal_estimator") {
            xs.signal_estimator = Some(load_signal_estimator(group.group("signal_estimator")?)?);
        }
        Ok(xs)
    }

    fn write_into(&self, g: &mut Group) -> Result<()> {
        g.put_text(TYPE_KEY, Self::TYPE_TAG);
        g.put_scalar("ntargets", self.ntargets);
        g.put_scalar("differential", if self.differential { 1.0 } else { 0.0 });
        if let Some(eff) = &self.efficiency {
            eff.save_to(g, "efficiency")?;
        }
        if let Some(flux) = &self.flux {
            flux.save_to(g, "flux")?;
        }
        if let Some(unfold) = &self.unfold {
            unfold.save_to(g, "unfold")?;
        }
        if let Some(est) = &self.signal_estimator {
            est.save_to(g, "signal_estimator")?;
        }
        Ok(())
    }
}

fn require<'a, T: ?Sized>(slot: &'a Option<Arc<T>>, component: &'static str) -> Result<&'a Arc<T>> {
    slot.as_ref()
        .ok_or(XsecError::IncompleteMeasurement { component })
}

impl Measurement for CrossSection {
    fn eval(&self, data: &Histogram) -> Result<Histogram> {
        let signal = self.signal_estimator()?.eval(data)?;
        self.eval_signal(&signal)
    }

    fn eval_signal(&self, signal: &Histogram) -> Result<Histogram> {
        let unfold = require(&self.unfold, "unfold")?;
        let efficiency = require(&self.efficiency, "efficiency")?;
        let flux = require(&self.flux, "flux")?;

        let unfolded = unfold.apply(signal)?;
        let eff = efficiency.eval()?;
        let phi = flux.eval()?;
        unfolded.check_binning(&eff)?;
        unfolded.check_binning(&phi)?;

        let scale = self.ntargets * FLUX_UNIT_CONVERSION;
        let mut contents = Vec::with_capacity(unfolded.nbins());
        let mut variances = Vec::with_capacity(unfolded.nbins());
        for i in 0..unfolded.nbins() {
            let (s, vs) = (unfolded.value(i), unfolded.variances()[i]);
            let (e, ve) = (eff.value(i), eff.variances()[i]);
            let (f, vf) = (phi.value(i), phi.variances()[i]);

            let denom = e * f * scale;
            if denom == 0.0 {
                contents.push(0.0);
                variances.push(0.0);
                continue;
            }
            let x = s / denom;
            let var = if s == 0.0 {
                vs / (denom * denom)
            } else {
                x * x * (vs / (s * s) + ve / (e * e) + vf / (f * f))
            };
            contents.push(x);
            variances.push(var);
        }

        let xsec = unfolded.with_values(contents, variances)?;
        Ok(if self.differential {
            xsec.bin_width_normalize()
        } else {
            xsec
        })
    }

    fn templates(&self) -> Option<TemplateSet> {
        self.signal_estimator.as_ref().and_then(|s| s.templates())
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn save_to(&self, group: &mut Group, name: &str) -> Result<()> {
        self.write_into(group.mkdir(name))
    }
}

/// Ratio of two independently evaluated cross sections.
#[derive(Debug, Clone)]
pub struct CrossSectionRatio {
    numerator: CrossSection,
    denominator: CrossSection,
}

impl CrossSectionRatio {
    pub const TYPE_TAG: &'static str = "CrossSectionRatio";

    pub fn new(numerator: CrossSection, denominator: CrossSection) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn set_ntargets_numerator(&mut self, ntargets: f64) {
        self.numerator.set_ntargets(ntargets);
    }

    pub fn set_ntargets_denominator(&mut self, ntargets: f64) {
        self.denominator.set_ntargets(ntargets);
    }

    pub fn numerator(&self) -> &CrossSection {
        &self.numerator
    }

    pub fn denominator(&self) -> &CrossSection {
        &self.denominator
    }

    pub fn load(group: &Group) -> Result<Self> {
        group.expect_type(Self::TYPE_TAG)?;
        Ok(Self::new(
            CrossSection::load(group.group("numerator")?)?,
            CrossSection::load(group.group("denominator")?)?,
        ))
    }
}

impl Measurement for CrossSectionRatio {
    /// `σ_r² = r² ((σ_n/n)² + (σ_d/d)²)`, treating both sides as independent.
    ///
    /// Bins with a zero denominator give 0 with 0 variance, as in
    /// [`CrossSection::eval_signal`].
    fn eval(&self, data: &Histogram) -> Result<Histogram> {
        let num = self.numerator.eval(data)?;
        let den = self.denominator.eval(data)?;
        let ratio = num.div_hist(&den)?;

        let empty: Vec<usize> = (0..den.nbins()).filter(|&i| den.value(i) == 0.0).collect();
        if empty.is_empty() {
            return Ok(ratio);
        }
        tracing::warn!(bins = ?empty, "cross-section ratio has empty denominator bins");
        let mut contents = ratio.contents().to_vec();
        let mut variances = ratio.variances().to_vec();
        for i in empty {
            contents[i] = 0.0;
            variances[i] = 0.0;
        }
        ratio.with_values(contents, variances)
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn save_to(&self, group: &mut Group, name: &str) -> Result<()> {
        let g = group.mkdir(name);
        g.put_text(TYPE_KEY, Self::TYPE_TAG);
        self.numerator.write_into(g.mkdir("numerator"))?;
        self.denominator.write_into(g.mkdir("denominator"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{IdentityUnfold, SimpleEfficiency, SimpleFlux, SimpleSignalEstimator};

    fn edges() -> Vec<f64> {
        vec![0.0, 1.0, 3.0]
    }

    fn xsec(ntargets: f64) -> CrossSection {
        let eff = SimpleEfficiency::new(
            Histogram::from_contents(edges(), vec![50.0, 25.0]).unwrap(),
            Histogram::from_contents(edges(), vec![100.0, 100.0]).unwrap(),
        )
        .unwrap();
        let flux = SimpleFlux::new(Histogram::from_contents(edges(), vec![2.0, 4.0]).unwrap());
        let bkg = SimpleSignalEstimator::new(Histogram::from_contents(edges(), vec![10.0, 0.0]).unwrap());
        CrossSection::new(
            Arc::new(eff),
            Arc::new(bkg),
            Arc::new(flux),
            Arc::new(IdentityUnfold),
            ntargets,
        )
    }

    fn data() -> Histogram {
        Histogram::from_counts(edges(), vec![110.0, 40.0]).unwrap()
    }

    #[test]
    fn eval_divides_by_efficiency_flux_and_targets() {
        let out = xsec(1e4).eval(&data()).unwrap();
        // (110-10) / (0.5 * 2 * 1e4 * 1e-4) = 100; 40 / (0.25 * 4 * 1) = 40
        assert!((out.value(0) - 100.0).abs() < 1e-9);
        assert!((out.value(1) - 40.0).abs() < 1e-9);

        // relative errors in quadrature: signal sqrt(110)/100, efficiency sqrt(0.0025)/0.5
        let rel2 = 110.0 / 1e4 + 0.0025 / 0.25;
        assert!((out.variances()[0] - 1e4 * rel2).abs() < 1e-6);
    }

    #[test]
    fn differential_divides_by_width() {
        let out = xsec(1e4).differential().eval(&data()).unwrap();
        assert!((out.value(1) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn zero_denominator_gives_zero() {
        let out = xsec(0.0).eval(&data()).unwrap();
        assert_eq!(out.contents(), &[0.0, 0.0]);
        assert_eq!(out.variances(), &[0.0, 0.0]);
    }

    #[test]
    fn incomplete_cross_section_rejects_eval() {
        let partial = CrossSection::empty(1.0).with_unfold(Arc::new(IdentityUnfold));
        assert!(!partial.is_complete());
        let err = partial.eval(&data()).unwrap_err();
        assert!(matches!(
            err,
            XsecError::IncompleteMeasurement {
                component: "signal estimator"
            }
        ));
        let err = partial.eval_signal(&data()).unwrap_err();
        assert!(matches!(
            err,
            XsecError::IncompleteMeasurement {
                component: "efficiency"
            }
        ));
    }

    #[test]
    fn ratio_assumes_independence() {
        let mut ratio = CrossSectionRatio::new(xsec(1e4), xsec(1e4));
        ratio.set_ntargets_denominator(2e4);
        let out = ratio.eval(&data()).unwrap();
        assert!((out.value(0) - 2.0).abs() < 1e-12);

        let n = xsec(1e4).eval(&data()).unwrap();
        let d = xsec(2e4).eval(&data()).unwrap();
        let r = out.value(0);
        let expected = r * r * (n.variances()[0] / n.value(0).powi(2) + d.variances()[0] / d.value(0).powi(2));
        assert!((out.variances()[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn ratio_with_empty_denominator_gives_zero() {
        let out = CrossSectionRatio::new(xsec(1e4), xsec(0.0)).eval(&data()).unwrap();
        assert_eq!(out.contents(), &[0.0, 0.0]);
        assert_eq!(out.variances(), &[0.0, 0.0]);
    }

    #[test]
    fn save_and_load_round_trip() {
        let xs = xsec(5e3).differential();
        let mut root = Group::new();
        xs.save_to(&mut root, "xs").unwrap();
        let back = CrossSection::load(root.group("xs").unwrap()).unwrap();
        assert!(back.is_differential());
        assert_eq!(back.ntargets(), 5e3);
        assert!(back.eval(&data()).unwrap().approx_eq(&xs.eval(&data()).unwrap(), 1e-12));
    }
}
