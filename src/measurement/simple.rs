//! Built-in calculators for the common cases.

use crate::error::Result;
use crate::hist::Histogram;
use crate::io::{Group, TYPE_KEY};
use crate::measurement::{Efficiency, Flux, SignalEstimator, Unfold};

/// `ε = selected / generated` with binomial variance `ε(1 − ε) / generated`.
#[derive(Debug, Clone)]
pub struct SimpleEfficiency {
    numerator: Histogram,
    denominator: Histogram,
}

impl SimpleEfficiency {
    pub const TYPE_TAG: &'static str = "SimpleEfficiency";

    pub fn new(numerator: Histogram, denominator: Histogram) -> Result<Self> {
        numerator.check_binning(&denominator)?;
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub fn load(group: &Group) -> Result<Self> {
        group.expect_type(Self::TYPE_TAG)?;
        Self::new(group.hist("numerator")?, group.hist("denominator")?)
    }
}

impl Efficiency for SimpleEfficiency {
    fn eval(&self) -> Result<Histogram> {
        let (contents, variances): (Vec<f64>, Vec<f64>) = self
            .numerator
            .contents()
            .iter()
            .zip(self.denominator.contents())
            .map(|(&num, &den)| {
                if den == 0.0 {
                    (0.0, 0.0)
                } else {
                    let eff = num / den;
                    (eff, (eff * (1.0 - eff) / den).max(0.0))
                }
            })
            .unzip();
        self.numerator.with_values(contents, variances)
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn save_to(&self, group: &mut Group, name: &str) -> Result<()> {
        let g = group.mkdir(name);
        g.put_text(TYPE_KEY, Self::TYPE_TAG);
        g.put_hist("numerator", &self.numerator);
        g.put_hist("denominator", &self.denominator);
        Ok(())
    }
}

/// Flux spectrum used as-is.
#[derive(Debug, Clone)]
pub struct SimpleFlux {
    flux: Histogram,
}

impl SimpleFlux {
    pub const TYPE_TAG: &'static str = "SimpleFlux";

    pub fn new(flux: Histogram) -> Self {
        Self { flux }
    }

    pub fn load(group: &Group) -> Result<Self> {
        group.expect_type(Self::TYPE_TAG)?;
        Ok(Self::new(group.hist("flux")?))
    }
}

impl Flux for SimpleFlux {
    fn eval(&self) -> Result<Histogram> {
        Ok(self.flux.clone())
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn save_to(&self, group: &mut Group, name: &str) -> Result<()> {
        let g = group.mkdir(name);
        g.put_text(TYPE_KEY, Self::TYPE_TAG);
        g.put_hist("flux", &self.flux);
        Ok(())
    }
}

/// Total integrated flux, broadcast over the binning of the measured variable.
///
/// Every bin holds the integral `N` of the flux spectrum with variance `N`.
#[derive(Debug, Clone)]
pub struct IntegratedFlux {
    flux: Histogram,
    binning: Histogram,
}

impl IntegratedFlux {
    pub const TYPE_TAG: &'static str = "IntegratedFlux";

    /// `binning` only supplies the output bin edges.
    pub fn new(flux: Histogram, binning: &Histogram) -> Self {
        Self {
            flux,
            binning: binning.constant_like(0.0),
        }
    }

    pub fn load(group: &Group) -> Result<Self> {
        group.expect_type(Self::TYPE_TAG)?;
        Ok(Self::new(group.hist("flux")?, &group.hist("binning")?))
    }
}

impl Flux for IntegratedFlux {
    fn eval(&self) -> Result<Histogram> {
        let total = self.flux.integral();
        let n = self.binning.nbins();
        self.binning.with_values(vec![total; n], vec![total.abs(); n])
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn save_to(&self, group: &mut Group, name: &str) -> Result<()> {
        let g = group.mkdir(name);
        g.put_text(TYPE_KEY, Self::TYPE_TAG);
        g.put_hist("flux", &self.flux);
        g.put_hist("binning", &self.binning);
        Ok(())
    }
}

/// Signal = data − background; variances add.
#[derive(Debug, Clone)]
pub struct SimpleSignalEstimator {
    background: Histogram,
}

impl SimpleSignalEstimator {
    pub const TYPE_TAG: &'static str = "SimpleSignalEstimator";

    pub fn new(background: Histogram) -> Self {
        Self { background }
    }

    pub fn load(group: &Group) -> Result<Self> {
        group.expect_type(Self::TYPE_TAG)?;
        Ok(Self::new(group.hist("background")?))
    }
}

impl SignalEstimator for SimpleSignalEstimator {
    fn eval(&self, data: &Histogram) -> Result<Histogram> {
        data.sub_hist(&self.background)
    }

    fn background(&self, data: &Histogram) -> Result<Histogram> {
        data.check_binning(&self.background)?;
        Ok(self.background.clone())
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn save_to(&self, group: &mut Group, name: &str) -> Result<()> {
        let g = group.mkdir(name);
        g.put_text(TYPE_KEY, Self::TYPE_TAG);
        g.put_hist("background", &self.background);
        Ok(())
    }
}

/// No unfolding: reconstructed and true space coincide.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityUnfold;

impl IdentityUnfold {
    pub const TYPE_TAG: &'static str = "IdentityUnfold";
}

impl Unfold for IdentityUnfold {
    fn apply(&self, reco: &Histogram) -> Result<Histogram> {
        Ok(reco.clone())
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn save_to(&self, group: &mut Group, name: &str) -> Result<()> {
        group.mkdir(name).put_text(TYPE_KEY, Self::TYPE_TAG);
        Ok(())
    }
}
