//! Capability traits.
//!
//! A [`Measurement`] is anything that turns a data histogram into a result
//! histogram. Cross sections are assembled from four narrower capabilities
//! (efficiency, flux, unfolding, signal estimation), each of which users may
//! implement for their own calculators.
//!
//! Every capability can persist itself into a [`Group`]; reconstruction goes
//! through loader functions (see `measurement::loader`) because the core
//! cannot construct user types generically.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{Result, XsecError};
use crate::hist::Histogram;
use crate::io::Group;
use crate::measurement::TemplateSet;

/// Something that can be evaluated against data.
pub trait Measurement: Send + Sync + Debug {
    /// Evaluate against the observed data.
    fn eval(&self, data: &Histogram) -> Result<Histogram>;

    /// Apply everything downstream of signal estimation to an externally
    /// estimated signal.
    ///
    /// Measurements without such a chain reject the call.
    fn eval_signal(&self, _signal: &Histogram) -> Result<Histogram> {
        Err(XsecError::IncompleteMeasurement {
            component: "signal correction chain",
        })
    }

    /// Labelled signal/background templates, when the signal is estimated
    /// from templates.
    fn templates(&self) -> Option<TemplateSet> {
        None
    }

    /// Tag written into persisted groups.
    fn type_tag(&self) -> &'static str;

    /// Persist into the sub-group `name` of `group`.
    fn save_to(&self, group: &mut Group, name: &str) -> Result<()>;
}

impl<M: Measurement + ?Sized> Measurement for Arc<M> {
    fn eval(&self, data: &Histogram) -> Result<Histogram> {
        (**self).eval(data)
    }

    fn eval_signal(&self, signal: &Histogram) -> Result<Histogram> {
        (**self).eval_signal(signal)
    }

    fn templates(&self) -> Option<TemplateSet> {
        (**self).templates()
    }

    fn type_tag(&self) -> &'static str {
        (**self).type_tag()
    }

    fn save_to(&self, group: &mut Group, name: &str) -> Result<()> {
        (**self).save_to(group, name)
    }
}

/// Selection efficiency (acceptance correction).
pub trait Efficiency: Send + Sync + Debug {
    fn eval(&self) -> Result<Histogram>;
    fn type_tag(&self) -> &'static str;
    fn save_to(&self, group: &mut Group, name: &str) -> Result<()>;
}

/// Incident flux normalization.
pub trait Flux: Send + Sync + Debug {
    fn eval(&self) -> Result<Histogram>;
    fn type_tag(&self) -> &'static str;
    fn save_to(&self, group: &mut Group, name: &str) -> Result<()>;
}

/// Maps a reconstructed-space spectrum to true space.
pub trait Unfold: Send + Sync + Debug {
    fn apply(&self, reco: &Histogram) -> Result<Histogram>;
    fn type_tag(&self) -> &'static str;
    fn save_to(&self, group: &mut Group, name: &str) -> Result<()>;
}

/// Estimates the background-subtracted signal in data.
pub trait SignalEstimator: Send + Sync + Debug {
    /// Signal yield in `data`.
    fn eval(&self, data: &Histogram) -> Result<Histogram>;

    /// Background prediction for `data`.
    fn background(&self, data: &Histogram) -> Result<Histogram>;

    /// Labelled templates, signal first. `None` for estimators that do not
    /// work from templates.
    fn templates(&self) -> Option<TemplateSet> {
        None
    }

    fn type_tag(&self) -> &'static str;
    fn save_to(&self, group: &mut Group, name: &str) -> Result<()>;
}
