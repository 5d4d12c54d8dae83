//! Signal estimator used on its own, for background-subtraction studies.

use std::sync::Arc;

use crate::error::Result;
use crate::hist::Histogram;
use crate::io::{Group, TYPE_KEY};
use crate::measurement::{Measurement, SignalEstimator, TemplateSet};

/// Evaluates to the estimated signal; `eval_signal` is the identity.
#[derive(Debug, Clone)]
pub struct SignalOnly {
    estimator: Arc<dyn SignalEstimator>,
}

impl SignalOnly {
    pub const TYPE_TAG: &'static str = "SignalOnly";

    pub fn new(estimator: Arc<dyn SignalEstimator>) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &Arc<dyn SignalEstimator> {
        &self.estimator
    }

    pub fn load(group: &Group) -> Result<Self> {
        group.expect_type(Self::TYPE_TAG)?;
        let estimator = crate::measurement::loader::load_signal_estimator(group.group("estimator")?)?;
        Ok(Self::new(estimator))
    }
}

impl Measurement for SignalOnly {
    fn eval(&self, data: &Histogram) -> Result<Histogram> {
        self.estimator.eval(data)
    }

    fn eval_signal(&self, signal: &Histogram) -> Result<Histogram> {
        Ok(signal.clone())
    }

    fn templates(&self) -> Option<TemplateSet> {
        self.estimator.templates()
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn save_to(&self, group: &mut Group, name: &str) -> Result<()> {
        let g = group.mkdir(name);
        g.put_text(TYPE_KEY, Self::TYPE_TAG);
        self.estimator.save_to(g, "estimator")
    }
}
