//! The analysis container: nominal measurement, systematics and data.

use std::sync::Arc;

use crate::error::{Result, XsecError};
use crate::hist::Histogram;
use crate::measurement::Measurement;
use crate::propagate::{SystematicMap, UncertaintyPropagator};
use crate::systematic::Systematic;

#[derive(Debug, Clone)]
pub struct Analysis {
    nominal: Arc<dyn Measurement>,
    systematics: SystematicMap,
    data: Histogram,
}

impl Analysis {
    pub fn new(nominal: Arc<dyn Measurement>, data: Histogram) -> Self {
        Self {
            nominal,
            systematics: SystematicMap::new(),
            data,
        }
    }

    pub fn with_systematics(
        nominal: Arc<dyn Measurement>,
        systematics: impl IntoIterator<Item = Systematic<Arc<dyn Measurement>>>,
        data: Histogram,
    ) -> Result<Self> {
        let mut ana = Self::new(nominal, data);
        for syst in systematics {
            ana.add_systematic(syst)?;
        }
        Ok(ana)
    }

    /// Register a systematic under its own name.
    pub fn add_systematic(&mut self, syst: Systematic<Arc<dyn Measurement>>) -> Result<()> {
        if self.systematics.contains_key(syst.name()) {
            return Err(XsecError::DuplicateName(syst.name().to_string()));
        }
        self.systematics.insert(syst.name().to_string(), syst);
        Ok(())
    }

    pub fn nominal(&self) -> &Arc<dyn Measurement> {
        &self.nominal
    }

    pub fn systematics(&self) -> &SystematicMap {
        &self.systematics
    }

    pub fn systematic_names(&self) -> Vec<String> {
        self.systematics.keys().cloned().collect()
    }

    pub fn data(&self) -> &Histogram {
        &self.data
    }

    /// Central value and total uncertainty band.
    pub fn result(
        &self,
        propagator: &dyn UncertaintyPropagator,
    ) -> Result<(Histogram, Systematic<Histogram>)> {
        tracing::info!(
            propagator = propagator.name(),
            systematics = self.systematics.len(),
            nbins = self.data.nbins(),
            "computing analysis result"
        );
        propagator.propagate(self.nominal.as_ref(), &self.systematics, &self.data)
    }

    /// Nominal measurement evaluated against data.
    pub fn cross_section(&self) -> Result<Histogram> {
        self.nominal.eval(&self.data)
    }

    /// Every universe of one systematic evaluated against data.
    pub fn shifted_cross_section(&self, name: &str) -> Result<Systematic<Histogram>> {
        self.systematics
            .get(name)
            .ok_or_else(|| XsecError::UnknownSystematic(name.to_string()))?
            .eval(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{SignalOnly, SimpleSignalEstimator};
    use crate::propagate::SimpleQuadSum;

    fn h(values: &[f64]) -> Histogram {
        let edges = (0..=values.len()).map(|i| i as f64).collect();
        Histogram::from_counts(edges, values.to_vec()).unwrap()
    }

    fn bkg(values: &[f64]) -> Arc<dyn Measurement> {
        Arc::new(SignalOnly::new(Arc::new(SimpleSignalEstimator::new(h(values)))))
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut ana = Analysis::new(bkg(&[1.0]), h(&[10.0]));
        ana.add_systematic(Systematic::one_sided("bkg", bkg(&[2.0]))).unwrap();
        let err = ana
            .add_systematic(Systematic::one_sided("bkg", bkg(&[3.0])))
            .unwrap_err();
        assert!(matches!(err, XsecError::DuplicateName(name) if name == "bkg"));
        assert_eq!(ana.systematic_names(), vec!["bkg".to_string()]);
    }

    #[test]
    fn result_and_shifted_values() {
        let ana = Analysis::with_systematics(
            bkg(&[10.0, 20.0]),
            vec![Systematic::two_sided("bkg", bkg(&[0.0, 30.0]), bkg(&[20.0, 10.0]))],
            h(&[100.0, 200.0]),
        )
        .unwrap();

        assert_eq!(ana.cross_section().unwrap().contents(), &[90.0, 180.0]);
        let shifted = ana.shifted_cross_section("bkg").unwrap();
        assert_eq!(shifted.up().unwrap().contents(), &[100.0, 170.0]);

        let (central, band) = ana.result(&SimpleQuadSum::new()).unwrap();
        assert_eq!(central.contents(), &[90.0, 180.0]);
        assert_eq!(band.up().unwrap().contents(), &[10.0, 10.0]);

        assert!(matches!(
            ana.shifted_cross_section("nope"),
            Err(XsecError::UnknownSystematic(_))
        ));
    }
}
