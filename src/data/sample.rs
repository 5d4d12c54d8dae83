//! Synthetic analysis generation for demos and end-to-end tests.
//!
//! The generated analysis measures a differential cross section over a
//! neutrino-energy-like axis on `[0, 5]`:
//!
//! - signal: a Gaussian peak on a small flat floor
//! - backgrounds: a falling neutral-current shape plus a flat cosmic rate
//! - data: the sum of both with Gaussian fluctuations of width `sqrt(N)`
//! - detector smearing: a tridiagonal response matrix
//!
//! Three systematics are attached: a one-sided detector response shift, a
//! two-sided flux normalisation and a multiverse of background
//! normalisations.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::analysis::Analysis;
use crate::domain::DemoConfig;
use crate::error::{Result, XsecError};
use crate::hist::Histogram;
use crate::measurement::{
    CrossSection, MatrixUnfold, Measurement, SimpleEfficiency, SimpleFlux, TemplateSignalEstimator,
};
use crate::systematic::Systematic;

const AXIS_MIN: f64 = 0.0;
const AXIS_MAX: f64 = 5.0;

/// Generated (not selected) events per efficiency bin.
const GENERATED: f64 = 10_000.0;
const FLUX_PER_BIN: f64 = 1e10;
const NTARGETS: f64 = 1e29;

/// Relative width of the background normalisation spread.
const BKG_SPREAD: f64 = 0.1;

/// Build the demo analysis described in the module docs.
pub fn generate_demo(config: &DemoConfig) -> Result<Analysis> {
    if config.nbins < 2 {
        return Err(XsecError::InvalidHistogram(format!(
            "demo needs at least 2 bins, got {}",
            config.nbins
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| XsecError::InvalidHistogram(format!("noise distribution error: {e}")))?;

    let binning = Histogram::uniform(config.nbins, AXIS_MIN, AXIS_MAX)?;
    let centers: Vec<f64> = binning.edges().windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
    let shape = |f: &dyn Fn(f64) -> f64| -> Result<Histogram> {
        Histogram::from_counts(binning.edges().to_vec(), centers.iter().map(|&x| f(x)).collect())
    };

    let signal = shape(&|x| 1000.0 * (-(x - 2.0).powi(2) / 0.8).exp() + 50.0)?;
    let nc = shape(&|x| 300.0 * (-x / 1.5).exp())?;
    let cosmic = shape(&|_| 20.0)?;

    let expected = signal.add_hist(&nc)?.add_hist(&cosmic)?;
    let observed = expected
        .contents()
        .iter()
        .map(|&n| (n + n.sqrt() * normal.sample(&mut rng)).max(0.0).round())
        .collect();
    let data = Histogram::from_counts(binning.edges().to_vec(), observed)?;

    let selected = shape(&|x| GENERATED * (0.55 + 0.1 * x.sin()))?;
    let generated = shape(&|_| GENERATED)?;
    let efficiency = Arc::new(SimpleEfficiency::new(selected, generated)?);
    let flux = shape(&|_| FLUX_PER_BIN)?;

    let response = Arc::new(MatrixUnfold::new(&smearing(config.nbins, 0.8))?);
    let estimator = |nc_scale: f64| -> Result<Arc<TemplateSignalEstimator>> {
        let mut bkgs = BTreeMap::new();
        bkgs.insert("cosmic".to_string(), cosmic.clone());
        bkgs.insert("nc".to_string(), nc.scale(nc_scale));
        Ok(Arc::new(TemplateSignalEstimator::new(signal.clone(), bkgs)?))
    };
    let xsec = |est: Arc<TemplateSignalEstimator>,
                unfold: Arc<MatrixUnfold>,
                flux_scale: f64|
     -> Arc<dyn Measurement> {
        Arc::new(
            CrossSection::new(
                efficiency.clone(),
                est,
                Arc::new(SimpleFlux::new(flux.scale(flux_scale))),
                unfold,
                NTARGETS,
            )
            .differential(),
        )
    };

    let nominal = xsec(estimator(1.0)?, response.clone(), 1.0);

    let detector = Systematic::one_sided(
        "detector_response",
        xsec(
            estimator(1.0)?,
            Arc::new(MatrixUnfold::new(&smearing(config.nbins, 0.75))?),
            1.0,
        ),
    );
    let flux_norm = Systematic::two_sided(
        "flux_norm",
        xsec(estimator(1.0)?, response.clone(), 1.05),
        xsec(estimator(1.0)?, response.clone(), 0.95),
    );
    let universes = (0..config.universes)
        .map(|_| {
            let k = 1.0 + BKG_SPREAD * normal.sample(&mut rng);
            Ok(xsec(estimator(k.max(0.0))?, response.clone(), 1.0))
        })
        .collect::<Result<Vec<_>>>()?;
    let bkg_model = Systematic::multiverse("bkg_model", universes)?;

    tracing::debug!(
        seed = config.seed,
        nbins = config.nbins,
        universes = config.universes,
        "generated demo analysis"
    );
    Analysis::with_systematics(nominal, [detector, flux_norm, bkg_model], data)
}

/// Tridiagonal response with `diag` on the diagonal, rest shared by the
/// neighbours, columns normalised.
fn smearing(n: usize, diag: f64) -> Vec<Vec<f64>> {
    let off = (1.0 - diag) / 2.0;
    let mut rows = vec![vec![0.0; n]; n];
    for j in 0..n {
        rows[j][j] = diag;
        if j > 0 {
            rows[j - 1][j] = off;
        }
        if j + 1 < n {
            rows[j + 1][j] = off;
        }
    }
    rows
}
