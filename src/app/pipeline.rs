//! Shared "run pipeline" logic.
//!
//! Keeping this in one place avoids duplicating the core workflow between the
//! binary and the integration tests:
//! load store -> rebuild analysis -> propagate -> per-bin summary
//!
//! Front-ends can then focus on presentation.

use std::collections::BTreeMap;
use std::path::Path;

use crate::analysis::Analysis;
use crate::domain::{BinSummary, JointConfig, PropagatorKind, RunConfig};
use crate::error::{AppError, XsecError};
use crate::fit::{FitOptions, TemplateFitResult};
use crate::hist::Histogram;
use crate::io::{bin_summaries, read_store};
use crate::measurement::load_builtin;
use crate::propagate::{SimpleQuadSum, TemplateFit, UncertaintyPropagator};
use crate::systematic::Systematic;

/// All computed outputs of a single `xsec run`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub analysis: Analysis,
    pub central: Histogram,
    pub total: Systematic<Histogram>,
    pub bins: Vec<BinSummary>,
    /// Nominal fit parameters, for the template-fit propagator only.
    pub fit: Option<TemplateFitResult>,
}

/// Rebuild the analysis saved under `group` in the store at `path`.
pub fn load_analysis(path: &Path, group: &str) -> Result<Analysis, AppError> {
    let root = read_store(path)?;
    Ok(Analysis::load_from(&root, group, load_builtin)?)
}

/// The propagator selected by `config`.
pub fn build_propagator(config: &RunConfig) -> Box<dyn UncertaintyPropagator> {
    match config.propagator {
        PropagatorKind::Quad => Box::new(SimpleQuadSum::new()),
        PropagatorKind::QuadAsymm => Box::new(SimpleQuadSum::asymmetric()),
        PropagatorKind::TemplateFit => Box::new(template_fit(config)),
    }
}

fn fit_options(
    include_stat: bool,
    noise: f64,
    fixed: &[(String, f64)],
    masked: &[usize],
) -> FitOptions {
    FitOptions {
        include_stat,
        noise,
        fixed: fixed.iter().cloned().collect(),
        masked: masked.iter().copied().collect(),
    }
}

fn template_fit(config: &RunConfig) -> TemplateFit {
    TemplateFit::with_options(fit_options(
        config.include_stat,
        config.noise,
        &config.fixed,
        &config.masked_bins,
    ))
}

/// Execute the full pipeline and return the computed outputs.
pub fn run_analysis(config: &RunConfig) -> Result<RunOutput, AppError> {
    let analysis = load_analysis(&config.analysis_path, &config.group)?;
    run_loaded(config, analysis)
}

/// Execute the pipeline on an analysis already in memory.
pub fn run_loaded(config: &RunConfig, analysis: Analysis) -> Result<RunOutput, AppError> {
    let (central, total, fit) = match config.propagator {
        // the nominal fit comes out of the propagation itself
        PropagatorKind::TemplateFit => {
            let (central, total, fit) = template_fit(config).propagate_with_fit(
                analysis.nominal().as_ref(),
                analysis.systematics(),
                analysis.data(),
            )?;
            (central, total, Some(fit))
        }
        _ => {
            let (central, total) = analysis.result(build_propagator(config).as_ref())?;
            (central, total, None)
        }
    };
    let bins = bin_summaries(&central, &total)?;

    Ok(RunOutput {
        analysis,
        central,
        total,
        bins,
        fit,
    })
}

/// Fit shared template normalisations to several analyses in one store.
pub fn run_joint(config: &JointConfig) -> Result<TemplateFitResult, AppError> {
    if config.groups.len() < 2 {
        return Err(AppError::new(2, "a joint fit needs at least two groups"));
    }
    let root = read_store(&config.analysis_path)?;
    let fit = TemplateFit::with_options(fit_options(
        config.include_stat,
        config.noise,
        &config.fixed,
        &config.masked_bins,
    ));

    let mut samples = BTreeMap::new();
    for group in &config.groups {
        if samples.contains_key(group) {
            return Err(XsecError::DuplicateName(group.clone()).into());
        }
        let analysis = Analysis::load_from(&root, group, load_builtin)?;
        let sample = fit.sample(
            analysis.nominal().as_ref(),
            analysis.systematics(),
            analysis.data(),
        )?;
        samples.insert(group.clone(), sample);
    }
    Ok(fit.fit_joint(&samples)?)
}
