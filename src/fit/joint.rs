//! Joint template fit over several samples.
//!
//! Each sample (say, a signal-enriched and a control selection) has its own
//! templates and data. Templates that share a label share one normalisation,
//! so the control sample constrains the backgrounds seen in the signal sample.
//!
//! The samples are stacked in name order into one long data vector. The
//! covariance is block diagonal in the statistical and noise terms;
//! systematics registered under the same name in several samples are treated
//! as fully correlated, universe by universe. A sample without a given
//! systematic contributes zero deltas to it.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use crate::domain::SystType;
use crate::error::{Result, XsecError};
use crate::fit::fitter::{check_template_binning, solve_weights};
use crate::fit::{FitOptions, TemplateFitResult, fit_covariance, total_prediction};
use crate::hist::Histogram;
use crate::math::{CovarianceFactor, systematic_covariance};
use crate::measurement::TemplateSet;

/// One sample of a joint fit.
#[derive(Debug, Clone)]
pub struct FitSample {
    pub templates: TemplateSet,
    pub data: Histogram,
    /// Per systematic name: kind and the total template prediction of every universe.
    pub systematics: BTreeMap<String, (SystType, Vec<Histogram>)>,
}

/// A sample with its masked bins resolved and its offset in the stacked vector.
struct Block<'a> {
    sample: &'a FitSample,
    used: Vec<usize>,
    offset: usize,
    nominal: Histogram,
}

/// Parameter labels: the first sample's labels in order, then any label first
/// seen in a later sample.
fn joint_labels(samples: &BTreeMap<String, FitSample>) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for sample in samples.values() {
        for label in sample.templates.labels() {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
    }
    labels
}

/// Kind and universe count of every systematic, checked to agree across samples.
fn joint_systematics(
    samples: &BTreeMap<String, FitSample>,
) -> Result<BTreeMap<String, (SystType, usize)>> {
    let mut shapes: BTreeMap<String, (SystType, usize)> = BTreeMap::new();
    for sample in samples.values() {
        for (name, (kind, universes)) in &sample.systematics {
            match shapes.get(name) {
                None => {
                    shapes.insert(name.clone(), (*kind, universes.len()));
                }
                Some(&(k, _)) if k != *kind => {
                    return Err(XsecError::SystematicType {
                        op: "joint fit",
                        name: name.clone(),
                        expected: k.tag(),
                        got: *kind,
                    });
                }
                Some(&(k, count)) if count != universes.len() => {
                    return Err(XsecError::Cardinality {
                        name: name.clone(),
                        kind: k,
                        expected: k.cardinality(),
                        got: universes.len(),
                    });
                }
                Some(_) => {}
            }
        }
    }
    Ok(shapes)
}

/// Covariance of the stacked samples.
pub fn joint_covariance(
    opts: &FitOptions,
    samples: &BTreeMap<String, FitSample>,
) -> Result<DMatrix<f64>> {
    let blocks = blocks(opts, samples)?;
    covariance(opts, samples, &blocks)
}

fn blocks<'a>(
    opts: &FitOptions,
    samples: &'a BTreeMap<String, FitSample>,
) -> Result<Vec<Block<'a>>> {
    if samples.is_empty() {
        return Err(XsecError::IncompleteMeasurement { component: "samples" });
    }
    let mut offset = 0;
    samples
        .iter()
        .map(|(name, sample)| {
            check_template_binning(&sample.templates, &sample.data).map_err(|e| match e {
                XsecError::BinningMismatch(msg) => {
                    XsecError::BinningMismatch(format!("sample '{name}': {msg}"))
                }
                other => other,
            })?;
            let used = opts.used_bins(sample.data.nbins())?;
            let block = Block {
                sample,
                offset,
                nominal: total_prediction(&sample.templates)?,
                used,
            };
            offset += block.used.len();
            Ok(block)
        })
        .collect()
}

fn covariance(
    opts: &FitOptions,
    samples: &BTreeMap<String, FitSample>,
    blocks: &[Block<'_>],
) -> Result<DMatrix<f64>> {
    let n: usize = blocks.iter().map(|b| b.used.len()).sum();
    let mut cov = DMatrix::zeros(n, n);

    // statistical and noise terms, sample by sample
    for b in blocks {
        let m = b.used.len();
        let diag = fit_covariance(opts, &b.nominal, &[], &b.sample.data)?;
        cov.view_mut((b.offset, b.offset), (m, m)).copy_from(&diag);
    }

    for (name, (kind, count)) in joint_systematics(samples)? {
        let deltas = (0..count)
            .map(|u| {
                let mut delta = DVector::zeros(n);
                for b in blocks {
                    let Some((_, universes)) = b.sample.systematics.get(&name) else {
                        continue;
                    };
                    let shift = universes[u].sub_hist(&b.nominal)?;
                    for (row, &bin) in b.used.iter().enumerate() {
                        delta[b.offset + row] = shift.value(bin);
                    }
                }
                Ok(delta)
            })
            .collect::<Result<Vec<_>>>()?;
        if !deltas.is_empty() {
            cov += systematic_covariance(kind, &deltas);
        }
    }
    Ok(cov)
}

/// Fit shared template normalisations to every sample at once.
///
/// The result's labels follow [`joint_labels`]: the first sample's signal
/// comes first, so [`TemplateFitResult::signal_weight`] refers to it.
pub fn fit_joint(
    opts: &FitOptions,
    samples: &BTreeMap<String, FitSample>,
) -> Result<TemplateFitResult> {
    let blocks = blocks(opts, samples)?;
    let factor = CovarianceFactor::new(&covariance(opts, samples, &blocks)?)?;

    let labels = joint_labels(samples);
    let n = factor.dim();
    let mut design = DMatrix::zeros(n, labels.len());
    let mut target = DVector::zeros(n);
    for b in &blocks {
        let templates = &b.sample.templates;
        for (row, &bin) in b.used.iter().enumerate() {
            target[b.offset + row] = b.sample.data.value(bin);
            for (col, label) in labels.iter().enumerate() {
                if let Some(i) = templates.index_of(label) {
                    design[(b.offset + row, col)] = templates.templates()[i].value(bin);
                }
            }
        }
    }

    let fit = solve_weights(opts, &labels, &design, target, &factor)?;
    tracing::info!(
        samples = samples.len(),
        parameters = labels.len(),
        chi2 = fit.chi2,
        ndof = fit.ndof,
        "joint template fit"
    );
    Ok(fit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(values: &[f64]) -> Histogram {
        let edges = (0..=values.len()).map(|i| i as f64).collect();
        Histogram::from_counts(edges, values.to_vec()).unwrap()
    }

    fn combine(parts: &[(f64, &[f64])]) -> Histogram {
        let n = parts[0].1.len();
        h(&(0..n)
            .map(|i| parts.iter().map(|(w, t)| w * t[i]).sum::<f64>())
            .collect::<Vec<_>>())
    }

    const SIG: [f64; 3] = [20.0, 40.0, 10.0];
    const NC_SIG: [f64; 3] = [6.0, 5.0, 4.0];
    const NC_CTRL: [f64; 3] = [30.0, 25.0, 20.0];
    const COSMIC: [f64; 3] = [3.0, 3.0, 3.0];

    fn samples(w_sig: f64, w_nc: f64) -> BTreeMap<String, FitSample> {
        let mut out = BTreeMap::new();
        out.insert(
            "a_signal".to_string(),
            FitSample {
                templates: TemplateSet::new(
                    ("signal".into(), h(&SIG)),
                    vec![("nc".to_string(), h(&NC_SIG))],
                )
                .unwrap(),
                data: combine(&[(w_sig, &SIG[..]), (w_nc, &NC_SIG[..])]),
                systematics: BTreeMap::new(),
            },
        );
        // the control sample has no signal but a second background
        out.insert(
            "b_control".to_string(),
            FitSample {
                templates: TemplateSet::new(
                    ("nc".into(), h(&NC_CTRL)),
                    vec![("cosmic".to_string(), h(&COSMIC))],
                )
                .unwrap(),
                data: combine(&[(w_nc, &NC_CTRL[..]), (1.0, &COSMIC[..])]),
                systematics: BTreeMap::new(),
            },
        );
        out
    }

    #[test]
    fn shared_labels_share_one_weight() {
        let fit = fit_joint(&FitOptions::default(), &samples(1.4, 0.8)).unwrap();
        assert_eq!(fit.labels, vec!["signal", "nc", "cosmic"]);
        assert!((fit.signal_weight() - 1.4).abs() < 1e-9);
        assert!((fit.weight("nc").unwrap() - 0.8).abs() < 1e-9);
        assert!((fit.weight("cosmic").unwrap() - 1.0).abs() < 1e-9);
        assert!(fit.chi2 < 1e-12);
        assert_eq!(fit.ndof, 3);
    }

    #[test]
    fn control_sample_tightens_the_background() {
        let opts = FitOptions::default();
        let joint = fit_joint(&opts, &samples(1.4, 0.8)).unwrap();

        let mut alone = samples(1.4, 0.8);
        alone.remove("b_control");
        let single = fit_joint(&opts, &alone).unwrap();
        let nc = |f: &TemplateFitResult| f.errors[f.labels.iter().position(|l| l == "nc").unwrap()];
        assert!(nc(&joint) < nc(&single));
    }

    #[test]
    fn shared_systematics_are_correlated_across_samples() {
        let mut with = samples(1.0, 1.0);
        for sample in with.values_mut() {
            let shifted = total_prediction(&sample.templates).unwrap().scale(1.05);
            sample
                .systematics
                .insert("flux".into(), (SystType::OneSided, vec![shifted]));
        }
        let opts = FitOptions::default();
        let cov = joint_covariance(&opts, &with).unwrap();
        let bare = joint_covariance(&opts, &samples(1.0, 1.0)).unwrap();
        // off-diagonal block between the two samples is populated
        assert_eq!(bare[(0, 3)], 0.0);
        assert!(cov[(0, 3)] > 0.0);
        assert!(cov[(0, 0)] > bare[(0, 0)]);
    }

    #[test]
    fn systematic_only_in_one_sample_leaves_the_other_alone() {
        let mut with = samples(1.0, 1.0);
        let sample = with.get_mut("b_control").unwrap();
        let shifted = total_prediction(&sample.templates).unwrap().scale(1.1);
        sample
            .systematics
            .insert("det".into(), (SystType::OneSided, vec![shifted]));
        let opts = FitOptions::default();
        let cov = joint_covariance(&opts, &with).unwrap();
        let bare = joint_covariance(&opts, &samples(1.0, 1.0)).unwrap();
        for i in 0..3 {
            for j in 0..6 {
                assert_eq!(cov[(i, j)], bare[(i, j)]);
            }
        }
        assert!(cov[(4, 4)] > bare[(4, 4)]);
    }

    #[test]
    fn mismatched_systematics_are_rejected() {
        let mut bad = samples(1.0, 1.0);
        let a = total_prediction(&bad["a_signal"].templates).unwrap();
        let b = total_prediction(&bad["b_control"].templates).unwrap();
        bad.get_mut("a_signal")
            .unwrap()
            .systematics
            .insert("flux".into(), (SystType::OneSided, vec![a.scale(1.1)]));
        bad.get_mut("b_control").unwrap().systematics.insert(
            "flux".into(),
            (SystType::TwoSided, vec![b.scale(1.1), b.scale(0.9)]),
        );
        let err = fit_joint(&FitOptions::default(), &bad).unwrap_err();
        assert!(matches!(err, XsecError::SystematicType { .. }));
    }

    #[test]
    fn masks_apply_to_every_sample() {
        let mut opts = FitOptions::default();
        opts.masked.insert(2);
        let cov = joint_covariance(&opts, &samples(1.0, 1.0)).unwrap();
        assert_eq!(cov.nrows(), 4);
        let fit = fit_joint(&opts, &samples(1.4, 0.8)).unwrap();
        assert!((fit.signal_weight() - 1.4).abs() < 1e-9);
        assert_eq!(fit.ndof, 1);
    }

    #[test]
    fn no_samples_is_incomplete() {
        let err = fit_joint(&FitOptions::default(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            XsecError::IncompleteMeasurement {
                component: "samples"
            }
        ));
    }
}
