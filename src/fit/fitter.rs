//! Template normalisation fit.
//!
//! Given:
//! - labelled templates `T_k` (signal first)
//! - observed data `d`
//! - a factorised covariance `C`
//!
//! we solve the generalised least squares problem for the weights `w_k` that
//! best describe `d ≈ Σ w_k T_k`.
//!
//! Templates can be fixed at a given normalisation. A fixed template is moved
//! to the data side (`d - w_fixed T_fixed`) and dropped from the free
//! parameters, so the remaining fit stays an unconstrained GLS problem. With
//! every template fixed only `χ²` is evaluated.
//!
//! Masked bins are removed from data, templates and covariance before the
//! solve; they do not count towards the degrees of freedom.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{DMatrix, DVector};

use crate::domain::SystType;
use crate::error::{Result, XsecError};
use crate::hist::Histogram;
use crate::math::{CovarianceFactor, diagonal, systematic_covariance};
use crate::measurement::TemplateSet;

/// Options that affect how the templates are fitted.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Add the data variances to the covariance.
    pub include_stat: bool,
    /// Explicit diagonal term added to every bin (0 disables).
    pub noise: f64,
    /// Templates held at a fixed weight, by label.
    pub fixed: BTreeMap<String, f64>,
    /// Bins left out of the fit.
    pub masked: BTreeSet<usize>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            include_stat: true,
            noise: 0.0,
            fixed: BTreeMap::new(),
            masked: BTreeSet::new(),
        }
    }
}

impl FitOptions {
    /// Let a fixed template float again. Returns its former weight.
    pub fn release(&mut self, label: &str) -> Option<f64> {
        self.fixed.remove(label)
    }

    /// Indices of the bins that take part in a fit over `nbins` bins.
    pub fn used_bins(&self, nbins: usize) -> Result<Vec<usize>> {
        if let Some(&bin) = self.masked.iter().find(|&&b| b >= nbins) {
            return Err(XsecError::InvalidHistogram(format!(
                "masked bin {bin} is out of range for {nbins} bins"
            )));
        }
        let used: Vec<usize> = (0..nbins).filter(|b| !self.masked.contains(b)).collect();
        if used.is_empty() {
            return Err(XsecError::InvalidHistogram("every bin is masked".into()));
        }
        Ok(used)
    }
}

/// Best-fit template weights.
#[derive(Debug, Clone)]
pub struct TemplateFitResult {
    pub labels: Vec<String>,
    pub weights: Vec<f64>,
    /// `sqrt(F⁻¹ᵢᵢ)`, zero for fixed templates.
    pub errors: Vec<f64>,
    pub fixed: Vec<bool>,
    pub chi2: f64,
    /// Unmasked bins minus free templates.
    pub ndof: usize,
}

impl TemplateFitResult {
    pub fn signal_weight(&self) -> f64 {
        self.weights[0]
    }

    pub fn signal_error(&self) -> f64 {
        self.errors[0]
    }

    pub fn weight(&self, label: &str) -> Option<f64> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.weights[i])
    }
}

/// Sum of all templates, the total prediction for the data.
pub fn total_prediction(templates: &TemplateSet) -> Result<Histogram> {
    let mut iter = templates.templates().iter();
    let first = iter
        .next()
        .ok_or(XsecError::IncompleteMeasurement { component: "templates" })?;
    iter.try_fold(first.clone(), |acc, h| acc.add_hist(h))
}

/// Build the fit covariance over the unmasked bins.
///
/// `systematics` holds, per systematic, its kind and the total template
/// prediction of every universe; deltas are taken against `nominal`.
pub fn fit_covariance(
    opts: &FitOptions,
    nominal: &Histogram,
    systematics: &[(SystType, Vec<Histogram>)],
    data: &Histogram,
) -> Result<DMatrix<f64>> {
    nominal.check_binning(data)?;
    let n = nominal.nbins();
    let used = opts.used_bins(n)?;
    let mut cov = DMatrix::zeros(n, n);

    for (kind, universes) in systematics {
        let deltas = universes
            .iter()
            .map(|u| {
                let d = u.sub_hist(nominal)?;
                Ok(DVector::from_row_slice(d.contents()))
            })
            .collect::<Result<Vec<_>>>()?;
        if !deltas.is_empty() {
            cov += systematic_covariance(*kind, &deltas);
        }
    }
    if opts.include_stat {
        cov += diagonal(data.variances());
    }
    if opts.noise != 0.0 {
        cov += DMatrix::identity(n, n) * opts.noise;
    }
    if used.len() < n {
        cov = cov.select_rows(&used).select_columns(&used);
    }
    Ok(cov)
}

pub(crate) fn check_template_binning(templates: &TemplateSet, data: &Histogram) -> Result<()> {
    for (label, h) in templates.labels().iter().zip(templates.templates()) {
        data.check_binning(h).map_err(|e| match e {
            XsecError::BinningMismatch(msg) => {
                XsecError::BinningMismatch(format!("template '{label}': {msg}"))
            }
            other => other,
        })?;
    }
    Ok(())
}

/// Fit `templates` to `data` under the factorised covariance.
pub fn fit_templates(
    opts: &FitOptions,
    templates: &TemplateSet,
    data: &Histogram,
    cov: &CovarianceFactor,
) -> Result<TemplateFitResult> {
    check_template_binning(templates, data)?;
    let used = opts.used_bins(data.nbins())?;

    let design = DMatrix::from_fn(used.len(), templates.len(), |row, col| {
        templates.templates()[col].value(used[row])
    });
    let target = DVector::from_iterator(used.len(), used.iter().map(|&b| data.value(b)));
    solve_weights(opts, templates.labels(), &design, target, cov)
}

/// Solve for the weights of every column of `design` (one per label) against
/// `target`, honouring the fixed templates in `opts`.
pub(crate) fn solve_weights(
    opts: &FitOptions,
    labels: &[String],
    design: &DMatrix<f64>,
    mut target: DVector<f64>,
    cov: &CovarianceFactor,
) -> Result<TemplateFitResult> {
    for label in opts.fixed.keys() {
        if !labels.contains(label) {
            return Err(XsecError::UnknownTemplate(label.clone()));
        }
    }

    let k = labels.len();
    let fixed: Vec<bool> = labels.iter().map(|l| opts.fixed.contains_key(l)).collect();
    let mut weights = vec![0.0; k];
    let mut errors = vec![0.0; k];

    // Move fixed templates to the data side.
    for (i, label) in labels.iter().enumerate() {
        if let Some(&w) = opts.fixed.get(label) {
            target -= design.column(i) * w;
            weights[i] = w;
        }
    }

    let free: Vec<usize> = (0..k).filter(|&i| !fixed[i]).collect();
    let chi2 = if free.is_empty() {
        cov.chi2(&target)?
    } else {
        let sol = cov.solve(&design.select_columns(&free), &target)?;
        for (col, &i) in free.iter().enumerate() {
            weights[i] = sol.params[col];
            errors[i] = sol.error(col);
        }
        sol.chi2
    };

    tracing::debug!(
        templates = k,
        free = free.len(),
        bins = target.len(),
        chi2,
        signal_weight = weights.first().copied().unwrap_or_default(),
        "template fit"
    );

    Ok(TemplateFitResult {
        labels: labels.to_vec(),
        weights,
        errors,
        fixed,
        chi2,
        ndof: target.len().saturating_sub(free.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(values: &[f64]) -> Histogram {
        let edges = (0..=values.len()).map(|i| i as f64).collect();
        Histogram::from_counts(edges, values.to_vec()).unwrap()
    }

    fn set() -> TemplateSet {
        TemplateSet::new(
            ("signal".into(), h(&[10.0, 30.0, 20.0, 5.0])),
            vec![("bkg".to_string(), h(&[8.0, 4.0, 2.0, 6.0]))],
        )
        .unwrap()
    }

    fn data_for(ws: f64, wb: f64) -> Histogram {
        let s = [10.0, 30.0, 20.0, 5.0];
        let b = [8.0, 4.0, 2.0, 6.0];
        h(&(0..4).map(|i| ws * s[i] + wb * b[i]).collect::<Vec<_>>())
    }

    #[test]
    fn recovers_known_normalisations() {
        let templates = set();
        let data = data_for(1.3, 0.7);
        let opts = FitOptions::default();
        let cov = fit_covariance(&opts, &total_prediction(&templates).unwrap(), &[], &data).unwrap();
        let fit = fit_templates(&opts, &templates, &data, &CovarianceFactor::new(&cov).unwrap())
            .unwrap();
        assert!((fit.signal_weight() - 1.3).abs() < 1e-9);
        assert!((fit.weight("bkg").unwrap() - 0.7).abs() < 1e-9);
        assert!(fit.chi2 < 1e-12);
        assert!(fit.signal_error() > 0.0);
        assert_eq!(fit.ndof, 2);
    }

    #[test]
    fn fixed_template_stays_fixed() {
        let templates = set();
        let data = data_for(1.3, 0.7);
        let mut opts = FitOptions::default();
        opts.fixed.insert("bkg".into(), 0.7);
        let cov = fit_covariance(&opts, &total_prediction(&templates).unwrap(), &[], &data).unwrap();
        let fit = fit_templates(&opts, &templates, &data, &CovarianceFactor::new(&cov).unwrap())
            .unwrap();
        assert_eq!(fit.weight("bkg"), Some(0.7));
        assert_eq!(fit.errors[1], 0.0);
        assert!(fit.fixed[1]);
        assert!((fit.signal_weight() - 1.3).abs() < 1e-9);
        assert_eq!(fit.ndof, 3);
    }

    #[test]
    fn unknown_fixed_label_rejected() {
        let templates = set();
        let data = data_for(1.0, 1.0);
        let mut opts = FitOptions::default();
        opts.fixed.insert("cosmics".into(), 1.0);
        let cov = fit_covariance(&opts, &total_prediction(&templates).unwrap(), &[], &data).unwrap();
        let err = fit_templates(&opts, &templates, &data, &CovarianceFactor::new(&cov).unwrap())
            .unwrap_err();
        assert!(matches!(err, XsecError::UnknownTemplate(label) if label == "cosmics"));
    }

    #[test]
    fn every_template_fixed_evaluates_chi2() {
        let templates = set();
        let data = data_for(1.3, 0.7);
        let mut opts = FitOptions::default();
        opts.fixed.insert("signal".into(), 1.0);
        opts.fixed.insert("bkg".into(), 0.7);
        let cov = fit_covariance(&opts, &total_prediction(&templates).unwrap(), &[], &data).unwrap();
        let fit = fit_templates(&opts, &templates, &data, &CovarianceFactor::new(&cov).unwrap())
            .unwrap();
        assert_eq!(fit.weights, vec![1.0, 0.7]);
        assert_eq!(fit.errors, vec![0.0, 0.0]);
        assert_eq!(fit.ndof, 4);
        // residual is 0.3 * signal, measured against the data variances
        let expected: f64 = [10.0, 30.0, 20.0, 5.0]
            .iter()
            .zip(data.variances())
            .map(|(s, v)| (0.3 * s) * (0.3 * s) / v)
            .sum();
        assert!((fit.chi2 - expected).abs() < 1e-9);
    }

    #[test]
    fn released_template_floats_again() {
        let mut opts = FitOptions::default();
        opts.fixed.insert("bkg".into(), 2.0);
        assert_eq!(opts.release("bkg"), Some(2.0));
        assert_eq!(opts.release("bkg"), None);

        let templates = set();
        let data = data_for(1.3, 0.7);
        let cov = fit_covariance(&opts, &total_prediction(&templates).unwrap(), &[], &data).unwrap();
        let fit = fit_templates(&opts, &templates, &data, &CovarianceFactor::new(&cov).unwrap())
            .unwrap();
        assert!(!fit.fixed[1]);
        assert!((fit.weight("bkg").unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn masked_bins_are_left_out() {
        let templates = set();
        // an outlier in bin 3 would pull the fit if it were used
        let mut data = data_for(1.3, 0.7).contents().to_vec();
        data[3] += 40.0;
        let data = h(&data);

        let mut opts = FitOptions::default();
        opts.masked.insert(3);
        let cov = fit_covariance(&opts, &total_prediction(&templates).unwrap(), &[], &data).unwrap();
        assert_eq!(cov.nrows(), 3);
        let fit = fit_templates(&opts, &templates, &data, &CovarianceFactor::new(&cov).unwrap())
            .unwrap();
        assert!((fit.signal_weight() - 1.3).abs() < 1e-9);
        assert!((fit.weight("bkg").unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(fit.ndof, 1);
    }

    #[test]
    fn mask_must_leave_bins_in_range() {
        let mut opts = FitOptions::default();
        opts.masked.insert(4);
        assert!(matches!(opts.used_bins(4), Err(XsecError::InvalidHistogram(_))));

        let mut all = FitOptions::default();
        all.masked.extend(0..2);
        assert!(matches!(all.used_bins(2), Err(XsecError::InvalidHistogram(_))));
        assert_eq!(FitOptions::default().used_bins(3).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn covariance_collects_systematics_stat_and_noise() {
        let nominal = h(&[10.0, 10.0]);
        let data = h(&[4.0, 9.0]);
        let opts = FitOptions {
            include_stat: true,
            noise: 0.5,
            ..FitOptions::default()
        };
        let systs = vec![(SystType::OneSided, vec![h(&[12.0, 10.0])])];
        let cov = fit_covariance(&opts, &nominal, &systs, &data).unwrap();
        assert_eq!(cov, DMatrix::from_row_slice(2, 2, &[8.5, 0.0, 0.0, 9.5]));

        let bare = FitOptions {
            include_stat: false,
            ..FitOptions::default()
        };
        let zero = fit_covariance(&bare, &nominal, &[], &data).unwrap();
        assert!(matches!(
            CovarianceFactor::new(&zero),
            Err(XsecError::SingularMatrix(_))
        ));
    }
}
