//! End-to-end runs through the library: generate, save, reload, propagate.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use xsec_ana::analysis::Analysis;
use xsec_ana::app::pipeline::{load_analysis, run_analysis, run_joint};
use xsec_ana::data::generate_demo;
use xsec_ana::domain::{DemoConfig, JointConfig, PropagatorKind, RunConfig};
use xsec_ana::hist::Histogram;
use xsec_ana::io::{Group, read_result_json, result_file, write_bins_csv, write_result_json, write_store};
use xsec_ana::measurement::{Measurement, SignalOnly, TemplateSignalEstimator};
use xsec_ana::propagate::{SystematicMap, TemplateFit};

fn save_demo(path: &Path, config: &DemoConfig) -> Analysis {
    let analysis = generate_demo(config).unwrap();
    let mut root = Group::new();
    analysis.save_to(&mut root, "numu").unwrap();
    write_store(path, &root).unwrap();
    analysis
}

/// Bin-wise agreement relative to the larger magnitude.
fn close(a: &Histogram, b: &Histogram, rel: f64) -> bool {
    a.nbins() == b.nbins()
        && a
            .contents()
            .iter()
            .zip(b.contents())
            .all(|(x, y)| (x - y).abs() <= rel * x.abs().max(y.abs()))
}

fn run_config(path: &Path, propagator: PropagatorKind) -> RunConfig {
    RunConfig {
        analysis_path: path.to_path_buf(),
        group: "numu".into(),
        propagator,
        include_stat: true,
        noise: 0.0,
        fixed: Vec::new(),
        masked_bins: Vec::new(),
        export: None,
        export_csv: None,
    }
}

#[test]
fn demo_survives_a_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.json");
    let original = save_demo(&path, &DemoConfig { seed: 3, nbins: 8, universes: 20 });

    let loaded = load_analysis(&path, "numu").unwrap();
    assert_eq!(loaded.systematic_names(), original.systematic_names());
    assert_eq!(loaded.data(), original.data());
    assert!(close(
        &loaded.cross_section().unwrap(),
        &original.cross_section().unwrap(),
        1e-12
    ));
}

#[test]
fn quadrature_propagators_bracket_the_nominal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.json");
    let analysis = save_demo(&path, &DemoConfig::default());
    let nominal = analysis.cross_section().unwrap();

    let quad = run_analysis(&run_config(&path, PropagatorKind::Quad)).unwrap();
    assert!(close(&quad.central, &nominal, 1e-12));
    assert_eq!(quad.bins.len(), nominal.nbins());
    assert_eq!(quad.total.up().unwrap(), quad.total.down().unwrap());
    assert!(quad.fit.is_none());
    for b in &quad.bins {
        assert!(b.syst_up.is_finite() && b.syst_up > 0.0);
    }

    let asym = run_analysis(&run_config(&path, PropagatorKind::QuadAsymm)).unwrap();
    assert!(close(&asym.central, &nominal, 1e-12));
    for b in &asym.bins {
        assert!(b.syst_up >= 0.0 && b.syst_down >= 0.0);
        assert!(b.syst_up.is_finite() && b.syst_down.is_finite());
    }
}

#[test]
fn template_fit_runs_on_the_demo() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.json");
    save_demo(&path, &DemoConfig { seed: 11, nbins: 10, universes: 30 });

    let run = run_analysis(&run_config(&path, PropagatorKind::TemplateFit)).unwrap();
    let fit = run.fit.as_ref().unwrap();
    assert_eq!(fit.labels, vec!["signal", "cosmic", "nc"]);
    // pseudo-data is drawn around unit normalisations
    assert!((fit.signal_weight() - 1.0).abs() < 0.2);
    assert!(run.central.contents().iter().all(|v| v.is_finite()));
    assert!(run.bins.iter().all(|b| b.syst_up.is_finite() && b.syst_up >= 0.0));

    let mut config = run_config(&path, PropagatorKind::TemplateFit);
    config.fixed = vec![("cosmic".into(), 1.0)];
    let fixed = run_analysis(&config).unwrap();
    assert_eq!(fixed.fit.as_ref().unwrap().weight("cosmic"), Some(1.0));
}

#[test]
fn unknown_group_is_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.json");
    save_demo(&path, &DemoConfig { seed: 1, nbins: 4, universes: 3 });

    let err = load_analysis(&path, "nue").unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn exports_are_written_and_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.json");
    save_demo(&path, &DemoConfig { seed: 5, nbins: 6, universes: 10 });
    let run = run_analysis(&run_config(&path, PropagatorKind::Quad)).unwrap();

    let json = dir.path().join("result.json");
    let record = result_file(
        PropagatorKind::Quad,
        run.analysis.systematic_names(),
        &run.central,
        &run.total,
    )
    .unwrap();
    write_result_json(&json, &record).unwrap();
    let back = read_result_json(&json).unwrap();
    assert_eq!(back.propagator, PropagatorKind::Quad);
    assert_eq!(back.bins.len(), 6);
    assert_eq!(back.central, run.central);

    let csv = dir.path().join("bins.csv");
    write_bins_csv(&csv, &run.bins).unwrap();
    let text = std::fs::read_to_string(&csv).unwrap();
    assert_eq!(text.lines().count(), 7);
}

#[test]
fn template_fit_without_systematics_matches_least_squares() {
    let edges: Vec<f64> = (0..=6).map(f64::from).collect();
    let sig = [4.0, 12.0, 25.0, 18.0, 7.0, 2.0];
    let bkg = [9.0, 8.0, 6.0, 5.0, 4.0, 4.0];
    let wiggle = [0.3, -0.2, 0.5, -0.4, 0.1, 0.2];
    let observed: Vec<f64> = (0..6)
        .map(|i| 1.7 * sig[i] + 0.6 * bkg[i] + wiggle[i])
        .collect();
    // uniform data variances make the covariance proportional to the identity
    let data = Histogram::new(edges.clone(), observed.clone(), vec![1.0; 6]).unwrap();

    let mut bkgs = BTreeMap::new();
    bkgs.insert(
        "bkg".to_string(),
        Histogram::from_counts(edges.clone(), bkg.to_vec()).unwrap(),
    );
    let est = TemplateSignalEstimator::new(
        Histogram::from_counts(edges, sig.to_vec()).unwrap(),
        bkgs,
    )
    .unwrap();
    let nominal: Arc<dyn Measurement> = Arc::new(SignalOnly::new(Arc::new(est)));

    let fit = TemplateFit::new()
        .fit(nominal.as_ref(), &SystematicMap::new(), &data)
        .unwrap();

    let x = DMatrix::from_fn(6, 2, |i, j| if j == 0 { sig[i] } else { bkg[i] });
    // unweighted least squares via SVD
    let ols = x
        .svd(true, true)
        .solve(&DVector::from_vec(observed), 1e-12)
        .unwrap();
    assert!((fit.weights[0] - ols[0]).abs() < 1e-8);
    assert!((fit.weights[1] - ols[1]).abs() < 1e-8);
}

#[test]
fn masked_bins_and_fully_fixed_fits_on_the_demo() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.json");
    save_demo(&path, &DemoConfig { seed: 5, nbins: 8, universes: 10 });

    let mut config = run_config(&path, PropagatorKind::TemplateFit);
    config.masked_bins = vec![0, 7];
    let masked = run_analysis(&config).unwrap();
    let fit = masked.fit.as_ref().unwrap();
    assert_eq!(fit.ndof, 6 - 3);
    assert_eq!(masked.bins.len(), 8);

    config.masked_bins = vec![8];
    assert_eq!(run_analysis(&config).unwrap_err().exit_code(), 2);

    let mut fixed = run_config(&path, PropagatorKind::TemplateFit);
    fixed.fixed = vec![
        ("signal".into(), 1.0),
        ("cosmic".into(), 1.0),
        ("nc".into(), 1.0),
    ];
    let run = run_analysis(&fixed).unwrap();
    let fit = run.fit.as_ref().unwrap();
    assert_eq!(fit.weights, vec![1.0, 1.0, 1.0]);
    assert!(fit.chi2.is_finite() && fit.chi2 > 0.0);
    assert_eq!(fit.ndof, 8);
}

#[test]
fn joint_fit_over_two_stored_groups() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("joint.json");
    let mut root = Group::new();
    for (group, seed) in [("first", 21), ("second", 22)] {
        generate_demo(&DemoConfig { seed, nbins: 6, universes: 8 })
            .unwrap()
            .save_to(&mut root, group)
            .unwrap();
    }
    write_store(&path, &root).unwrap();

    let mut config = JointConfig {
        analysis_path: path.clone(),
        groups: vec!["first".into(), "second".into()],
        include_stat: true,
        noise: 0.0,
        fixed: Vec::new(),
        masked_bins: Vec::new(),
    };
    let joint = run_joint(&config).unwrap();
    assert_eq!(joint.labels, vec!["signal", "cosmic", "nc"]);
    assert_eq!(joint.ndof, 12 - 3);
    assert!((joint.signal_weight() - 1.0).abs() < 0.2);

    // twice the data constrains the signal better than either group alone
    let mut single = run_config(&path, PropagatorKind::TemplateFit);
    single.group = "first".into();
    let alone = run_analysis(&single).unwrap();
    assert!(joint.signal_error() < alone.fit.as_ref().unwrap().signal_error());

    config.groups = vec!["first".into()];
    assert_eq!(run_joint(&config).unwrap_err().exit_code(), 2);
    config.groups = vec!["first".into(), "first".into()];
    assert_eq!(run_joint(&config).unwrap_err().exit_code(), 2);
}
