//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the measurement/propagation code stays free of presentation concerns
//! - output changes are localized

use crate::analysis::Analysis;
use crate::domain::{BinSummary, JointConfig, RunConfig};
use crate::fit::TemplateFitResult;
use crate::propagate::SystematicMap;

/// Header of a `xsec run`: input, propagator and systematics.
pub fn format_run_summary(
    config: &RunConfig,
    systematics: &SystematicMap,
    fit: Option<&TemplateFitResult>,
) -> String {
    let mut out = String::new();

    out.push_str("=== xsec - Cross Section Result ===\n");
    out.push_str(&format!(
        "Analysis: {} (group '{}')\n",
        config.analysis_path.display(),
        config.group
    ));
    out.push_str(&format!("Propagator: {}\n", config.propagator.display_name()));
    out.push_str(&format!("Systematics: {}\n", systematics.len()));
    for (name, syst) in systematics {
        out.push_str(&format!(
            "  - {:<24} {:<10} n={}\n",
            truncate(name, 24),
            syst.kind(),
            syst.len()
        ));
    }

    if let Some(fit) = fit {
        out.push_str("\nTemplate fit:\n");
        out.push_str(&format_fit_parameters(fit));
    }
    out.push('\n');

    out
}

/// Joint fit over several groups of one store.
pub fn format_joint_summary(config: &JointConfig, fit: &TemplateFitResult) -> String {
    let mut out = String::new();
    out.push_str("=== xsec - Joint Template Fit ===\n");
    out.push_str(&format!("Analysis: {}\n", config.analysis_path.display()));
    out.push_str(&format!("Samples: {}\n", config.groups.join(", ")));
    if !config.masked_bins.is_empty() {
        let bins: Vec<String> = config.masked_bins.iter().map(|b| b.to_string()).collect();
        out.push_str(&format!("Masked bins: {}\n", bins.join(", ")));
    }
    out.push('\n');
    out.push_str(&format_fit_parameters(fit));
    out
}

fn format_fit_parameters(fit: &TemplateFitResult) -> String {
    let mut out = String::new();
    for (i, label) in fit.labels.iter().enumerate() {
        let note = if fit.fixed[i] { " (fixed)" } else { "" };
        out.push_str(&format!(
            "  {:<16} w={:.6} +/- {:.6}{note}\n",
            truncate(label, 16),
            fit.weights[i],
            fit.errors[i]
        ));
    }
    out.push_str(&format!("  chi2/ndof = {:.3}/{}\n", fit.chi2, fit.ndof));
    out
}

/// Per-bin table of central value, statistical error and uncertainty band.
pub fn format_bin_table(bins: &[BinSummary]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:>10} {:>10} {:>14} {:>12} {:>12} {:>12} {:>8}\n",
            "low", "high", "value", "stat", "syst_up", "syst_down", "rel_%"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<10} {:-<10} {:-<14} {:-<12} {:-<12} {:-<12} {:-<8}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for b in bins {
        let rel = if b.value != 0.0 {
            format!("{:>8.2}", 100.0 * b.syst_up.max(b.syst_down) / b.value.abs())
        } else {
            format!("{:>8}", "-")
        };
        out.push_str(
            format!(
                "{:>10} {:>10} {:>14} {:>12} {:>12} {:>12} {rel}\n",
                fmt_edge(b.low),
                fmt_edge(b.high),
                fmt_sci(b.value),
                fmt_sci(b.stat_error),
                fmt_sci(b.syst_up),
                fmt_sci(b.syst_down),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Structure of a saved analysis, without evaluating anything.
pub fn format_inspect(analysis: &Analysis) -> String {
    let mut out = String::new();
    let data = analysis.data();

    out.push_str("=== xsec - Analysis ===\n");
    out.push_str(&format!("Nominal: {}\n", analysis.nominal().type_tag()));
    out.push_str(&format!(
        "Data: {} bins on [{}, {}] | integral={}\n",
        data.nbins(),
        fmt_edge(data.edges()[0]),
        fmt_edge(data.edges()[data.nbins()]),
        fmt_sci(data.integral())
    ));
    out.push_str(&format!("Edges: {}\n", fmt_vec(data.edges())));
    if let Some(templates) = analysis.nominal().templates() {
        out.push_str(&format!("Templates: {}\n", templates.labels().join(", ")));
    }

    out.push_str(&format!("\nSystematics ({}):\n", analysis.systematics().len()));
    for (name, syst) in analysis.systematics() {
        out.push_str(&format!(
            "  {:<24} {:<10} universes={}\n",
            truncate(name, 24),
            syst.kind(),
            syst.len()
        ));
    }

    out
}

fn fmt_sci(v: f64) -> String {
    format!("{v:.4e}")
}

fn fmt_edge(v: f64) -> String {
    format!("{v:.4}")
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| fmt_edge(*x)).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
