//! Command-line parsing for the cross-section tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the measurement/propagation code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::PropagatorKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "xsec", version, about = "Cross-section analysis with systematic uncertainties")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a saved analysis, propagate its systematics and print the result.
    Run(RunArgs),
    /// Fit shared template normalisations to several saved analyses.
    Joint(JointArgs),
    /// Print the structure of a saved analysis without evaluating it.
    Inspect(InspectArgs),
    /// Generate a synthetic analysis and save it.
    Demo(DemoArgs),
}

/// Options for `xsec run`.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Saved analysis store (JSON).
    #[arg(short = 'a', long, value_name = "FILE")]
    pub analysis: PathBuf,

    /// Group inside the store holding the analysis.
    #[arg(short = 'g', long, default_value = "analysis")]
    pub group: String,

    /// Uncertainty propagation strategy.
    #[arg(short = 'p', long, value_enum, default_value_t = PropagatorKind::Quad)]
    pub propagator: PropagatorKind,

    /// Leave the data variances out of the template-fit covariance.
    #[arg(long)]
    pub no_stat: bool,

    /// Constant added to the template-fit covariance diagonal.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Hold a template at a fixed weight (`label=weight`, repeatable).
    #[arg(long = "fix", value_name = "LABEL=WEIGHT", value_parser = parse_fixed)]
    pub fix: Vec<(String, f64)>,

    /// Leave a bin out of the template fit (0-based, repeatable).
    #[arg(long = "mask-bin", value_name = "BIN")]
    pub mask_bin: Vec<usize>,

    /// Export the result (central value, band, per-bin summary) to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Export the per-bin summary to CSV.
    #[arg(long = "export-csv", value_name = "CSV")]
    pub export_csv: Option<PathBuf>,
}

/// Options for `xsec joint`.
#[derive(Debug, Parser, Clone)]
pub struct JointArgs {
    /// Saved analysis store (JSON).
    #[arg(short = 'a', long, value_name = "FILE")]
    pub analysis: PathBuf,

    /// Groups fitted together (repeatable, at least two).
    #[arg(short = 'g', long = "group", required = true)]
    pub groups: Vec<String>,

    /// Leave the data variances out of the fit covariance.
    #[arg(long)]
    pub no_stat: bool,

    /// Constant added to the fit covariance diagonal.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Hold a template at a fixed weight (`label=weight`, repeatable).
    #[arg(long = "fix", value_name = "LABEL=WEIGHT", value_parser = parse_fixed)]
    pub fix: Vec<(String, f64)>,

    /// Leave a bin out of every sample (0-based, repeatable).
    #[arg(long = "mask-bin", value_name = "BIN")]
    pub mask_bin: Vec<usize>,
}

/// Options for `xsec inspect`.
#[derive(Debug, Parser, Clone)]
pub struct InspectArgs {
    /// Saved analysis store (JSON).
    #[arg(short = 'a', long, value_name = "FILE")]
    pub analysis: PathBuf,

    /// Group inside the store holding the analysis.
    #[arg(short = 'g', long, default_value = "analysis")]
    pub group: String,
}

/// Options for `xsec demo`.
#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Output store (JSON).
    #[arg(short = 'o', long, value_name = "FILE")]
    pub out: PathBuf,

    /// Group to save the analysis under.
    #[arg(short = 'g', long, default_value = "analysis")]
    pub group: String,

    /// Random seed for the pseudo-data and universes.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of bins.
    #[arg(long, default_value_t = 10)]
    pub bins: usize,

    /// Universes in the multiverse systematic.
    #[arg(long, default_value_t = 50)]
    pub universes: usize,
}

fn parse_fixed(s: &str) -> Result<(String, f64), String> {
    let (label, weight) = s
        .split_once('=')
        .ok_or_else(|| format!("expected LABEL=WEIGHT, got '{s}'"))?;
    let label = label.trim();
    if label.is_empty() {
        return Err(format!("empty template label in '{s}'"));
    }
    let weight: f64 = weight
        .trim()
        .parse()
        .map_err(|e| format!("invalid weight in '{s}': {e}"))?;
    Ok((label.to_string(), weight))
}
