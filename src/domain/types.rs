//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - used in-memory during propagation
//! - persisted alongside an analysis
//! - exported to JSON for downstream scripts

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::hist::Histogram;

/// How many alternate universes a systematic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystType {
    /// A single shifted universe.
    OneSided,
    /// Exactly two universes, ordered `[up, down]`.
    TwoSided,
    /// An ensemble of `N >= 1` unordered universes.
    Multiverse,
}

impl SystType {
    /// Whether `n` universes is a legal count for this kind.
    pub fn accepts(self, n: usize) -> bool {
        match self {
            SystType::OneSided => n == 1,
            SystType::TwoSided => n == 2,
            SystType::Multiverse => n >= 1,
        }
    }

    /// Human-readable cardinality rule, used in error messages.
    pub fn cardinality(self) -> &'static str {
        match self {
            SystType::OneSided => "exactly 1",
            SystType::TwoSided => "exactly 2",
            SystType::Multiverse => "at least 1",
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            SystType::OneSided => "onesided",
            SystType::TwoSided => "twosided",
            SystType::Multiverse => "multiverse",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "onesided" => Some(SystType::OneSided),
            "twosided" => Some(SystType::TwoSided),
            "multiverse" => Some(SystType::Multiverse),
            _ => None,
        }
    }
}

impl fmt::Display for SystType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SystType::OneSided => "OneSided",
            SystType::TwoSided => "TwoSided",
            SystType::Multiverse => "Multiverse",
        })
    }
}

/// Which uncertainty propagator to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PropagatorKind {
    /// Independent quadrature sum with symmetrized shifts.
    Quad,
    /// Quadrature sum keeping upward and downward shifts apart.
    QuadAsymm,
    /// Covariance-weighted template fit.
    TemplateFit,
}

impl PropagatorKind {
    pub fn display_name(self) -> &'static str {
        match self {
            PropagatorKind::Quad => "SimpleQuadSum",
            PropagatorKind::QuadAsymm => "SimpleQuadSum (asymmetric)",
            PropagatorKind::TemplateFit => "TemplateFit",
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub analysis_path: PathBuf,
    pub group: String,
    pub propagator: PropagatorKind,

    /// Add the data variances to the fit covariance.
    pub include_stat: bool,
    /// Explicit diagonal added to the fit covariance (0 disables).
    pub noise: f64,
    /// Templates held at a fixed weight, as `(label, weight)`.
    pub fixed: Vec<(String, f64)>,
    /// Bins left out of the template fit.
    pub masked_bins: Vec<usize>,

    pub export: Option<PathBuf>,
    pub export_csv: Option<PathBuf>,
}

/// Configuration of a joint template fit over several stored analyses.
#[derive(Debug, Clone)]
pub struct JointConfig {
    pub analysis_path: PathBuf,
    /// Groups fitted together; at least two.
    pub groups: Vec<String>,
    pub include_stat: bool,
    pub noise: f64,
    pub fixed: Vec<(String, f64)>,
    pub masked_bins: Vec<usize>,
}

/// Settings for the synthetic demo analysis.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub seed: u64,
    pub nbins: usize,
    /// Universes in the multiverse systematic.
    pub universes: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            nbins: 10,
            universes: 50,
        }
    }
}

/// Per-bin view of a propagated result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinSummary {
    pub low: f64,
    pub high: f64,
    pub value: f64,
    pub stat_error: f64,
    pub syst_up: f64,
    pub syst_down: f64,
}

/// A saved result file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub propagator: PropagatorKind,
    pub systematics: Vec<String>,
    pub central: Histogram,
    pub uncertainty_up: Histogram,
    pub uncertainty_down: Histogram,
    pub bins: Vec<BinSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syst_type_cardinality_rules() {
        assert!(SystType::OneSided.accepts(1));
        assert!(!SystType::OneSided.accepts(2));
        assert!(SystType::TwoSided.accepts(2));
        assert!(!SystType::TwoSided.accepts(1));
        assert!(!SystType::TwoSided.accepts(3));
        assert!(SystType::Multiverse.accepts(1));
        assert!(SystType::Multiverse.accepts(500));
        assert!(!SystType::Multiverse.accepts(0));
    }

    #[test]
    fn syst_type_tags_round_trip() {
        for kind in [SystType::OneSided, SystType::TwoSided, SystType::Multiverse] {
            assert_eq!(SystType::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(SystType::from_tag("kTwoSided"), None);
    }
}
