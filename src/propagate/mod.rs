//! Uncertainty propagation.
//!
//! A propagator evaluates the nominal measurement and every systematic
//! universe against the same data, then combines the differences into a total
//! `[up, down]` uncertainty band.
//!
//! - `quad_sum`: independent systematics added in quadrature
//! - `template_fit`: covariance-weighted refit of template normalisations

pub mod quad_sum;
pub mod template_fit;

pub use quad_sum::*;
pub use template_fit::*;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::hist::Histogram;
use crate::measurement::Measurement;
use crate::systematic::Systematic;

/// Systematics by name, as held by an analysis.
pub type SystematicMap = BTreeMap<String, Systematic<Arc<dyn Measurement>>>;

/// Name of the combined uncertainty returned by every propagator.
pub const TOTAL_NAME: &str = "total";

pub trait UncertaintyPropagator: Send + Sync {
    /// Short human-readable name, used in logs and reports.
    fn name(&self) -> &'static str;

    /// Central value and its total uncertainty as a two-sided `[up, down]`
    /// systematic of absolute (non-negative) per-bin uncertainties.
    fn propagate(
        &self,
        nominal: &dyn Measurement,
        systematics: &SystematicMap,
        data: &Histogram,
    ) -> Result<(Histogram, Systematic<Histogram>)>;
}
