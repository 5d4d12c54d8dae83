//! Template fitting.
//!
//! Responsibilities:
//!
//! - assemble the fit covariance (systematic, statistical, explicit noise)
//! - solve for template normalisations, optionally holding some fixed
//! - fit shared normalisations across several samples (`joint`)

pub mod fitter;
pub mod joint;

pub use fitter::*;
pub use joint::*;
