//! Histograms: the binned artifact every measurement consumes and produces.

pub mod histogram;
pub mod reduce;

pub use histogram::*;
pub use reduce::*;
