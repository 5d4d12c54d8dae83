//! Linear algebra for the template fit.
//!
//! - `gls`: generalised least squares under a full covariance (Cholesky)
//! - `covariance`: systematic covariance from per-universe deltas

pub mod covariance;
pub mod gls;

pub use covariance::*;
pub use gls::*;
