//! `xsec-ana` library crate.
//!
//! The binary (`xsec`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - measurements and propagators are reusable from other tools
//! - code stays easy to navigate as the project grows
//!
//! Layout, bottom-up:
//!
//! - `hist`: binned values with variances and bin-wise arithmetic
//! - `systematic`: named sets of shifted universes
//! - `measurement`: calculator traits, cross sections and their ratio
//! - `math` / `fit`: covariance, generalised least squares, template fits
//! - `propagate`: uncertainty propagators
//! - `analysis`: nominal + systematics + data, with persistence

pub mod analysis;
pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod hist;
pub mod io;
pub mod math;
pub mod measurement;
pub mod propagate;
pub mod report;
pub mod systematic;
