//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the systematic kind (`SystType`)
//! - propagator selection and run configuration (`PropagatorKind`, `RunConfig`, `DemoConfig`)
//! - exported result records (`ResultFile`, `BinSummary`)

pub mod types;

pub use types::*;
