//! Systematic uncertainty sources.
//!
//! - `container`: the generic `Systematic<T>` and its shape-preserving maps
//! - `shift`: n-sigma interpolation of multiverse ensembles

pub mod container;
pub mod shift;

pub use container::*;
pub use shift::*;
