//! Analyses: a nominal measurement, its systematics and the observed data.
//!
//! - `run`: construction and result computation
//! - `persist`: saving to and loading from a `Group`

pub mod persist;
pub mod run;

pub use persist::*;
pub use run::*;
