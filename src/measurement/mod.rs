//! Measurements and their building blocks.
//!
//! - `traits`: the `Measurement` contract and the four component capabilities
//! - `simple`: built-in efficiency, flux, background and identity unfolding
//! - `unfold`: response-matrix unfolding
//! - `templates`: template-based signal estimation
//! - `cross_section`: cross sections and their ratios
//! - `signal_only`: a signal estimator evaluated on its own
//! - `loader`: reconstruction of built-in types from persisted groups

pub mod cross_section;
pub mod loader;
pub mod signal_only;
pub mod simple;
pub mod templates;
pub mod traits;
pub mod unfold;

pub use cross_section::*;
pub use loader::*;
pub use signal_only::*;
pub use simple::*;
pub use templates::*;
pub use traits::*;
pub use unfold::*;
