//! Input/output helpers.
//!
//! - hierarchical analysis store (`store`)
//! - result exports (CSV/JSON) (`export`)

pub mod export;
pub mod store;

pub use export::*;
pub use store::*;
