//! Input generation.
//!
//! Analyses normally arrive as saved stores. The synthetic generator here
//! builds a complete one in memory for demos and end-to-end tests.

pub mod sample;

pub use sample::*;
