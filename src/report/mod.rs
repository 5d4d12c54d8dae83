//! Terminal reporting for propagated results and saved analyses.

pub mod format;

pub use format::*;
