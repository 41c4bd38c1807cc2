//! Report rendering for the reporting plugins.

pub mod generator;

pub use generator::*;
