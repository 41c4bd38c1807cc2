//! Analysis helpers shared by the reporting plugins.

pub mod aggregator;

pub use aggregator::*;
