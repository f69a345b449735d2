//! Analysis modules.
//!
//! Read-only statistics computed from a finished summary set.

pub mod aggregator;

pub use aggregator::*;
