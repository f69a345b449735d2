//! Aggregation pipeline: per-workout fan-out and batch scheduling.

pub mod engine;
pub mod scheduler;

pub use engine::AggregationEngine;
pub use scheduler::{BatchReport, BatchScheduler, SchedulerConfig};
