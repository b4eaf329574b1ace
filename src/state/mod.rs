//! Checker-wide counters and timings

pub mod metrics;

pub use metrics::{MetricSummary, Metrics};
