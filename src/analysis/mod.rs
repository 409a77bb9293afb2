//! Reduction of collected samples into summary statistics.

pub mod stats;

pub use stats::{reduce, MedianRule, ProbeStats, Sample, SampleSet, StatsError};
