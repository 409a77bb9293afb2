use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single measured duration in nanoseconds.
pub type Sample = u64;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StatsError {
    #[error("cannot reduce an empty sample set")]
    EmptySampleSet,
}

/// Samples gathered during one probe run, in collection order.
///
/// Only ever appended to while the probe runs; [`reduce`] never reorders it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleSet {
    samples: Vec<Sample>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }
}

impl From<Vec<Sample>> for SampleSet {
    fn from(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

impl FromIterator<Sample> for SampleSet {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

/// Summary of a sample set, every field in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeStats {
    pub min: u64,
    pub median: u64,
    pub mean: u64,
    pub max: u64,
    pub stddev: u64,
}

/// How the median of an even-sized sample set is picked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedianRule {
    /// Output-compatible with the classic `sshping` report: for even `n` both
    /// "middle" indices are computed as `n/2 - 1` and `(n+1)/2 - 1`, which are
    /// equal under integer division, so the lower middle element is reported.
    #[default]
    Reference,
    /// Conventional median: mean of the two middle elements for even `n`.
    Midpoint,
}

/// Reduce `samples` to min / median / mean / max / population standard deviation.
///
/// The mean is the truncated integer mean. Sorting happens on a private copy.
pub fn reduce(samples: &SampleSet, rule: MedianRule) -> Result<ProbeStats, StatsError> {
    let values = samples.as_slice();
    let (&first, rest) = values.split_first().ok_or(StatsError::EmptySampleSet)?;

    let mut min = first;
    let mut max = first;
    let mut sum = u128::from(first);
    for &v in rest {
        min = min.min(v);
        max = max.max(v);
        sum += u128::from(v);
    }

    let n = values.len();
    let mean = (sum / n as u128) as u64;

    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let median = median_of_sorted(&sorted, rule);

    let exact_mean = sum as f64 / n as f64;
    let variance = values
        .iter()
        .map(|&v| {
            let diff = v as f64 - exact_mean;
            diff * diff
        })
        .sum::<f64>()
        / n as f64;
    let stddev = variance.sqrt() as u64;

    Ok(ProbeStats {
        min,
        median,
        mean,
        max,
        stddev,
    })
}

fn median_of_sorted(sorted: &[Sample], rule: MedianRule) -> u64 {
    let n = sorted.len();
    if n % 2 == 1 {
        return sorted[(n + 1) / 2 - 1];
    }
    let (lo, hi) = match rule {
        MedianRule::Reference => (n / 2 - 1, (n + 1) / 2 - 1),
        MedianRule::Midpoint => (n / 2 - 1, n / 2),
    };
    ((u128::from(sorted[lo]) + u128::from(sorted[hi])) / 2) as u64
}
