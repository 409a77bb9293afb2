//! Monotonic timestamps and nanosecond durations.
//!
//! Backed by [`std::time::Instant`], which reads `CLOCK_MONOTONIC` on Linux and
//! is therefore immune to NTP steps and DST changes.

use std::time::{Duration, Instant};

const NANOS_PER_MILLI: u64 = 1_000_000;

/// An opaque monotonic instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Instant);

impl Timestamp {
    /// Capture the current monotonic clock reading.
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Nanoseconds elapsed since this timestamp was taken.
    pub fn elapsed_nanos(&self) -> u64 {
        duration_nanos(*self, Self::now())
    }

    /// Time elapsed since this timestamp was taken.
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

impl From<Instant> for Timestamp {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

/// Absolute difference between two timestamps in nanoseconds.
///
/// Argument order does not matter. Saturates at `u64::MAX` (about 584 years).
pub fn duration_nanos(a: Timestamp, b: Timestamp) -> u64 {
    let diff = if b.0 >= a.0 { b.0 - a.0 } else { a.0 - b.0 };
    u64::try_from(diff.as_nanos()).unwrap_or(u64::MAX)
}

/// Truncating nanoseconds-to-milliseconds conversion.
pub fn to_millis(nanos: u64) -> u64 {
    nanos / NANOS_PER_MILLI
}
