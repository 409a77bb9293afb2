//! Bulk transfer speed: push one fixed-size file and time the payload.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ProbeError, ProbeResult};
use crate::timer::{duration_nanos, Timestamp};
use crate::transport::BulkSink;

/// Substituted when the measured duration is zero, so the rate stays finite.
pub const DURATION_FLOOR_SECS: f64 = 0.1;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

#[derive(Debug, Clone)]
pub struct ThroughputConfig {
    /// Total payload size in bytes.
    pub size: u64,
    /// Bytes handed to the sink per write call.
    pub chunk_size: usize,
    /// File name announced to the remote.
    pub remote_name: String,
    /// Permission bits announced to the remote.
    pub mode: u32,
    /// Payload content is irrelevant; every byte is this.
    pub filler: u8,
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            size: 8_000_000,
            chunk_size: 64 * 1024,
            remote_name: "speedtest.tmp".to_string(),
            mode: 0o400,
            filler: b's',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThroughputReport {
    pub bytes: u64,
    /// Duration of the payload transfer, after the floor was applied.
    pub elapsed_secs: f64,
    pub bytes_per_sec: u64,
}

/// Turn a byte count and elapsed nanoseconds into `(seconds, bytes/sec)`.
///
/// A zero duration is replaced with [`DURATION_FLOOR_SECS`]; the rate is
/// truncated to an integer.
pub fn transfer_rate(bytes: u64, elapsed_nanos: u64) -> (f64, u64) {
    let mut secs = elapsed_nanos as f64 / NANOS_PER_SEC;
    if secs == 0.0 {
        secs = DURATION_FLOOR_SECS;
    }
    (secs, (bytes as f64 / secs) as u64)
}

pub struct ThroughputProbe {
    config: ThroughputConfig,
}

impl ThroughputProbe {
    pub fn new(config: ThroughputConfig) -> Self {
        Self { config }
    }

    /// Push the payload through `sink` and measure the transfer rate.
    ///
    /// Only the payload writes are timed; setup and close are not.
    pub async fn run<S>(&self, sink: &mut S) -> ProbeResult<ThroughputReport>
    where
        S: BulkSink + ?Sized,
    {
        let cfg = &self.config;
        sink.init().await.map_err(ProbeError::Transport)?;
        sink.push_file(&cfg.remote_name, cfg.size, cfg.mode)
            .await
            .map_err(ProbeError::Transport)?;
        debug!(size = cfg.size, chunk_size = cfg.chunk_size, "payload announced");

        let chunk_len = (cfg.chunk_size.max(1) as u64).min(cfg.size) as usize;
        let chunk = vec![cfg.filler; chunk_len];
        let mut remaining = cfg.size;

        let t_start = Timestamp::now();
        while remaining > 0 {
            let n = remaining.min(chunk_len as u64) as usize;
            sink.write(&chunk[..n]).await.map_err(ProbeError::Io)?;
            remaining -= n as u64;
        }
        let t_end = Timestamp::now();

        let (elapsed_secs, bytes_per_sec) = transfer_rate(cfg.size, duration_nanos(t_start, t_end));

        if let Err(e) = sink.close().await {
            warn!(error = %e, "transfer did not close cleanly");
            return Err(ProbeError::Transport(e));
        }

        info!(
            bytes = cfg.size,
            elapsed_secs,
            bytes_per_sec,
            "throughput probe finished"
        );
        Ok(ThroughputReport {
            bytes: cfg.size,
            elapsed_secs,
            bytes_per_sec,
        })
    }
}
