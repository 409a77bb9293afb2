//! Interactive echo latency: one character out, one character back.
//!
//! A responder command (by default `cat > /dev/null`) is started in the
//! remote shell so typed characters are only echoed by the pseudo-terminal.
//! Each character is written, then the probe blocks until its echo arrives,
//! so every sample is a single non-overlapping keystroke round trip. Writes
//! are never batched or pipelined.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::{drain, ProbeError, ProbeResult};
use crate::analysis::{reduce, MedianRule, ProbeStats, SampleSet};
use crate::timer::{duration_nanos, to_millis, Timestamp};
use crate::transport::Channel;

/// Characters sent in turn; lowercase, uppercase, then a record separator.
pub const ECHO_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ\n";

/// Interrupt (Ctrl-C), used to stop the responder.
const INTERRUPT: u8 = 0x03;

/// Cap on the up-front sample allocation.
const MAX_PREALLOCATED_SAMPLES: u64 = 1 << 16;

#[derive(Debug, Clone)]
pub struct EchoConfig {
    /// Characters to echo. Ignored when `runtime` is set.
    pub count: u64,
    /// Keep echoing until this much time has passed since the first write.
    pub runtime: Option<Duration>,
    /// Remote command that swallows its input.
    pub command: String,
    /// Inactivity timeout for draining the responder's startup output.
    pub settle: Duration,
    /// How long to wait for each echoed character.
    pub read_timeout: Duration,
    pub median: MedianRule,
    /// Send Ctrl-C after the last sample.
    pub terminate_responder: bool,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            count: 1000,
            runtime: None,
            command: "cat > /dev/null".to_string(),
            settle: Duration::from_millis(1500),
            read_timeout: Duration::from_millis(2500),
            median: MedianRule::Reference,
            terminate_responder: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EchoReport {
    pub stats: ProbeStats,
    /// Number of characters echoed (equals the sample count).
    pub characters: u64,
    /// Wall time of the sample loop in milliseconds.
    pub elapsed_ms: u64,
    #[serde(skip)]
    pub samples: SampleSet,
}

pub struct EchoProbe {
    config: EchoConfig,
}

impl EchoProbe {
    pub fn new(config: EchoConfig) -> Self {
        Self { config }
    }

    /// Run the probe over an interactive shell channel.
    ///
    /// Aborts on the first short write, timeout, or I/O error; no statistics
    /// are produced from a partial run.
    pub async fn run<C>(&self, channel: &mut C) -> ProbeResult<EchoReport>
    where
        C: Channel + ?Sized,
    {
        self.start_responder(channel).await?;

        let capacity = match self.config.runtime {
            Some(_) => 1024,
            None => self.config.count.min(MAX_PREALLOCATED_SAMPLES),
        };
        let mut samples = SampleSet::with_capacity(capacity as usize);
        let mut rbuf = [0u8; 1];
        let started = Timestamp::now();
        let mut n: u64 = 0;

        while self.keep_going(n, started) {
            let t_write = Timestamp::now();

            let i = (n % ECHO_ALPHABET.len() as u64) as usize;
            let written = channel
                .write(&ECHO_ALPHABET[i..i + 1])
                .await
                .map_err(ProbeError::Io)?;
            if written != 1 {
                return Err(ProbeError::ShortWrite {
                    written,
                    expected: 1,
                });
            }

            let read = channel
                .read_timeout(&mut rbuf, self.config.read_timeout)
                .await
                .map_err(ProbeError::Io)?;
            if read != 1 {
                if channel.is_eof() || !channel.is_open() {
                    return Err(ProbeError::ClosedEarly("during echo"));
                }
                return Err(ProbeError::Timeout {
                    character: n + 1,
                    timeout_ms: self.config.read_timeout.as_millis() as u64,
                });
            }

            let t_read = Timestamp::now();
            let latency = duration_nanos(t_write, t_read);
            trace!(character = n + 1, latency_ns = latency, "echo");
            samples.push(latency);
            n += 1;
        }
        let elapsed_ms = to_millis(started.elapsed_nanos());

        let stats = reduce(&samples, self.config.median)?;
        info!(
            characters = n,
            min_ns = stats.min,
            median_ns = stats.median,
            max_ns = stats.max,
            "echo probe finished"
        );

        if self.config.terminate_responder {
            match channel.write(&[INTERRUPT]).await {
                Ok(_) => debug!("echo responder interrupted"),
                Err(e) => warn!(error = %e, "failed to interrupt echo responder"),
            }
        }

        Ok(EchoReport {
            stats,
            characters: n,
            elapsed_ms,
            samples,
        })
    }

    async fn start_responder<C>(&self, channel: &mut C) -> ProbeResult<()>
    where
        C: Channel + ?Sized,
    {
        let line = format!("{}\n", self.config.command);
        let written = channel
            .write(line.as_bytes())
            .await
            .map_err(ProbeError::Io)?;
        if written != line.len() {
            return Err(ProbeError::ShortWrite {
                written,
                expected: line.len(),
            });
        }

        let discarded = drain(channel, self.config.settle)
            .await?
            .require_quiet("while starting the echo responder")?;
        info!(command = %self.config.command, discarded, "echo responder started");
        Ok(())
    }

    fn keep_going(&self, done: u64, started: Timestamp) -> bool {
        match self.config.runtime {
            // Always take at least one sample.
            Some(runtime) => done == 0 || started.elapsed() < runtime,
            None => done < self.config.count,
        }
    }
}
