//! Discard pending shell output until the channel goes quiet.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::{ProbeError, ProbeResult};
use crate::transport::Channel;

/// Read buffer size while draining.
pub const DRAIN_BUFFER_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DrainOutcome {
    /// A read timed out with nothing pending: the shell has settled.
    Quiet,
    /// The channel closed or hit end-of-stream before it went quiet.
    ClosedEarly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub outcome: DrainOutcome,
    /// Bytes read and thrown away.
    pub discarded: u64,
}

impl DrainReport {
    /// Treat anything but [`DrainOutcome::Quiet`] as a closed channel.
    pub fn require_quiet(self, during: &'static str) -> ProbeResult<u64> {
        match self.outcome {
            DrainOutcome::Quiet => Ok(self.discarded),
            DrainOutcome::ClosedEarly => Err(ProbeError::ClosedEarly(during)),
        }
    }
}

/// Read and discard until a read waits `inactivity` without data.
///
/// Read errors abort with [`ProbeError::Io`].
pub async fn drain<C>(channel: &mut C, inactivity: Duration) -> ProbeResult<DrainReport>
where
    C: Channel + ?Sized,
{
    let mut buf = [0u8; DRAIN_BUFFER_LEN];
    let mut discarded: u64 = 0;

    while channel.is_open() && !channel.is_eof() {
        let n = channel
            .read_timeout(&mut buf, inactivity)
            .await
            .map_err(ProbeError::Io)?;
        if n == 0 {
            if channel.is_eof() {
                break;
            }
            debug!(discarded, "channel quiet");
            return Ok(DrainReport {
                outcome: DrainOutcome::Quiet,
                discarded,
            });
        }
        discarded += n as u64;
    }

    debug!(discarded, "channel closed while draining");
    Ok(DrainReport {
        outcome: DrainOutcome::ClosedEarly,
        discarded,
    })
}
