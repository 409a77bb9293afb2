//! Measurement probes: shell settling, echo latency, and bulk throughput.

use serde::Serialize;
use thiserror::Error;

use crate::analysis::StatsError;
use crate::transport::TransportError;

pub mod drain;
pub mod echo;
pub mod throughput;

#[cfg(test)]
pub(crate) mod testing;

pub use drain::{drain, DrainOutcome, DrainReport};
pub use echo::{EchoConfig, EchoProbe, EchoReport};
pub use throughput::{ThroughputConfig, ThroughputProbe, ThroughputReport};

/// Outcome of one probe run: a report, or the error that aborted it.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeKind {
    Echo,
    Throughput,
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeKind::Echo => write!(f, "echo"),
            ProbeKind::Throughput => write!(f, "throughput"),
        }
    }
}

/// Coarse failure category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ShortWrite,
    Timeout,
    IoError,
    TransportError,
    InvalidInput,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ShortWrite => "short write",
            ErrorKind::Timeout => "timeout",
            ErrorKind::IoError => "I/O error",
            ErrorKind::TransportError => "transport error",
            ErrorKind::InvalidInput => "invalid input",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("write put {written} bytes, expected {expected}")]
    ShortWrite { written: usize, expected: usize },

    #[error("no echo within {timeout_ms} ms for character {character}")]
    Timeout { character: u64, timeout_ms: u64 },

    #[error("channel closed by remote {0}")]
    ClosedEarly(&'static str),

    #[error("channel I/O failed: {0}")]
    Io(#[source] TransportError),

    #[error("transfer setup failed: {0}")]
    Transport(#[source] TransportError),

    #[error(transparent)]
    Stats(#[from] StatsError),
}

impl ProbeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::ShortWrite { .. } => ErrorKind::ShortWrite,
            ProbeError::Timeout { .. } => ErrorKind::Timeout,
            ProbeError::ClosedEarly(_) | ProbeError::Io(_) => ErrorKind::IoError,
            ProbeError::Transport(_) => ErrorKind::TransportError,
            ProbeError::Stats(_) => ErrorKind::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ProbeError::ShortWrite {
                written: 0,
                expected: 1
            }
            .kind(),
            ErrorKind::ShortWrite
        );
        assert_eq!(
            ProbeError::Timeout {
                character: 3,
                timeout_ms: 2500
            }
            .kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            ProbeError::ClosedEarly("while draining").kind(),
            ErrorKind::IoError
        );
        assert_eq!(
            ProbeError::Io(TransportError::Closed).kind(),
            ErrorKind::IoError
        );
        assert_eq!(
            ProbeError::Transport(TransportError::NotConnected).kind(),
            ErrorKind::TransportError
        );
        assert_eq!(
            ProbeError::from(StatsError::EmptySampleSet).kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_messages() {
        let e = ProbeError::ShortWrite {
            written: 0,
            expected: 1,
        };
        assert_eq!(e.to_string(), "write put 0 bytes, expected 1");
        assert_eq!(ProbeKind::Throughput.to_string(), "throughput");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
    }
}
