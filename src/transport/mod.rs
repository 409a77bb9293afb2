//! Collaborator contracts the probes are driven through.
//!
//! The probes only ever see a [`Channel`] (interactive shell bytes) or a
//! [`BulkSink`] (push-file transfer). [`Transport`] establishes both.
//! [`ssh::SshTransport`] implements them on top of the system OpenSSH client.

pub mod scp;
pub mod ssh;
pub mod stream;

use std::time::Duration;

use thiserror::Error;

use crate::target::Target;

pub use scp::ScpSink;
pub use ssh::{SshSettings, SshTransport};
pub use stream::StreamChannel;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot reach {host}:{port}: {reason}")]
    Unreachable {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not connected")]
    NotConnected,

    #[error("channel is closed")]
    Closed,

    #[error("remote reported an error: {0}")]
    Remote(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte-level access to an interactive shell with a pseudo-terminal.
#[async_trait::async_trait]
pub trait Channel: Send {
    /// Write `buf`, returning the number of bytes accepted.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`.
    ///
    /// `Ok(0)` means nothing arrived in time, or the stream ended; the two are
    /// told apart with [`Channel::is_eof`].
    async fn read_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    fn is_open(&self) -> bool;

    fn is_eof(&self) -> bool;

    /// Send end-of-stream and release the channel.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Write side of a single-file bulk transfer.
#[async_trait::async_trait]
pub trait BulkSink: Send {
    /// Wait until the remote end is ready to accept a file.
    async fn init(&mut self) -> Result<(), TransportError>;

    /// Announce the file name, exact size, and permission bits before any data.
    async fn push_file(&mut self, name: &str, size: u64, mode: u32)
        -> Result<(), TransportError>;

    async fn write(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    /// Finish the file and wait for the remote to confirm it.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Session lifecycle towards one target host.
#[async_trait::async_trait]
pub trait Transport: Send {
    type Channel: Channel;
    type Sink: BulkSink;

    async fn connect(&mut self, target: &Target) -> Result<(), TransportError>;

    async fn authenticate(&mut self) -> Result<(), TransportError>;

    /// Open a channel with a pseudo-terminal running an interactive shell.
    async fn open_interactive_channel(&mut self) -> Result<Self::Channel, TransportError>;

    /// Allocate a write-mode bulk transfer into `remote_path`.
    async fn open_bulk_sink(&mut self, remote_path: &str) -> Result<Self::Sink, TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}
