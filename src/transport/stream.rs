//! A [`Channel`] over any pair of async byte streams.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tracing::{debug, trace, warn};

use super::{Channel, TransportError};

/// How long `close` waits for an owned child process to exit on its own.
const CHILD_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Interactive channel over a writer (remote stdin) and a reader (remote
/// stdout). When built from a subprocess the child is owned and reaped on
/// [`Channel::close`].
pub struct StreamChannel<W, R> {
    writer: Option<W>,
    reader: R,
    child: Option<Child>,
    eof: bool,
}

impl<W, R> StreamChannel<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            writer: Some(writer),
            reader,
            child: None,
            eof: false,
        }
    }

    /// Attach the process whose stdio backs this channel.
    pub fn with_child(mut self, child: Child) -> Self {
        self.child = Some(child);
        self
    }
}

#[async_trait::async_trait]
impl<W, R> Channel for StreamChannel<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        let result = async {
            writer.write_all(buf).await?;
            writer.flush().await
        }
        .await;
        match result {
            Ok(()) => {
                trace!(bytes = buf.len(), "channel write");
                Ok(buf.len())
            }
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                self.writer = None;
                Err(TransportError::Closed)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        if self.eof {
            return Ok(0);
        }
        match tokio::time::timeout(timeout, self.reader.read(buf)).await {
            Err(_elapsed) => Ok(0),
            Ok(Ok(0)) => {
                debug!("channel reached end of stream");
                self.eof = true;
                Ok(0)
            }
            Ok(Ok(n)) => {
                trace!(bytes = n, "channel read");
                Ok(n)
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut writer) = self.writer.take() {
            // Dropping the writer delivers EOF to the remote side.
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "shutdown of channel writer failed");
            }
        }

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(CHILD_EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "channel process exited"),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    warn!("channel process did not exit, killing it");
                    child.kill().await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split};

    #[tokio::test]
    async fn test_write_then_read_back() {
        let (local, remote) = duplex(64);
        let (r, w) = split(local);
        let mut channel = StreamChannel::new(w, r);

        let (mut remote_r, mut remote_w) = split(remote);
        tokio::spawn(async move {
            let mut b = [0u8; 1];
            while remote_r.read_exact(&mut b).await.is_ok() {
                if remote_w.write_all(&b).await.is_err() {
                    break;
                }
            }
        });

        assert_eq!(channel.write(b"x").await.unwrap(), 1);
        let mut buf = [0u8; 1];
        let n = channel
            .read_timeout(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(&buf, b"x");
        assert!(channel.is_open());
        assert!(!channel.is_eof());
    }

    #[tokio::test]
    async fn test_read_timeout_returns_zero_without_eof() {
        let (local, _remote) = duplex(64);
        let (r, w) = split(local);
        let mut channel = StreamChannel::new(w, r);

        let mut buf = [0u8; 8];
        let n = channel
            .read_timeout(&mut buf, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert!(!channel.is_eof());
    }

    #[tokio::test]
    async fn test_remote_hangup_sets_eof() {
        let (local, remote) = duplex(64);
        let (r, w) = split(local);
        let mut channel = StreamChannel::new(w, r);
        drop(remote);

        let mut buf = [0u8; 8];
        let n = channel
            .read_timeout(&mut buf, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert!(channel.is_eof());
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (local, _remote) = duplex(64);
        let (r, w) = split(local);
        let mut channel = StreamChannel::new(w, r);

        channel.close().await.unwrap();
        assert!(!channel.is_open());
        assert!(matches!(
            channel.write(b"a").await,
            Err(TransportError::Closed)
        ));
    }
}
