//! Sink side of the scp protocol (`scp -t`), used for push-file transfers.
//!
//! Every control step is answered by the remote with a single status byte:
//! `0` for success, `1` (warning) or `2` (fatal) followed by a message line.
//! A single file push is:
//!
//! ```text
//! <- \0                        remote ready
//! -> C0400 8000000 name\n      file header: mode, size, name
//! <- \0
//! -> <size bytes of payload>
//! -> \0                        end of file
//! <- \0
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tracing::{debug, warn};

use super::{BulkSink, TransportError};

/// Longest remote error message we are willing to buffer.
const MAX_MESSAGE_LEN: usize = 4096;

/// Build the `C` header line announcing one file.
pub fn push_header(name: &str, size: u64, mode: u32) -> Result<Bytes, TransportError> {
    if name.is_empty() || name.contains('/') || name.contains('\n') {
        return Err(TransportError::Protocol(format!(
            "invalid remote file name {:?}",
            name
        )));
    }
    let line = format!("C{:04o} {} {}\n", mode & 0o7777, size, name);
    let mut buf = BytesMut::with_capacity(line.len());
    buf.put_slice(line.as_bytes());
    Ok(buf.freeze())
}

/// A [`BulkSink`] talking to a remote `scp -t` over a writer/reader pair.
pub struct ScpSink<W, R> {
    writer: Option<W>,
    reader: R,
    child: Option<Child>,
    announced: Option<u64>,
    written: u64,
}

impl<W, R> ScpSink<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            writer: Some(writer),
            reader,
            child: None,
            announced: None,
            written: 0,
        }
    }

    /// Attach the process running the remote `scp -t`.
    pub fn with_child(mut self, child: Child) -> Self {
        self.child = Some(child);
        self
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        writer.write_all(buf).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_ack(&mut self) -> Result<(), TransportError> {
        let mut code = [0u8; 1];
        if self.reader.read(&mut code).await? == 0 {
            return Err(TransportError::Protocol(
                "remote closed the transfer before acknowledging".to_string(),
            ));
        }
        match code[0] {
            0 => Ok(()),
            1 | 2 => {
                let message = self.read_line().await?;
                Err(TransportError::Remote(message))
            }
            other => Err(TransportError::Protocol(format!(
                "unexpected status byte 0x{:02x}",
                other
            ))),
        }
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        while line.len() < MAX_MESSAGE_LEN {
            if self.reader.read(&mut byte).await? == 0 || byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        Ok(String::from_utf8_lossy(&line).trim().to_string())
    }
}

#[async_trait::async_trait]
impl<W, R> BulkSink for ScpSink<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    async fn init(&mut self) -> Result<(), TransportError> {
        self.read_ack().await?;
        debug!("scp sink ready");
        Ok(())
    }

    async fn push_file(
        &mut self,
        name: &str,
        size: u64,
        mode: u32,
    ) -> Result<(), TransportError> {
        let header = push_header(name, size, mode)?;
        self.send(&header).await?;
        self.read_ack().await?;
        self.announced = Some(size);
        self.written = 0;
        debug!(%name, size, mode = %format!("{:04o}", mode), "scp file announced");
        Ok(())
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let announced = self
            .announced
            .ok_or_else(|| TransportError::Protocol("write before push_file".to_string()))?;
        if self.written + buf.len() as u64 > announced {
            return Err(TransportError::Protocol(format!(
                "payload exceeds announced size of {} bytes",
                announced
            )));
        }
        self.send(buf).await?;
        self.written += buf.len() as u64;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(announced) = self.announced.take() {
            if self.written != announced {
                warn!(
                    written = self.written,
                    announced, "closing scp transfer with a short payload"
                );
            }
            self.send(&[0]).await?;
            self.read_ack().await?;
        }

        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await?;
        }

        if let Some(mut child) = self.child.take() {
            let status = child.wait().await?;
            if !status.success() {
                return Err(TransportError::Remote(format!(
                    "scp session exited with {}",
                    status
                )));
            }
        }
        Ok(())
    }
}
