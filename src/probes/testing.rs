//! Scripted in-memory channel and sink used by the probe tests.

use std::collections::VecDeque;
use std::time::Duration;

use crate::transport::{BulkSink, Channel, TransportError};

/// What the next `read_timeout` call does.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Data(&'static [u8]),
    /// Hand back bytes previously written, like a tty with echo on.
    Echo,
    Quiet,
    Fail,
    Eof,
}

/// Follows `script` for successive reads; once it is exhausted, either echoes
/// (when `echo_fallback` is set) or stays quiet.
#[derive(Default)]
pub(crate) struct ScriptedChannel {
    script: VecDeque<Step>,
    echo_fallback: bool,
    echoed: VecDeque<u8>,
    short_write_at: Option<usize>,
    pub written: Vec<u8>,
    pub writes: usize,
    pub reads: usize,
    closed: bool,
    eof: bool,
}

impl ScriptedChannel {
    pub fn scripted(steps: Vec<Step>) -> Self {
        Self {
            script: steps.into(),
            ..Self::default()
        }
    }

    pub fn echoing(steps: Vec<Step>) -> Self {
        Self {
            echo_fallback: true,
            ..Self::scripted(steps)
        }
    }

    /// Make the `n`th write (1-based) accept zero bytes.
    pub fn short_write_at(mut self, n: usize) -> Self {
        self.short_write_at = Some(n);
        self
    }

    pub fn closed() -> Self {
        Self {
            closed: true,
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
impl Channel for ScriptedChannel {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.writes += 1;
        if self.short_write_at == Some(self.writes) {
            return Ok(0);
        }
        self.written.extend_from_slice(buf);
        self.echoed.extend(buf.iter().copied());
        Ok(buf.len())
    }

    async fn read_timeout(
        &mut self,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.reads += 1;
        if self.eof {
            return Ok(0);
        }
        let fallback = if self.echo_fallback { Step::Echo } else { Step::Quiet };
        match self.script.pop_front().unwrap_or(fallback) {
            Step::Data(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Step::Echo => {
                let mut n = 0;
                while n < buf.len() {
                    match self.echoed.pop_front() {
                        Some(b) => {
                            buf[n] = b;
                            n += 1;
                        }
                        None => break,
                    }
                }
                Ok(n)
            }
            Step::Quiet => Ok(0),
            Step::Fail => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))),
            Step::Eof => {
                self.eof = true;
                Ok(0)
            }
        }
    }

    fn is_open(&self) -> bool {
        !self.closed
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

/// Which sink call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SinkFault {
    Init,
    PushFile,
    Write,
    Close,
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    pub fault: Option<SinkFault>,
    pub announced: Option<(String, u64, u32)>,
    pub received: u64,
    pub write_calls: usize,
    pub closed: bool,
}

impl RecordingSink {
    pub fn failing(fault: SinkFault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::default()
        }
    }

    fn check(&self, at: SinkFault) -> Result<(), TransportError> {
        if self.fault == Some(at) {
            return Err(TransportError::Remote(format!("{:?} refused", at)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BulkSink for RecordingSink {
    async fn init(&mut self) -> Result<(), TransportError> {
        self.check(SinkFault::Init)
    }

    async fn push_file(
        &mut self,
        name: &str,
        size: u64,
        mode: u32,
    ) -> Result<(), TransportError> {
        self.check(SinkFault::PushFile)?;
        self.announced = Some((name.to_string(), size, mode));
        Ok(())
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.check(SinkFault::Write)?;
        self.write_calls += 1;
        self.received += buf.len() as u64;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.check(SinkFault::Close)?;
        self.closed = true;
        Ok(())
    }
}
