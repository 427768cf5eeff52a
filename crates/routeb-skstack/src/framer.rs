//! Line reassembly over a [`Transport`].
//!
//! [`LineFramer`] owns the remainder: bytes read from the module that are
//! not yet part of a returned line. It survives timeouts, cancellation and
//! dropped futures, so a notification split across two waits is still seen
//! whole by the second one.

use std::time::Duration;

use bytes::BytesMut;
use tracing::{trace, warn};

use routeb_core::deadline::Deadline;
use routeb_core::error::{Error, Result};
use routeb_core::transport::Transport;

use crate::protocol::{self, DecodeResult};

/// Upper bound on buffered bytes without a terminator.
pub const MAX_BUF: usize = 8192;

/// Read sizing and pacing for a [`LineFramer`].
#[derive(Debug, Clone)]
pub struct FramerConfig {
    /// Size of the buffer handed to each `receive()` call.
    pub chunk_size: usize,
    /// Longest single `receive()` before the deadline is re-checked.
    pub read_timeout: Duration,
    /// Pause after a read that returned zero bytes.
    pub idle_poll: Duration,
}

impl Default for FramerConfig {
    fn default() -> Self {
        FramerConfig {
            chunk_size: 128,
            read_timeout: Duration::from_millis(100),
            idle_poll: Duration::from_millis(10),
        }
    }
}

/// CRLF line framer holding the unread remainder.
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    config: FramerConfig,
}

impl LineFramer {
    pub fn new(config: FramerConfig) -> Self {
        Self::from_remainder(&[], config)
    }

    /// Resume framing from a remainder returned by [`into_remainder`](Self::into_remainder).
    pub fn from_remainder(remainder: &[u8], config: FramerConfig) -> Self {
        LineFramer {
            buf: BytesMut::from(remainder),
            config,
        }
    }

    /// Bytes read but not yet returned as part of a line.
    pub fn remainder(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_remainder(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    /// Split a complete line off the remainder, if one is there.
    pub fn take_line(&mut self) -> Option<String> {
        match protocol::decode_line(&self.buf) {
            DecodeResult::Line { line, consumed } => {
                let _ = self.buf.split_to(consumed);
                Some(line)
            }
            DecodeResult::Incomplete => None,
        }
    }

    /// Return the next line, reading from `transport` only when the
    /// remainder holds no complete line.
    ///
    /// Fails with [`Error::Timeout`] or [`Error::Cancelled`] when the
    /// deadline ends the wait; the remainder is left as it was. Other
    /// transport errors are returned unchanged.
    pub async fn read_line(
        &mut self,
        transport: &mut dyn Transport,
        deadline: &Deadline,
    ) -> Result<String> {
        let mut chunk = vec![0u8; self.config.chunk_size];

        loop {
            if let Some(line) = self.take_line() {
                trace!(line = %line.escape_debug(), "line");
                return Ok(line);
            }

            if self.buf.len() > MAX_BUF {
                warn!(len = self.buf.len(), "no terminator within buffer limit, clearing");
                self.buf.clear();
                return Err(Error::Protocol(format!(
                    "no line terminator within {MAX_BUF} bytes"
                )));
            }

            let remaining = deadline.check()?;
            let window = remaining.min(self.config.read_timeout);

            match deadline.run(transport.receive(&mut chunk, window)).await {
                Ok(0) => {
                    let pause = remaining.min(self.config.idle_poll);
                    deadline
                        .run(async {
                            tokio::time::sleep(pause).await;
                            Ok(())
                        })
                        .await?;
                }
                Ok(n) => {
                    let added = protocol::append_stripped(&mut self.buf, &chunk[..n]);
                    trace!(read = n, added, buffered = self.buf.len(), "chunk");
                }
                // The read window closed; the deadline is re-checked above.
                Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(FramerConfig::default())
    }
}
