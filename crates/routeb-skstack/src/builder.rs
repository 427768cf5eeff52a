//! SkStackBuilder -- fluent builder for [`RouteBSession`].
//!
//! # Example
//!
//! ```no_run
//! use routeb_skstack::builder::SkStackBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> routeb_core::Result<()> {
//! let session = SkStackBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .read_timeout(Duration::from_millis(200))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use routeb_core::error::{Error, Result};
use routeb_core::transport::Transport;
use routeb_transport::{SerialConfig, SerialTransport};

use crate::framer::FramerConfig;
use crate::session::RouteBSession;

/// Fluent builder for [`RouteBSession`].
#[derive(Debug, Clone, Default)]
pub struct SkStackBuilder {
    serial_port: Option<String>,
    serial: SerialConfig,
    framer: FramerConfig,
}

impl SkStackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the baud rate (default: 115200).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.serial.baud_rate = baud;
        self
    }

    /// Size of each read from the port (default: 128 bytes).
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.framer.chunk_size = size;
        self
    }

    /// Longest single read before the caller's deadline is re-checked
    /// (default: 100ms).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.framer.read_timeout = timeout;
        self
    }

    /// Pause after a read that returned no bytes (default: 10ms).
    pub fn idle_poll(mut self, pause: Duration) -> Self {
        self.framer.idle_poll = pause;
        self
    }

    /// Build a session over a caller-provided transport, e.g. a
    /// `MockTransport` from `routeb-test-harness`.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<RouteBSession> {
        if self.framer.chunk_size == 0 {
            return Err(Error::InvalidParameter("chunk_size must be non-zero".into()));
        }
        if self.framer.read_timeout.is_zero() {
            return Err(Error::InvalidParameter("read_timeout must be non-zero".into()));
        }
        Ok(RouteBSession::new(transport, self.framer))
    }

    /// Open the serial port and build a session over it.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub async fn build(self) -> Result<RouteBSession> {
        let port = self
            .serial_port
            .as_deref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;
        let transport = SerialTransport::open_with_config(port, self.serial.clone()).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}
