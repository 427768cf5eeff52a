//! Transport trait for module communication.
//!
//! The [`Transport`] trait abstracts over the physical link to the Wi-SUN
//! module. The serial implementation lives in `routeb-transport`; the
//! scripted mock used by protocol tests lives in `routeb-test-harness`.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to the radio module.
///
/// Implementations deliver whatever bytes are available; framing into
/// CRLF-terminated lines is the job of the protocol layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the module.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying device.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the module into the provided buffer.
    ///
    /// Returns the number of bytes actually read, which may be zero when
    /// the device had nothing to deliver. Waits up to `timeout`; returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if nothing arrives
    /// in that window.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport.
    ///
    /// After `close()`, `send()` and `receive()` return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently open.
    fn is_connected(&self) -> bool;
}
