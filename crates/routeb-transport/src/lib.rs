//! Transport implementations for the Route B driver.
//!
//! Provides [`SerialTransport`], the [`Transport`](routeb_core::Transport)
//! implementation for USB dongles and UART-attached Wi-SUN modules.
//!
//! # Example
//!
//! ```no_run
//! use routeb_transport::SerialTransport;
//! use routeb_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> routeb_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0").await?;
//! transport.send(b"SKVER\r\n").await?;
//!
//! let mut buf = [0u8; 128];
//! let n = transport.receive(&mut buf, Duration::from_millis(100)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{SerialConfig, SerialTransport};
