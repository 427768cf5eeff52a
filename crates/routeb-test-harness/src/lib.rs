//! routeb-test-harness: Test utilities for the Route B driver.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the
//! SKSTACK protocol engine without a radio module, along with [`scripts`],
//! a set of helpers producing the lines a real module would emit.

pub mod mock_serial;
pub mod scripts;

pub use mock_serial::{MockHandle, MockTransport};
