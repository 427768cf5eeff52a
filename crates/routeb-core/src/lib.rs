//! routeb-core: Core traits, types, and error definitions for the Route B
//! smart-meter driver.
//!
//! This crate defines the device-agnostic pieces that the SKSTACK driver and
//! its collaborators share. Applications depend on these types without
//! pulling in a concrete serial implementation.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`Deadline`] -- absolute deadline plus optional cancellation token
//! - [`PanDescriptor`], [`JoinStatus`], [`PowerReading`] -- domain data
//! - [`Error`] / [`Result`] -- error handling

pub mod deadline;
pub mod error;
pub mod transport;
pub mod types;

pub use deadline::Deadline;
pub use error::{Error, Result};
pub use transport::Transport;
pub use types::{JoinStatus, PanDescriptor, PowerReading};
