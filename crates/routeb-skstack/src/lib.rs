//! SKSTACK Wi-SUN driver for Route B smart meters.
//!
//! This crate talks to a serial-attached Wi-SUN module speaking the SKSTACK
//! ASCII command set, joins the PAN of a utility smart meter and queries its
//! instantaneous power over ECHONET Lite. It provides:
//!
//! - **Line codec** ([`protocol`]) -- CRLF line splitting, padding removal and
//!   command encoding.
//! - **Framer** ([`framer`]) -- reassembles lines from a [`Transport`](routeb_core::Transport)
//!   under a deadline, keeping unread bytes across waits.
//! - **Reply classification** ([`reply`]) -- acknowledgements, failures,
//!   events, scan fields and received datagrams.
//! - **Engine** ([`engine`]) -- sends commands and waits for the line that
//!   ends each exchange.
//! - **Command builders** ([`commands`]) -- validated SKSTACK commands and
//!   scan result parsing.
//! - **Join state machine** ([`join`]) -- status transitions and per-step waits.
//! - **ECHONET Lite** ([`echonet`]) -- the instant power request and its reply.
//! - **Session** ([`session`]) -- [`RouteBSession`], the public operations.
//! - **Builder** ([`builder`]) -- [`SkStackBuilder`].
//!
//! # Join sequence
//!
//! ```text
//! SKSETPWD / SKSETRBID        authenticate()
//! SKSCAN .. EVENT 22          scan()
//! SKLL64                      (inside scan, or resolve_link_local_address())
//! SKSREG S2 / SKSREG S3       set_channel() / set_pan_id()
//! SKJOIN                      start_association()
//! EVENT 25 | EVENT 24         await_association_result()
//! SKSENDTO .. ERXUDP          get_instant_power()
//! ```
//!
//! # Example
//!
//! ```
//! use routeb_skstack::echonet::{decode_hex, parse_instant_power};
//!
//! let frame = decode_hex("1081000102880105FF017201E70400000378").unwrap();
//! assert_eq!(parse_instant_power(&frame), Some(888));
//! ```

pub mod builder;
pub mod commands;
pub mod echonet;
pub mod engine;
pub mod framer;
pub mod join;
pub mod protocol;
pub mod reply;
pub mod session;

pub use builder::SkStackBuilder;
pub use framer::{FramerConfig, LineFramer};
pub use session::RouteBSession;
