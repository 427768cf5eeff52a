//! Error types for the Route B driver.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Errors fall into four groups: fatal
//! transport failures, recoverable waits (timeout and cancellation),
//! device-reported protocol failures, and decode failures on numeric or hex
//! fields.

use crate::types::JoinStatus;

/// The error type for all Route B operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port could not be opened, etc.).
    #[error("transport error: {0}")]
    Transport(String),

    /// The device reported a failure or an unexpected terminal event.
    ///
    /// The payload is the device's reason text, verbatim (e.g. `ER10` for
    /// a `FAIL ER10` line).
    #[error("protocol failure: {0}")]
    Protocol(String),

    /// A numeric or hex field in a scan result or application frame was
    /// malformed.
    #[error("decode error: {0}")]
    Decode(String),

    /// The caller's deadline expired before a terminal line arrived.
    ///
    /// Bytes read so far stay buffered in the session.
    #[error("timeout waiting for response")]
    Timeout,

    /// The caller's cancellation token fired during a wait.
    ///
    /// Like [`Error::Timeout`], buffered bytes are preserved.
    #[error("operation cancelled")]
    Cancelled,

    /// An invalid parameter was passed to a command builder.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The operation is not permitted from the current join status.
    #[error("{operation} not permitted while {status}")]
    InvalidState {
        /// Join status at the time of the call.
        status: JoinStatus,
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// No connection to the device has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// `true` for waits that ran out of time or were cancelled.
    ///
    /// The session is still usable and the same step may be retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Timeout | Error::Cancelled)
    }

    /// `true` for failures of the link itself; the session should be dropped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::NotConnected | Error::ConnectionLost | Error::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_protocol_keeps_reason() {
        let e = Error::Protocol("ER10".into());
        assert_eq!(e.to_string(), "protocol failure: ER10");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_invalid_state() {
        let e = Error::InvalidState {
            status: JoinStatus::Disconnected,
            operation: "scan",
        };
        assert_eq!(e.to_string(), "scan not permitted while disconnected");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn recoverable_and_fatal_are_disjoint() {
        let all = [
            Error::Transport("x".into()),
            Error::Protocol("x".into()),
            Error::Decode("x".into()),
            Error::Timeout,
            Error::Cancelled,
            Error::InvalidParameter("x".into()),
            Error::NotConnected,
            Error::ConnectionLost,
        ];
        for e in &all {
            assert!(!(e.is_recoverable() && e.is_fatal()), "{e}");
        }
        assert!(Error::Timeout.is_recoverable());
        assert!(Error::Cancelled.is_recoverable());
        assert!(Error::ConnectionLost.is_fatal());
        assert!(!Error::Protocol("ER10".into()).is_fatal());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
