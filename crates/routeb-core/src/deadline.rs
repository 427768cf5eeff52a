//! Caller-supplied deadlines for blocking waits.
//!
//! Every operation that reads from the module takes a [`Deadline`]: an
//! absolute point in time, optionally paired with a [`CancellationToken`].
//! Expiry surfaces as [`Error::Timeout`], cancellation as
//! [`Error::Cancelled`]. Neither discards buffered bytes.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// An absolute deadline with an optional cancellation token.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    cancel: Option<CancellationToken>,
}

impl Deadline {
    /// A deadline at the given instant.
    pub fn at(at: Instant) -> Self {
        Deadline { at, cancel: None }
    }

    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    /// Attach a cancellation token. Cancelling it ends the wait early.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Time left before expiry (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Return the time left, or the error a wait should end with.
    ///
    /// Cancellation takes precedence over expiry.
    pub fn check(&self) -> Result<Duration> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let remaining = self.remaining();
        if remaining.is_zero() {
            return Err(Error::Timeout);
        }
        Ok(remaining)
    }

    /// Run `fut` to completion unless the deadline expires or the token
    /// fires first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = cancelled => Err(Error::Cancelled),
            _ = tokio::time::sleep_until(self.at) => Err(Error::Timeout),
            result = fut => result,
        }
    }
}
