//! Mock transport for deterministic testing of the SKSTACK engine.
//!
//! [`MockTransport`] implements [`Transport`] over a scripted byte stream.
//! Two kinds of input feed the stream:
//!
//! - **expectations**: when the engine sends exactly the expected request,
//!   the paired response chunks are queued for reading;
//! - **unsolicited input**: bytes, zero-length reads, or I/O errors pushed
//!   through a [`MockHandle`] at any time, including while a `receive()` is
//!   blocked waiting.
//!
//! Each queued chunk is delivered by at most one `receive()` call, so
//! chunked responses exercise partial-line reassembly.
//!
//! # Example
//!
//! ```
//! use routeb_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! let handle = mock.handle();
//! handle.expect(b"SKSREG S2 21\r\n", b"OK\r\n");
//! handle.push(b"EVENT 21 FE80:0000:0000:0000:021D:1290:1234:5678 00\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use routeb_core::error::{Error, Result};
use routeb_core::transport::Transport;

#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<Vec<u8>>,
}

#[derive(Debug)]
enum Inbound {
    Bytes(Vec<u8>),
    EmptyRead,
    Error(std::io::ErrorKind),
}

#[derive(Debug)]
struct State {
    expectations: VecDeque<Expectation>,
    inbound: VecDeque<Inbound>,
    connected: bool,
    sent_log: Vec<Vec<u8>>,
}

/// Cloneable scripting handle onto a [`MockTransport`].
///
/// The handle stays usable after the transport has been boxed and moved
/// into a session.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, items: impl IntoIterator<Item = Inbound>) {
        self.lock().inbound.extend(items);
        self.notify.notify_one();
    }

    /// Add an expected request with a single-chunk response.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.expect_chunked(request, &[response]);
    }

    /// Add an expected request whose response arrives in several reads.
    pub fn expect_chunked(&self, request: &[u8], chunks: &[&[u8]]) {
        self.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: chunks.iter().map(|c| c.to_vec()).collect(),
        });
    }

    /// Add an expected request that produces no output.
    pub fn expect_silent(&self, request: &[u8]) {
        self.expect_chunked(request, &[]);
    }

    /// Queue bytes for the next `receive()` call.
    pub fn push(&self, bytes: &[u8]) {
        self.enqueue([Inbound::Bytes(bytes.to_vec())]);
    }

    /// Queue a read that returns zero bytes.
    pub fn push_empty_read(&self) {
        self.enqueue([Inbound::EmptyRead]);
    }

    /// Queue a read that fails with the given I/O error kind.
    pub fn push_error(&self, kind: std::io::ErrorKind) {
        self.enqueue([Inbound::Error(kind)]);
    }

    /// All data sent through the transport, one element per `send()`.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.lock().sent_log.clone()
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.lock().expectations.len()
    }

    /// Number of queued bytes not yet delivered by `receive()`.
    pub fn pending_bytes(&self) -> usize {
        self.lock()
            .inbound
            .iter()
            .map(|item| match item {
                Inbound::Bytes(b) => b.len(),
                _ => 0,
            })
            .sum()
    }

    /// Set the connected state.
    ///
    /// While disconnected, `send()` and `receive()` return
    /// [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
        self.notify.notify_one();
    }
}

/// A scripted [`Transport`] for testing without hardware.
///
/// `send()` must match the next expectation exactly, otherwise it fails
/// with [`Error::Protocol`]. `receive()` returns queued input, or waits up
/// to its timeout for more to be pushed and then returns [`Error::Timeout`].
#[derive(Debug)]
pub struct MockTransport {
    handle: MockHandle,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            handle: MockHandle {
                state: Arc::new(Mutex::new(State {
                    expectations: VecDeque::new(),
                    inbound: VecDeque::new(),
                    connected: true,
                    sent_log: Vec::new(),
                })),
                notify: Arc::new(Notify::new()),
            },
        }
    }

    /// Get a scripting handle that shares this transport's state.
    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.handle.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }

        state.sent_log.push(data.to_vec());

        let Some(expectation) = state.expectations.pop_front() else {
            return Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            ));
        };
        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            )));
        }
        state
            .inbound
            .extend(expectation.response.into_iter().map(Inbound::Bytes));
        drop(state);
        self.handle.notify.notify_one();
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut state = self.handle.lock();
                if !state.connected {
                    return Err(Error::NotConnected);
                }
                match state.inbound.pop_front() {
                    Some(Inbound::Bytes(mut bytes)) => {
                        let n = bytes.len().min(buf.len());
                        buf[..n].copy_from_slice(&bytes[..n]);
                        if n < bytes.len() {
                            let rest = bytes.split_off(n);
                            state.inbound.push_front(Inbound::Bytes(rest));
                        }
                        return Ok(n);
                    }
                    Some(Inbound::EmptyRead) => return Ok(0),
                    Some(Inbound::Error(kind)) => return Err(Error::Io(kind.into())),
                    None => {}
                }
            }

            tokio::select! {
                _ = self.handle.notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => return Err(Error::Timeout),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.handle.lock().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle.lock().connected
    }
}
