//! Command/response engine.
//!
//! [`CommandEngine`] owns the transport and the line framer. It sends
//! commands and waits, under the caller's deadline, for a line that ends
//! the exchange. Lines that do not end it are discarded; the module may
//! print unrelated notifications at any point.

use tracing::{debug, trace};

use routeb_core::deadline::Deadline;
use routeb_core::error::{Error, Result};
use routeb_core::transport::Transport;

use crate::framer::{FramerConfig, LineFramer};
use crate::reply::{self, Event, Reply};

/// What a reply handler decided about one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wait<T> {
    /// Not the line we are waiting for; keep reading.
    Continue,
    /// The wait is over.
    Done(T),
}

/// A line that ends a generic exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// `OK`, with any trailing payload.
    Ack(String),
    /// One of the caller's marker events.
    Event(Event),
}

/// Sends commands and classifies the module's replies.
pub struct CommandEngine {
    transport: Box<dyn Transport>,
    framer: LineFramer,
}

impl CommandEngine {
    pub fn new(transport: Box<dyn Transport>, config: FramerConfig) -> Self {
        CommandEngine {
            transport,
            framer: LineFramer::new(config),
        }
    }

    /// Bytes read but not yet returned as part of a line.
    pub fn remainder(&self) -> &[u8] {
        self.framer.remainder()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Write a command to the module.
    pub async fn send(&mut self, cmd: &[u8]) -> Result<()> {
        debug!(command = command_name(cmd), "send");
        self.transport.send(cmd).await
    }

    /// Read and classify the next line.
    pub async fn next_reply(&mut self, deadline: &Deadline) -> Result<Reply> {
        let line = self.framer.read_line(&mut *self.transport, deadline).await?;
        Ok(reply::classify(&line))
    }

    /// Feed replies to `handler` until it returns [`Wait::Done`] or an error.
    pub async fn wait_for<T, F>(&mut self, deadline: &Deadline, mut handler: F) -> Result<T>
    where
        F: FnMut(Reply) -> Result<Wait<T>>,
    {
        loop {
            let reply = self.next_reply(deadline).await?;
            if let Wait::Done(value) = handler(reply)? {
                return Ok(value);
            }
        }
    }

    /// Wait for an acknowledgement, a failure, or one of `markers`.
    ///
    /// `FAIL <reason>` is returned as [`Error::Protocol`] carrying the reason.
    pub async fn await_terminal(&mut self, deadline: &Deadline, markers: &[u8]) -> Result<Terminal> {
        self.wait_for(deadline, |reply| match reply {
            Reply::Ack(payload) => Ok(Wait::Done(Terminal::Ack(payload))),
            Reply::Fail(reason) => Err(Error::Protocol(reason)),
            Reply::Event(event) if markers.contains(&event.code) => {
                Ok(Wait::Done(Terminal::Event(event)))
            }
            other => {
                trace!(?other, "discarding");
                Ok(Wait::Continue)
            }
        })
        .await
    }

    /// Send `cmd` and wait for its `OK`. Returns the acknowledgement payload.
    pub async fn command(&mut self, cmd: &[u8], deadline: &Deadline) -> Result<String> {
        self.send(cmd).await?;
        self.wait_for(deadline, acknowledgement).await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }
}

/// Reply handler matching `OK` (prefix) and `FAIL`.
pub fn acknowledgement(reply: Reply) -> Result<Wait<String>> {
    match reply {
        Reply::Ack(payload) => Ok(Wait::Done(payload)),
        Reply::Fail(reason) => Err(Error::Protocol(reason)),
        other => {
            trace!(?other, "discarding");
            Ok(Wait::Continue)
        }
    }
}

/// First word of a command, for logging without parameters (passwords).
fn command_name(cmd: &[u8]) -> &str {
    let end = cmd
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(cmd.len());
    std::str::from_utf8(&cmd[..end]).unwrap_or("?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::event;
    use routeb_test_harness::{MockHandle, MockTransport, scripts};
    use std::time::Duration;

    fn engine() -> (CommandEngine, MockHandle) {
        let mock = MockTransport::new();
        let handle = mock.handle();
        (
            CommandEngine::new(Box::new(mock), FramerConfig::default()),
            handle,
        )
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn command_returns_ack_payload() {
        let (mut engine, handle) = engine();
        handle.expect(b"SKSREG S2 21\r\n", b"SKSREG S2 21\r\nOK 01\r\n");

        let payload = engine
            .command(b"SKSREG S2 21\r\n", &deadline())
            .await
            .unwrap();
        assert_eq!(payload, "01");
        assert_eq!(handle.sent_data(), vec![b"SKSREG S2 21\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn command_surfaces_fail_reason() {
        let (mut engine, handle) = engine();
        handle.expect(b"SKSETRBID X\r\n", &scripts::fail("ER10"));

        match engine.command(b"SKSETRBID X\r\n", &deadline()).await {
            Err(Error::Protocol(reason)) => assert_eq!(reason, "ER10"),
            other => panic!("expected protocol failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrelated_notifications_are_skipped() {
        let (mut engine, handle) = engine();
        let mut response = scripts::event(event::UDP_SENT, "FE80::1");
        response.extend_from_slice(b"garbage line\r\n");
        response.extend_from_slice(&scripts::ok());
        handle.expect(b"SKJOIN FE80::1\r\n", &response);

        let payload = engine
            .command(b"SKJOIN FE80::1\r\n", &deadline())
            .await
            .unwrap();
        assert_eq!(payload, "");
    }

    #[tokio::test]
    async fn terminal_matches_marker_events() {
        let (mut engine, handle) = engine();
        handle.push(&scripts::event(event::BEACON_RECEIVED, "FE80::1"));
        handle.push(&scripts::event(event::ACTIVE_SCAN_COMPLETE, "FE80::2"));

        let terminal = engine
            .await_terminal(&deadline(), &[event::ACTIVE_SCAN_COMPLETE])
            .await
            .unwrap();
        match terminal {
            Terminal::Event(e) => {
                assert_eq!(e.code, event::ACTIVE_SCAN_COMPLETE);
                assert_eq!(e.sender.as_deref(), Some("FE80::2"));
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_ack_wins_when_first() {
        let (mut engine, handle) = engine();
        handle.push(b"OK\r\nEVENT 22 FE80::2\r\n");

        let terminal = engine
            .await_terminal(&deadline(), &[event::ACTIVE_SCAN_COMPLETE])
            .await
            .unwrap();
        assert_eq!(terminal, Terminal::Ack(String::new()));
        assert_eq!(engine.remainder(), b"EVENT 22 FE80::2\r\n");
    }

    #[tokio::test]
    async fn ack_split_across_reads() {
        let (mut engine, handle) = engine();
        handle.expect_chunked(b"SKSREG S3 8888\r\n", &[b"SKSREG S3 88", b"88\r\nO", b"K\r\n"]);

        assert!(
            engine
                .command(b"SKSREG S3 8888\r\n", &deadline())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn timeout_when_no_terminal() {
        let (mut engine, handle) = engine();
        handle.push(b"EVENT 21 FE80::1 00\r\nFA");

        let result = engine
            .await_terminal(&Deadline::after(Duration::from_millis(50)), &[])
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(engine.remainder(), b"FA");
    }

    #[test]
    fn command_name_hides_parameters() {
        assert_eq!(command_name(b"SKSETPWD C secret\r\n"), "SKSETPWD");
        assert_eq!(command_name(b"SKVER\r\n"), "SKVER");
    }
}
