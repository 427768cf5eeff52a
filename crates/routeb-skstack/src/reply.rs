//! Classification of module output lines.
//!
//! Synchronous acknowledgements and asynchronous notifications share one
//! stream. [`classify`] turns each line into a [`Reply`] so waits can match
//! on structure instead of raw text.

use std::fmt;

/// `EVENT` codes emitted by SKSTACK modules.
pub mod event {
    pub const NS_RECEIVED: u8 = 0x01;
    pub const NA_RECEIVED: u8 = 0x02;
    pub const ECHO_REQUEST: u8 = 0x05;
    pub const ED_SCAN_COMPLETE: u8 = 0x1F;
    pub const BEACON_RECEIVED: u8 = 0x20;
    pub const UDP_SENT: u8 = 0x21;
    pub const ACTIVE_SCAN_COMPLETE: u8 = 0x22;
    /// PANA authentication failed.
    pub const PANA_FAILED: u8 = 0x24;
    /// PANA authentication succeeded; the PAN is joined.
    pub const PANA_SUCCEEDED: u8 = 0x25;
    pub const SESSION_CLOSE_REQUEST: u8 = 0x26;
    pub const SESSION_CLOSED: u8 = 0x27;
    pub const SESSION_CLOSE_TIMEOUT: u8 = 0x28;
    pub const SESSION_EXPIRED: u8 = 0x29;
    pub const SEND_LIMIT_ENGAGED: u8 = 0x32;
    pub const SEND_LIMIT_RELEASED: u8 = 0x33;
}

/// Keys printed in an `EPANDESC` block.
pub const SCAN_KEYS: &[&str] = &[
    "Channel",
    "Channel Page",
    "Pan ID",
    "Addr",
    "LQI",
    "PairID",
    "Side",
];

/// An `EVENT <code> <sender> [<param>]` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub code: u8,
    pub sender: Option<String>,
    pub param: Option<String>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EVENT {:02X}", self.code)?;
        if let Some(sender) = &self.sender {
            write!(f, " {sender}")?;
        }
        if let Some(param) = &self.param {
            write!(f, " {param}")?;
        }
        Ok(())
    }
}

/// An `ERXUDP` receive notification.
///
/// Field layout differs slightly between module families (some insert
/// RSSI or side fields), but the payload is always the last field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub sender: String,
    pub destination: String,
    pub remote_port: u16,
    pub local_port: u16,
    /// Hex-encoded payload.
    pub payload: String,
}

/// One classified output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `OK`, possibly followed by a payload.
    Ack(String),
    /// `FAIL <reason>`.
    Fail(String),
    Event(Event),
    /// `EPANDESC`, the header of a scan result block.
    PanDescHeader,
    /// `Key:Value` line of a scan result block.
    Field { key: String, value: String },
    Datagram(Datagram),
    /// Echo of a command we sent.
    Echo(String),
    /// Anything else, including bare addresses printed by `SKLL64`.
    Other(String),
}

/// Classify one line (without its terminator).
pub fn classify(line: &str) -> Reply {
    let text = line.trim_end();

    if let Some(payload) = token_rest(text, "OK") {
        return Reply::Ack(payload.to_string());
    }
    if let Some(reason) = token_rest(text, "FAIL") {
        return Reply::Fail(reason.to_string());
    }
    if token_rest(text, "EVENT").is_some() {
        return parse_event(text).map_or_else(|| Reply::Other(text.to_string()), Reply::Event);
    }
    if text == "EPANDESC" {
        return Reply::PanDescHeader;
    }
    if token_rest(text, "ERXUDP").is_some() {
        return parse_datagram(text)
            .map_or_else(|| Reply::Other(text.to_string()), Reply::Datagram);
    }
    if let Some((key, value)) = text.split_once(':') {
        let key = key.trim();
        if text.starts_with(char::is_whitespace) || SCAN_KEYS.contains(&key) {
            return Reply::Field {
                key: key.to_string(),
                value: value.trim().to_string(),
            };
        }
    }
    if text.starts_with("SK") {
        return Reply::Echo(text.to_string());
    }
    Reply::Other(text.to_string())
}

/// If `text` starts with the whole word `token`, return what follows it.
fn token_rest<'a>(text: &'a str, token: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(token)?;
    if rest.is_empty() {
        Some(rest)
    } else if rest.starts_with(' ') {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn parse_event(text: &str) -> Option<Event> {
    let mut fields = text.split_whitespace().skip(1);
    let code = u8::from_str_radix(fields.next()?, 16).ok()?;
    Some(Event {
        code,
        sender: fields.next().map(str::to_string),
        param: fields.next().map(str::to_string),
    })
}

fn parse_datagram(text: &str) -> Option<Datagram> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() < 6 {
        return None;
    }
    Some(Datagram {
        sender: fields[1].to_string(),
        destination: fields[2].to_string(),
        remote_port: u16::from_str_radix(fields[3], 16).ok()?,
        local_port: u16::from_str_radix(fields[4], 16).ok()?,
        payload: fields[fields.len() - 1].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_bare_and_with_payload() {
        assert_eq!(classify("OK"), Reply::Ack(String::new()));
        assert_eq!(classify("OK 01"), Reply::Ack("01".into()));
        assert_eq!(classify("OK  "), Reply::Ack(String::new()));
    }

    #[test]
    fn ack_needs_word_boundary() {
        assert_eq!(classify("OKAY"), Reply::Other("OKAY".into()));
        assert_eq!(classify("OK01"), Reply::Other("OK01".into()));
    }

    #[test]
    fn fail_keeps_reason_verbatim() {
        assert_eq!(classify("FAIL ER10"), Reply::Fail("ER10".into()));
        assert_eq!(classify("FAIL"), Reply::Fail(String::new()));
    }

    #[test]
    fn event_with_sender_and_param() {
        assert_eq!(
            classify("EVENT 21 FE80:0000:0000:0000:021D:1290:1234:5678 00"),
            Reply::Event(Event {
                code: event::UDP_SENT,
                sender: Some("FE80:0000:0000:0000:021D:1290:1234:5678".into()),
                param: Some("00".into()),
            })
        );
    }

    #[test]
    fn event_code_only() {
        assert_eq!(
            classify("EVENT 25"),
            Reply::Event(Event {
                code: event::PANA_SUCCEEDED,
                sender: None,
                param: None,
            })
        );
    }

    #[test]
    fn malformed_event_code_is_other() {
        assert_eq!(classify("EVENT ZZ"), Reply::Other("EVENT ZZ".into()));
    }

    #[test]
    fn event_display_round_trips_text() {
        let line = "EVENT 24 FE80:0000:0000:0000:021D:1290:1234:5678";
        match classify(line) {
            Reply::Event(e) => assert_eq!(e.to_string(), line),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn scan_block_lines() {
        assert_eq!(classify("EPANDESC"), Reply::PanDescHeader);
        assert_eq!(
            classify("  Channel Page:09"),
            Reply::Field {
                key: "Channel Page".into(),
                value: "09".into(),
            }
        );
        // Known keys are recognised without indentation too.
        assert_eq!(
            classify("Pan ID:8888"),
            Reply::Field {
                key: "Pan ID".into(),
                value: "8888".into(),
            }
        );
    }

    #[test]
    fn bare_address_is_not_a_field() {
        let addr = "FE80:0000:0000:0000:021D:1290:1234:5678";
        assert_eq!(classify(addr), Reply::Other(addr.into()));
    }

    #[test]
    fn command_echo() {
        assert_eq!(
            classify("SKLL64 001D129012345678"),
            Reply::Echo("SKLL64 001D129012345678".into())
        );
    }

    #[test]
    fn datagram_payload_is_last_field() {
        let line = "ERXUDP FE80:0000:0000:0000:021D:1290:1234:5678 \
                    FE80:0000:0000:0000:1234:5678:9ABC:DEF0 0E1A 0E1A \
                    001D129012345678 1 0012 1081000102880105FF017201E70400000378";
        match classify(line) {
            Reply::Datagram(d) => {
                assert_eq!(d.remote_port, 0x0E1A);
                assert_eq!(d.local_port, 0x0E1A);
                assert_eq!(d.payload, "1081000102880105FF017201E70400000378");
            }
            other => panic!("expected datagram, got {other:?}"),
        }
    }

    #[test]
    fn truncated_datagram_is_other() {
        assert!(matches!(classify("ERXUDP FE80::1 0E1A"), Reply::Other(_)));
    }
}
