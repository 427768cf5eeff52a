//! ECHONET Lite frames for the instantaneous power query.
//!
//! # Frame layout
//!
//! ```text
//! offset  0  1 | 2  3 | 4  5  6 | 7  8  9 | 10  | 11  | 12  | 13  | 14..
//!         EHD  | TID  | SEOJ    | DEOJ    | ESV | OPC | EPC | PDC | EDT
//! ```
//!
//! The request asks the smart meter object (`02 88 01`) for property
//! `E7`; the reply carries it as a 4-byte big-endian value in watts.

use tracing::{debug, trace, warn};

use routeb_core::error::{Error, Result};

use crate::commands::ECHONET_PORT;
use crate::engine::Wait;
use crate::reply::Reply;

pub type Eoj = [u8; 3];

/// ECHONET Lite header, format 1.
pub const EHD: [u8; 2] = [0x10, 0x81];
pub const TRANSACTION_ID: u16 = 0x0001;

/// Controller class group, our side of the exchange.
pub const CONTROLLER: Eoj = [0x05, 0xFF, 0x01];
/// Low-voltage smart electric energy meter.
pub const SMART_METER: Eoj = [0x02, 0x88, 0x01];

pub mod esv {
    pub const GET: u8 = 0x62;
    pub const GET_RES: u8 = 0x72;
    pub const GET_SNA: u8 = 0x52;
}

/// Instantaneous electric power, in watts.
pub const EPC_INSTANT_POWER: u8 = 0xE7;

/// Length of a frame carrying one property with no data.
pub const MIN_FRAME_LEN: usize = 14;

const SEOJ: usize = 4;
const ESV: usize = 10;
const EPC: usize = 12;
const PDC: usize = 13;
const EDT: usize = 14;

/// Get request for [`EPC_INSTANT_POWER`].
pub const INSTANT_POWER_REQUEST: [u8; MIN_FRAME_LEN] = [
    EHD[0],
    EHD[1],
    (TRANSACTION_ID >> 8) as u8,
    TRANSACTION_ID as u8,
    CONTROLLER[0],
    CONTROLLER[1],
    CONTROLLER[2],
    SMART_METER[0],
    SMART_METER[1],
    SMART_METER[2],
    esv::GET,
    0x01,
    EPC_INSTANT_POWER,
    0x00,
];

/// Decode an even-length hex string.
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "odd-length hex payload ({} digits)",
            text.len()
        )));
    }
    text.as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .filter(|s| s.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| Error::Decode(format!("invalid hex in payload: {text:?}")))
        })
        .collect()
}

/// Extract instantaneous power from a received frame.
///
/// `None` unless the frame is a smart meter's Get_Res for
/// [`EPC_INSTANT_POWER`] with a complete 4-byte value.
pub fn parse_instant_power(frame: &[u8]) -> Option<u32> {
    if frame.len() < MIN_FRAME_LEN
        || frame[..2] != EHD
        || frame[SEOJ..SEOJ + 3] != SMART_METER
        || frame[ESV] != esv::GET_RES
        || frame[EPC] != EPC_INSTANT_POWER
        || frame[PDC] != 4
    {
        return None;
    }
    match frame.get(EDT..EDT + 4) {
        Some(&[a, b, c, d]) => Some(u32::from_be_bytes([a, b, c, d])),
        _ => None,
    }
}

/// True for a smart meter refusing the power query (Get_SNA).
fn is_power_refusal(frame: &[u8]) -> bool {
    frame.len() >= MIN_FRAME_LEN
        && frame[SEOJ..SEOJ + 3] == SMART_METER
        && frame[ESV] == esv::GET_SNA
        && frame[EPC] == EPC_INSTANT_POWER
}

/// Wait for the power reply among received datagrams.
pub fn instant_power_reply(reply: Reply) -> Result<Wait<u32>> {
    match reply {
        Reply::Fail(reason) => Err(Error::Protocol(reason)),
        Reply::Datagram(datagram) => {
            if datagram.remote_port != ECHONET_PORT || datagram.local_port != ECHONET_PORT {
                trace!(
                    remote = datagram.remote_port,
                    local = datagram.local_port,
                    "ignoring non-ECHONET datagram"
                );
                return Ok(Wait::Continue);
            }
            if datagram.payload.len() < MIN_FRAME_LEN * 2 {
                debug!(payload = %datagram.payload, "ignoring short frame");
                return Ok(Wait::Continue);
            }
            let frame = decode_hex(&datagram.payload)?;
            match parse_instant_power(&frame) {
                Some(watts) => Ok(Wait::Done(watts)),
                None if is_power_refusal(&frame) => {
                    warn!(sender = %datagram.sender, "meter refused the power query (Get_SNA)");
                    Ok(Wait::Continue)
                }
                None => {
                    debug!(
                        sender = %datagram.sender,
                        destination = %datagram.destination,
                        payload = %datagram.payload,
                        "ignoring unrelated frame"
                    );
                    Ok(Wait::Continue)
                }
            }
        }
        other => {
            trace!(?other, "power query: discarding");
            Ok(Wait::Continue)
        }
    }
}
