//! SKSTACK line codec.
//!
//! The module speaks ASCII over the serial link. Every command and every
//! response or notification line ends with CR LF.
//!
//! # Command format
//!
//! ```text
//! <NAME> <param> <param> ...\r\n
//! ```
//!
//! `SKSENDTO` is the exception: its parameter list ends with a space and is
//! followed by the raw binary payload, with no terminator. Its length is
//! given in one of the parameters.
//!
//! # Read side
//!
//! The module pads some reads with NUL bytes. They never carry meaning and
//! are dropped before line splitting.

use bytes::{BufMut, BytesMut};

/// Line terminator for commands and responses.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Padding byte that may appear in reads.
pub const PADDING: u8 = 0x00;

/// Result of attempting to split one line off a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete line was found.
    Line {
        /// Line contents without the terminator, decoded lossily as UTF-8.
        line: String,
        /// Number of bytes consumed from the buffer, terminator included.
        consumed: usize,
    },

    /// No terminator yet. More data is needed.
    Incomplete,
}

/// Split the first CRLF-terminated line off `buf`.
///
/// A bare CR or LF is not a terminator; it stays part of the line.
pub fn decode_line(buf: &[u8]) -> DecodeResult {
    match buf
        .windows(TERMINATOR.len())
        .position(|w| w == TERMINATOR)
    {
        Some(pos) => DecodeResult::Line {
            line: String::from_utf8_lossy(&buf[..pos]).into_owned(),
            consumed: pos + TERMINATOR.len(),
        },
        None => DecodeResult::Incomplete,
    }
}

/// Append `chunk` to `buf`, dropping padding bytes.
///
/// Returns the number of bytes actually appended.
pub fn append_stripped(buf: &mut BytesMut, chunk: &[u8]) -> usize {
    let before = buf.len();
    for piece in chunk.split(|&b| b == PADDING) {
        buf.put_slice(piece);
    }
    buf.len() - before
}

/// Encode a command line: name and space-separated parameters, then CRLF.
///
/// # Example
///
/// ```
/// use routeb_skstack::protocol::encode_command;
///
/// assert_eq!(encode_command("SKSREG", &["S2", "21"]), b"SKSREG S2 21\r\n");
/// assert_eq!(encode_command("SKVER", &[]), b"SKVER\r\n");
/// ```
pub fn encode_command(name: &str, params: &[&str]) -> Vec<u8> {
    let mut buf = encode_head(name, params);
    buf.put_slice(TERMINATOR);
    buf.to_vec()
}

/// Encode a command whose parameters are followed by a raw binary payload.
///
/// The parameter list is closed with a single space and `data` follows
/// as-is, without a terminator.
pub fn encode_command_with_data(name: &str, params: &[&str], data: &[u8]) -> Vec<u8> {
    let mut buf = encode_head(name, params);
    buf.put_u8(b' ');
    buf.put_slice(data);
    buf.to_vec()
}

fn encode_head(name: &str, params: &[&str]) -> BytesMut {
    let capacity = name.len() + params.iter().map(|p| p.len() + 1).sum::<usize>() + 2;
    let mut buf = BytesMut::with_capacity(capacity);
    buf.put_slice(name.as_bytes());
    for param in params {
        buf.put_u8(b' ');
        buf.put_slice(param.as_bytes());
    }
    buf
}
