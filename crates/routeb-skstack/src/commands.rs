//! SKSTACK command builders and scan result parsing.
//!
//! Builders validate their inputs and return the encoded bytes; nothing here
//! touches the transport.

use std::collections::BTreeMap;

use routeb_core::error::{Error, Result};
use routeb_core::types::PanDescriptor;

use crate::protocol::{encode_command, encode_command_with_data};

/// `SKSCAN` mode 2: active scan with information element.
pub const SCAN_MODE_ACTIVE: &str = "2";

/// Channel mask covering every channel.
pub const ALL_CHANNELS: &str = "FFFFFFFF";

/// Largest scan duration exponent the module accepts.
pub const MAX_SCAN_DURATION: u8 = 14;

/// UDP port used by ECHONET Lite.
pub const ECHONET_PORT: u16 = 0x0E1A;

/// Length of a Route B authentication ID.
pub const ROUTE_B_ID_LEN: usize = 32;

/// Longest password `SKSETPWD` accepts.
pub const MAX_PASSWORD_LEN: usize = 32;

/// Largest payload one `SKSENDTO` can carry.
pub const MAX_UDP_PAYLOAD: usize = 1232;

/// First security handle; the one PANA sets up.
const SECURITY_HANDLE: &str = "1";

/// `SKSETPWD <len> <password>`, length in hex.
pub fn set_password(password: &str) -> Result<Vec<u8>> {
    if password.is_empty() || password.len() > MAX_PASSWORD_LEN {
        return Err(Error::InvalidParameter(format!(
            "password must be 1 to {MAX_PASSWORD_LEN} characters"
        )));
    }
    if !is_printable_word(password) {
        return Err(Error::InvalidParameter(
            "password must be printable ASCII without spaces".into(),
        ));
    }
    let len = format!("{:X}", password.len());
    Ok(encode_command("SKSETPWD", &[&len, password]))
}

/// `SKSETRBID <id>`
pub fn set_route_b_id(id: &str) -> Result<Vec<u8>> {
    if id.len() != ROUTE_B_ID_LEN || !is_printable_word(id) {
        return Err(Error::InvalidParameter(format!(
            "Route B ID must be {ROUTE_B_ID_LEN} printable characters"
        )));
    }
    Ok(encode_command("SKSETRBID", &[id]))
}

/// `SKSCAN 2 FFFFFFFF <duration>`
pub fn active_scan(duration: u8) -> Result<Vec<u8>> {
    if duration > MAX_SCAN_DURATION {
        return Err(Error::InvalidParameter(format!(
            "scan duration {duration} exceeds {MAX_SCAN_DURATION}"
        )));
    }
    let duration = format!("{duration:X}");
    Ok(encode_command("SKSCAN", &[SCAN_MODE_ACTIVE, ALL_CHANNELS, &duration]))
}

/// `SKLL64 <mac>`
pub fn link_local_address(mac: &str) -> Result<Vec<u8>> {
    if !is_mac(mac) {
        return Err(Error::InvalidParameter(format!(
            "MAC address must be 16 hex digits, got {mac:?}"
        )));
    }
    Ok(encode_command("SKLL64", &[mac]))
}

/// `SKSREG S2 <channel>`
pub fn set_channel(channel: u8) -> Vec<u8> {
    encode_command("SKSREG", &["S2", &format!("{channel:02X}")])
}

/// `SKSREG S3 <pan id>`
pub fn set_pan_id(pan_id: u16) -> Vec<u8> {
    encode_command("SKSREG", &["S3", &format!("{pan_id:04X}")])
}

/// `SKJOIN <address>`
pub fn join(address: &str) -> Vec<u8> {
    encode_command("SKJOIN", &[address])
}

/// `SKSENDTO 1 <address> <port> <sec> <len> <payload>`
pub fn send_udp(address: &str, port: u16, secured: bool, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() || payload.len() > MAX_UDP_PAYLOAD {
        return Err(Error::InvalidParameter(format!(
            "UDP payload must be 1 to {MAX_UDP_PAYLOAD} bytes, got {}",
            payload.len()
        )));
    }
    let port = format!("{port:04X}");
    let sec = if secured { "1" } else { "0" };
    let len = format!("{:04X}", payload.len());
    Ok(encode_command_with_data(
        "SKSENDTO",
        &[SECURITY_HANDLE, address, &port, sec, &len],
        payload,
    ))
}

/// Parameters of one scanned PAN, before its link-local address is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedPan {
    pub mac_address: String,
    pub channel: u8,
    pub channel_page: u8,
    pub pan_id: u16,
    pub pair_id: u32,
    pub side: u32,
    pub lqi: u8,
}

impl ScannedPan {
    pub fn into_descriptor(self, link_local_address: String) -> PanDescriptor {
        PanDescriptor {
            mac_address: self.mac_address,
            link_local_address,
            channel: self.channel,
            channel_page: self.channel_page,
            pan_id: self.pan_id,
            pair_id: self.pair_id,
            side: self.side,
            lqi: self.lqi,
        }
    }
}

/// Build a [`ScannedPan`] from one `EPANDESC` block.
///
/// Every key must be present with a hex value that fits its field.
pub fn parse_scan_fields(fields: &BTreeMap<String, String>) -> Result<ScannedPan> {
    let get = |key: &str| {
        fields
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::Decode(format!("scan result missing {key}")))
    };

    let mac_address = get("Addr")?;
    if !is_mac(mac_address) {
        return Err(Error::Decode(format!("invalid Addr {mac_address:?}")));
    }

    Ok(ScannedPan {
        mac_address: mac_address.to_ascii_uppercase(),
        channel: parse_hex("Channel", get("Channel")?)?,
        channel_page: parse_hex("Channel Page", get("Channel Page")?)?,
        pan_id: parse_hex("Pan ID", get("Pan ID")?)?,
        pair_id: parse_hex("PairID", get("PairID")?)?,
        side: parse_hex("Side", get("Side")?)?,
        lqi: parse_hex("LQI", get("LQI")?)?,
    })
}

fn parse_hex<T: TryFrom<u64>>(key: &str, value: &str) -> Result<T> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::Decode(format!("{key} is not hex: {value:?}")));
    }
    u64::from_str_radix(value, 16)
        .ok()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| Error::Decode(format!("{key} out of range: {value}")))
}

fn is_mac(s: &str) -> bool {
    s.len() == 16 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_printable_word(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_graphic())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_block() -> BTreeMap<String, String> {
        block(&[
            ("Channel", "21"),
            ("Channel Page", "09"),
            ("Pan ID", "8888"),
            ("Addr", "001d129012345678"),
            ("LQI", "E1"),
            ("PairID", "00AABBCC"),
            ("Side", "0"),
        ])
    }

    #[test]
    fn password_length_is_hex() {
        assert_eq!(
            set_password("0123456789AB").unwrap(),
            b"SKSETPWD C 0123456789AB\r\n"
        );
    }

    #[test]
    fn password_bounds() {
        assert!(matches!(set_password(""), Err(Error::InvalidParameter(_))));
        assert!(set_password(&"x".repeat(32)).is_ok());
        assert!(matches!(
            set_password(&"x".repeat(33)),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            set_password("two words"),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn route_b_id_must_be_32_chars() {
        let id = "0".repeat(32);
        assert_eq!(
            set_route_b_id(&id).unwrap(),
            format!("SKSETRBID {id}\r\n").into_bytes()
        );
        assert!(set_route_b_id("short").is_err());
        assert!(set_route_b_id(&format!("{} ", "0".repeat(31))).is_err());
    }

    #[test]
    fn scan_command() {
        assert_eq!(active_scan(6).unwrap(), b"SKSCAN 2 FFFFFFFF 6\r\n");
        assert_eq!(active_scan(14).unwrap(), b"SKSCAN 2 FFFFFFFF E\r\n");
        assert!(matches!(active_scan(15), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn register_commands_are_zero_padded() {
        assert_eq!(set_channel(0x21), b"SKSREG S2 21\r\n");
        assert_eq!(set_channel(4), b"SKSREG S2 04\r\n");
        assert_eq!(set_pan_id(0x8888), b"SKSREG S3 8888\r\n");
        assert_eq!(set_pan_id(0x12), b"SKSREG S3 0012\r\n");
    }

    #[test]
    fn link_local_address_validates_mac() {
        assert_eq!(
            link_local_address("001D129012345678").unwrap(),
            b"SKLL64 001D129012345678\r\n"
        );
        assert!(link_local_address("001D1290").is_err());
    }

    #[test]
    fn send_udp_frames_binary_payload() {
        let cmd = send_udp("FE80::1", ECHONET_PORT, true, &[0x10, 0x81]).unwrap();
        assert_eq!(cmd, b"SKSENDTO 1 FE80::1 0E1A 1 0002 \x10\x81");
        assert!(send_udp("FE80::1", ECHONET_PORT, true, &[]).is_err());
    }

    #[test]
    fn parse_complete_block() {
        let pan = parse_scan_fields(&full_block()).unwrap();
        assert_eq!(
            pan,
            ScannedPan {
                mac_address: "001D129012345678".into(),
                channel: 0x21,
                channel_page: 0x09,
                pan_id: 0x8888,
                pair_id: 0x00AABBCC,
                side: 0,
                lqi: 0xE1,
            }
        );
    }

    #[test]
    fn parse_rejects_missing_key() {
        let mut fields = full_block();
        fields.remove("LQI");
        match parse_scan_fields(&fields) {
            Err(Error::Decode(msg)) => assert!(msg.contains("LQI"), "{msg}"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_out_of_range_and_non_hex() {
        let mut fields = full_block();
        fields.insert("Channel".into(), "100".into());
        assert!(matches!(parse_scan_fields(&fields), Err(Error::Decode(_))));

        let mut fields = full_block();
        fields.insert("Pan ID".into(), "+888".into());
        assert!(matches!(parse_scan_fields(&fields), Err(Error::Decode(_))));

        let mut fields = full_block();
        fields.insert("Addr".into(), "001D12".into());
        assert!(matches!(parse_scan_fields(&fields), Err(Error::Decode(_))));
    }

    #[test]
    fn descriptor_carries_every_field() {
        let pan = parse_scan_fields(&full_block()).unwrap();
        let desc = pan.into_descriptor("FE80::21D:1290:1234:5678".into());
        assert_eq!(desc.pan_id, 0x8888);
        assert_eq!(desc.link_local_address, "FE80::21D:1290:1234:5678");
        assert_eq!(desc.mac_address, "001D129012345678");
    }
}
