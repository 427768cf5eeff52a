//! Canned module output.
//!
//! Helpers that render the lines an SKSTACK module prints, so tests can
//! script realistic sessions without spelling out every byte.

use routeb_core::types::PanDescriptor;

/// Our own link-local address as printed in `ERXUDP` destination fields.
pub const LOCAL_ADDRESS: &str = "FE80:0000:0000:0000:1234:5678:9ABC:DEF0";

/// `OK`
pub fn ok() -> Vec<u8> {
    b"OK\r\n".to_vec()
}

/// `FAIL <code>`
pub fn fail(code: &str) -> Vec<u8> {
    format!("FAIL {code}\r\n").into_bytes()
}

/// `EVENT <code> <sender>`
pub fn event(code: u8, sender: &str) -> Vec<u8> {
    format!("EVENT {code:02X} {sender}\r\n").into_bytes()
}

/// Link-local address derived from a 64-bit MAC (universal/local bit flipped).
///
/// Returns `None` if `mac` is not 16 hex digits.
pub fn link_local_from_mac(mac: &str) -> Option<String> {
    if mac.len() != 16 || !mac.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let first = u8::from_str_radix(&mac[..2], 16).ok()? ^ 0x02;
    let iid = format!("{first:02X}{}", &mac[2..]).to_ascii_uppercase();
    Some(format!(
        "FE80:0000:0000:0000:{}:{}:{}:{}",
        &iid[0..4],
        &iid[4..8],
        &iid[8..12],
        &iid[12..16]
    ))
}

/// The indented key/value block of one PAN descriptor, without header.
pub fn pan_fields(pan: &PanDescriptor) -> String {
    format!(
        "  Channel:{:02X}\r\n  Channel Page:{:02X}\r\n  Pan ID:{:04X}\r\n  Addr:{}\r\n  LQI:{:02X}\r\n  PairID:{:08X}\r\n  Side:{:X}\r\n",
        pan.channel, pan.channel_page, pan.pan_id, pan.mac_address, pan.lqi, pan.pair_id, pan.side
    )
}

/// Beacon notification, `EPANDESC` header and field block for one PAN.
pub fn epandesc(pan: &PanDescriptor) -> Vec<u8> {
    format!(
        "EVENT 20 {}\r\nEPANDESC\r\n{}",
        pan.link_local_address,
        pan_fields(pan)
    )
    .into_bytes()
}

/// Active scan completion notification.
pub fn scan_complete() -> Vec<u8> {
    event(0x22, LOCAL_ADDRESS)
}

/// `ERXUDP` notification carrying `payload` from `sender` on the
/// ECHONET Lite port.
pub fn erxudp(sender: &str, sender_mac: &str, payload: &[u8]) -> Vec<u8> {
    let hex: String = payload.iter().map(|b| format!("{b:02X}")).collect();
    format!(
        "ERXUDP {sender} {LOCAL_ADDRESS} 0E1A 0E1A {sender_mac} 1 {:04X} {hex}\r\n",
        payload.len()
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_local_flips_universal_bit() {
        assert_eq!(
            link_local_from_mac("001D129012345678").as_deref(),
            Some("FE80:0000:0000:0000:021D:1290:1234:5678")
        );
        assert_eq!(link_local_from_mac("XYZ"), None);
    }

    #[test]
    fn erxudp_renders_length_and_hex() {
        let line = erxudp("FE80::1", "001D129012345678", &[0x10, 0x81]);
        let text = String::from_utf8(line).unwrap();
        assert!(text.starts_with("ERXUDP FE80::1 "));
        assert!(text.ends_with(" 0002 1081\r\n"));
    }
}
