//! Domain types shared by the driver and its collaborators.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameters identifying a discovered Route B PAN.
///
/// A descriptor is only ever produced complete: the scan either yields a
/// value for every field or fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanDescriptor {
    /// Coordinator MAC address, 16 uppercase hex digits.
    pub mac_address: String,
    /// Link-local IPv6 address resolved from `mac_address`.
    pub link_local_address: String,
    /// Logical channel number.
    pub channel: u8,
    /// Channel page.
    pub channel_page: u8,
    /// PAN identifier.
    pub pan_id: u16,
    /// Pairing identifier reported by the coordinator.
    pub pair_id: u32,
    /// Side flag reported by dual-interface modules.
    pub side: u32,
    /// Link quality indicator of the received beacon.
    pub lqi: u8,
}

/// Progress of the network join sequence.
///
/// Status only moves forward; returning to [`JoinStatus::Disconnected`]
/// requires an explicit reset by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinStatus {
    Disconnected,
    Authenticated,
    Scanned,
    Registering,
    Joining,
    Joined,
    Failed,
}

impl fmt::Display for JoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinStatus::Disconnected => "disconnected",
            JoinStatus::Authenticated => "authenticated",
            JoinStatus::Scanned => "scanned",
            JoinStatus::Registering => "registering",
            JoinStatus::Joining => "joining",
            JoinStatus::Joined => "joined",
            JoinStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One instantaneous power measurement from the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerReading {
    /// Instantaneous power in watts.
    pub watts: u32,
    /// When the reply frame was decoded.
    pub captured_at: DateTime<Utc>,
}

impl PowerReading {
    /// A reading captured now.
    pub fn now(watts: u32) -> Self {
        PowerReading {
            watts,
            captured_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_status_display() {
        assert_eq!(JoinStatus::Disconnected.to_string(), "disconnected");
        assert_eq!(JoinStatus::Joined.to_string(), "joined");
        assert_eq!(JoinStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn pan_descriptor_json_round_trip() {
        let pan = PanDescriptor {
            mac_address: "001D129012345678".into(),
            link_local_address: "FE80:0000:0000:0000:021D:1290:1234:5678".into(),
            channel: 0x21,
            channel_page: 0x09,
            pan_id: 0x8888,
            pair_id: 0xABCD,
            side: 0,
            lqi: 0x9B,
        };
        let json = serde_json::to_string(&pan).unwrap();
        let back: PanDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pan);
    }

    #[test]
    fn power_reading_now_keeps_watts() {
        let r = PowerReading::now(888);
        assert_eq!(r.watts, 888);
        assert!(r.captured_at <= Utc::now());
    }
}
