//! GB/T 32960 wire protocol: framing, envelope codec, payload decoders.
//!
//! Frame layout (fixed 24-byte header, variable payload, 1-byte checksum):
//!
//! ```text
//! ┌────────┬─────┬──────┬────────┬─────┬─────────┬─────────┬─────┐
//! │ marker │ cmd │ resp │  VIN   │ enc │ len(BE) │ payload │ BCC │
//! │   2    │  1  │  1   │   17   │  1  │    2    │    N    │  1  │
//! └────────┴─────┴──────┴────────┴─────┴─────────┴─────────┴─────┘
//! ```
//!
//! The start marker selects the protocol revision: `##` (0x23 0x23) for the
//! 2016 edition, `$$` (0x24 0x24) for the 2025 edition. The BCC is the XOR of
//! every byte from the command octet up to (excluding) the checksum itself.

pub mod alarm;
pub mod battery;
pub mod framer;
pub mod login;
pub mod packet;
pub mod realtime;

pub use framer::{scan, FrameStep, Framer};
pub use packet::Packet;
pub use realtime::{RealtimeBlocks, RealtimeFrame, RealtimeRecord};

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Serialize, Serializer};

/// Start marker of the 2016 revision (`##`).
pub const START_2016: [u8; 2] = [0x23, 0x23];
/// Start marker of the 2025 revision (`$$`).
pub const START_2025: [u8; 2] = [0x24, 0x24];

/// Fixed header length: marker(2) + cmd(1) + resp(1) + VIN(17) + enc(1) + len(2).
pub const HEADER_LEN: usize = 24;
/// Smallest possible frame: header plus checksum.
pub const MIN_PACKET_LEN: usize = HEADER_LEN + 1;
/// Length of a VIN on the wire.
pub const VIN_LEN: usize = 17;

/// Response flag: request from the terminal, a reply is expected.
pub const RESP_REQUEST: u8 = 0xFE;
/// Response flag: success.
pub const RESP_SUCCESS: u8 = 0x01;
/// Response flag: failure.
pub const RESP_FAILURE: u8 = 0x02;
/// Response flag: VIN already logged in elsewhere.
pub const RESP_VIN_CONFLICT: u8 = 0x03;

/// Protocol revision, derived from the start marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProtocolVersion {
    /// GB/T 32960.3-2016, marker `##`.
    V2016,
    /// GB/T 32960.3-2025, marker `$$`.
    V2025,
}

impl ProtocolVersion {
    /// The two-byte start marker for this revision.
    pub fn marker(self) -> [u8; 2] {
        match self {
            ProtocolVersion::V2016 => START_2016,
            ProtocolVersion::V2025 => START_2025,
        }
    }
}

/// Envelope command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 0x01: vehicle login.
    VehicleLogin,
    /// 0x02: realtime report.
    Realtime,
    /// 0x03: vehicle logout.
    Logout,
    /// 0x05: platform login.
    PlatformLogin,
    /// 0x07: heartbeat.
    Heartbeat,
    /// Any opcode the gateway does not interpret.
    Other(u8),
}

impl Command {
    /// Map a raw opcode. Never fails; unhandled opcodes become
    /// [`Command::Other`] so the handler can log and touch the session.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Command::VehicleLogin,
            0x02 => Command::Realtime,
            0x03 => Command::Logout,
            0x05 => Command::PlatformLogin,
            0x07 => Command::Heartbeat,
            other => Command::Other(other),
        }
    }

    /// Raw opcode value.
    pub fn to_byte(self) -> u8 {
        match self {
            Command::VehicleLogin => 0x01,
            Command::Realtime => 0x02,
            Command::Logout => 0x03,
            Command::PlatformLogin => 0x05,
            Command::Heartbeat => 0x07,
            Command::Other(b) => b,
        }
    }
}

/// Data-collection timestamp carried by most payloads.
///
/// Six bytes on the wire: year-2000, month, day, hour, minute, second.
/// Replies echo the request's bytes verbatim, so the raw form is kept and
/// calendar conversion happens only for logging and sink output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectTime(pub [u8; 6]);

impl CollectTime {
    /// Read a collect time from the front of `data`.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = data.get(..6)?.try_into().ok()?;
        Some(CollectTime(bytes))
    }

    /// The current wall-clock time, for replies to requests too short to
    /// carry a timestamp.
    pub fn now() -> Self {
        let now = Local::now().naive_local();
        CollectTime([
            (now.year() - 2000).clamp(0, 255) as u8,
            now.month() as u8,
            now.day() as u8,
            now.hour() as u8,
            now.minute() as u8,
            now.second() as u8,
        ])
    }

    /// Raw wire bytes.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Calendar form, if the bytes name a real date.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        let [y, mo, d, h, mi, s] = self.0;
        NaiveDate::from_ymd_opt(2000 + i32::from(y), u32::from(mo), u32::from(d))?
            .and_hms_opt(u32::from(h), u32::from(mi), u32::from(s))
    }
}

impl Serialize for CollectTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.to_datetime() {
            Some(dt) => serializer.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => self.0.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_roundtrip() {
        for byte in [0x01u8, 0x02, 0x03, 0x05, 0x07, 0x42] {
            assert_eq!(Command::from_byte(byte).to_byte(), byte);
        }
    }

    #[test]
    fn test_unknown_command_is_other() {
        assert_eq!(Command::from_byte(0x09), Command::Other(0x09));
    }

    #[test]
    fn test_collect_time_datetime() {
        let t = CollectTime([24, 5, 1, 12, 30, 5]);
        let dt = t.to_datetime().expect("valid date");
        assert_eq!(dt.format("%Y-%m-%dT%H:%M:%S").to_string(), "2024-05-01T12:30:05");
    }

    #[test]
    fn test_collect_time_invalid_date() {
        let t = CollectTime([24, 13, 40, 25, 61, 61]);
        assert!(t.to_datetime().is_none());
    }
}
