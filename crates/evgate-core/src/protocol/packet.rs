//! Packet envelope encode/decode.

use super::{framer, Command, ProtocolVersion, HEADER_LEN, MIN_PACKET_LEN, VIN_LEN};
use crate::error::{Error, Result};

/// A decoded GB/T 32960 envelope.
///
/// `payload` is an owned copy of the data unit; the packet stays valid after
/// the connection buffer it was framed from is advanced or overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Protocol revision, from the start marker.
    pub version: ProtocolVersion,
    /// Command opcode.
    pub command: Command,
    /// Response flag: 0xFE request, 0x01 success, 0x02 failure, 0x03 VIN
    /// conflict.
    pub response: u8,
    /// Vehicle identifier, trailing NULs and spaces stripped.
    pub vin: String,
    /// Encryption byte; reported to consumers, not interpreted here.
    pub encryption: u8,
    /// Data unit.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Encode to wire bytes.
    ///
    /// The encoder always emits the 2016 (`##`) start marker, whatever
    /// `version` says; replies to 2025 terminals carry it too. A zero
    /// response flag is substituted with 0xFE (request). VINs longer than 17
    /// bytes are truncated, shorter ones NUL-padded.
    pub fn encode(&self) -> Vec<u8> {
        let payload_len = self.payload.len().min(u16::MAX as usize);
        let total_len = HEADER_LEN + payload_len + 1;
        let mut buf = vec![0u8; total_len];

        buf[0..2].copy_from_slice(&super::START_2016);
        buf[2] = self.command.to_byte();
        buf[3] = if self.response == 0 { super::RESP_REQUEST } else { self.response };

        let vin = self.vin.as_bytes();
        let n = vin.len().min(VIN_LEN);
        buf[4..4 + n].copy_from_slice(&vin[..n]);

        buf[21] = self.encryption;
        buf[22..24].copy_from_slice(&(payload_len as u16).to_be_bytes());
        buf[24..24 + payload_len].copy_from_slice(&self.payload[..payload_len]);

        buf[total_len - 1] = framer::bcc(&buf[2..total_len - 1]);
        buf
    }

    /// Decode a complete frame as produced by the framer.
    ///
    /// The framer has already validated the checksum; this checks the
    /// structural fields again so the function is safe on any input.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < MIN_PACKET_LEN {
            return Err(Error::Frame(format!("frame too short: {} bytes", frame.len())));
        }

        let version = match [frame[0], frame[1]] {
            super::START_2016 => ProtocolVersion::V2016,
            super::START_2025 => ProtocolVersion::V2025,
            [a, b] => {
                return Err(Error::Frame(format!("invalid start marker: {a:02X}{b:02X}")));
            }
        };

        let declared = u16::from_be_bytes([frame[22], frame[23]]) as usize;
        if frame.len() != HEADER_LEN + declared + 1 {
            return Err(Error::Frame(format!(
                "length mismatch: declared {declared}, frame {}",
                frame.len()
            )));
        }

        let vin = String::from_utf8_lossy(&frame[4..4 + VIN_LEN])
            .trim_end_matches(['\0', ' '])
            .to_string();

        Ok(Packet {
            version,
            command: Command::from_byte(frame[2]),
            response: frame[3],
            vin,
            encryption: frame[21],
            payload: frame[24..24 + declared].to_vec(),
        })
    }
}
