//! Login / logout payload decoders and reply payload builders.

use super::CollectTime;
use crate::error::{Error, Result};

/// Vehicle login payload (command 0x01).
///
/// Wire layout: collect time (6) + login sequence (2, BE) + ICCID (20 ASCII)
/// + rechargeable-storage subsystem count (1) + system coding length (1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleLogin {
    /// Data collection time.
    pub collect_time: CollectTime,
    /// Login sequence number.
    pub seq: u16,
    /// SIM card identifier of the terminal.
    pub iccid: String,
    /// Number of rechargeable energy-storage subsystems.
    pub subsystem_count: u8,
    /// Length of each subsystem code.
    pub coding_len: u8,
}

impl VehicleLogin {
    /// Decode from a data unit.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 30 {
            return Err(Error::Payload(format!(
                "vehicle login too short: {} bytes, need 30",
                data.len()
            )));
        }
        Ok(Self {
            collect_time: CollectTime::from_slice(data)
                .ok_or_else(|| Error::Payload("missing collect time".into()))?,
            seq: u16::from_be_bytes([data[6], data[7]]),
            iccid: trim_padding(&data[8..28]),
            subsystem_count: data[28],
            coding_len: data[29],
        })
    }
}

/// Vehicle logout payload (command 0x03): collect time (6) + sequence (2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleLogout {
    /// Logout time.
    pub collect_time: CollectTime,
    /// Logout sequence number; matches the login sequence of the session.
    pub seq: u16,
}

impl VehicleLogout {
    /// Decode from a data unit.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::Payload(format!(
                "vehicle logout too short: {} bytes, need 8",
                data.len()
            )));
        }
        Ok(Self {
            collect_time: CollectTime::from_slice(data)
                .ok_or_else(|| Error::Payload("missing collect time".into()))?,
            seq: u16::from_be_bytes([data[6], data[7]]),
        })
    }
}

/// Platform login payload (command 0x05).
///
/// Wire layout: collect time (6) + sequence (2) + username (12, NUL-padded)
/// + password (20, NUL-padded) + encryption (1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformLogin {
    /// Platform account name.
    pub username: String,
    /// Platform account password.
    pub password: String,
}

impl PlatformLogin {
    /// Decode from a data unit.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 40 {
            return Err(Error::Payload(format!(
                "platform login too short: {} bytes, need 40",
                data.len()
            )));
        }
        Ok(Self {
            username: trim_padding(&data[8..20]),
            password: trim_padding(&data[20..40]),
        })
    }
}

/// General reply payload: 6-byte echo of the request's collect time.
///
/// When the request was too short to carry one, the current time is used, as
/// the terminal only checks the field's presence.
pub fn general_response(request_payload: &[u8]) -> Vec<u8> {
    echo_time(request_payload).to_vec()
}

/// Login/logout reply payload: time echo (6) + sequence (2, zeroed) +
/// result (1). Result is 0x01 on success, 0x02 on failure.
pub fn login_result_response(request_payload: &[u8], success: bool) -> Vec<u8> {
    let mut out = vec![0u8; 9];
    out[..6].copy_from_slice(&echo_time(request_payload));
    out[8] = if success { 0x01 } else { 0x02 };
    out
}

fn echo_time(request_payload: &[u8]) -> [u8; 6] {
    match CollectTime::from_slice(request_payload) {
        Some(t) => *t.as_bytes(),
        None => *CollectTime::now().as_bytes(),
    }
}

fn trim_padding(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()
}
