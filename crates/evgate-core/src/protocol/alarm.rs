//! Alarm block decoding (2016 info 0x07, 2025 info 0x06).
//!
//! Body: max level (1) + general alarm bitmask (4) + four fault groups, each
//! a count byte followed by 4-byte fault codes (battery, motor, engine,
//! other). The 2025 revision appends a fifth group of 2-byte general fault
//! levels (N5); the group is optional on the wire and absent bytes mean zero
//! faults.

use crate::error::{Error, Result};
use serde::Serialize;

/// Alarm data with per-category fault code lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmData {
    /// Highest active alarm level.
    pub max_level: u8,
    /// General alarm bitmask.
    pub alarm_mask: u32,
    /// Declared rechargeable-storage fault count (N1).
    pub battery_fault_count: u8,
    /// Rechargeable-storage fault codes.
    pub battery_faults: Vec<u32>,
    /// Declared drive motor fault count (N2).
    pub motor_fault_count: u8,
    /// Drive motor fault codes.
    pub motor_faults: Vec<u32>,
    /// Declared engine fault count (N3).
    pub engine_fault_count: u8,
    /// Engine fault codes.
    pub engine_faults: Vec<u32>,
    /// Declared other fault count (N4).
    pub other_fault_count: u8,
    /// Other fault codes.
    pub other_faults: Vec<u32>,
    /// Declared general fault count (N5, 2025 only; zero under 2016).
    pub general_fault_count: u8,
    /// General fault levels (2025 only).
    pub general_faults: Vec<u16>,
}

impl AlarmData {
    /// Decode an alarm body; `with_general` selects the 2025 layout carrying
    /// the N5 group. Returns the record and the bytes consumed.
    pub fn decode(body: &[u8], with_general: bool) -> Result<(Self, usize)> {
        if body.len() < 5 {
            return Err(Error::SubRecord("alarm data short".into()));
        }

        let mut alarm = AlarmData {
            max_level: body[0],
            alarm_mask: u32::from_be_bytes([body[1], body[2], body[3], body[4]]),
            battery_fault_count: 0,
            battery_faults: Vec::new(),
            motor_fault_count: 0,
            motor_faults: Vec::new(),
            engine_fault_count: 0,
            engine_faults: Vec::new(),
            other_fault_count: 0,
            other_faults: Vec::new(),
            general_fault_count: 0,
            general_faults: Vec::new(),
        };
        let mut offset = 5;

        for group in 0..4 {
            let &count = body
                .get(offset)
                .ok_or_else(|| Error::SubRecord(format!("alarm group {} missing", group + 1)))?;
            offset += 1;

            // Only the final group of the 2016 layout sits at the tail of the
            // body, so only there can a short list be a frame split rather
            // than corruption.
            let tail = group == 3 && !with_general;
            let (codes, used) = read_codes_u32(&body[offset..], count, tail)?;
            offset += used;

            let (count_slot, codes_slot) = match group {
                0 => (&mut alarm.battery_fault_count, &mut alarm.battery_faults),
                1 => (&mut alarm.motor_fault_count, &mut alarm.motor_faults),
                2 => (&mut alarm.engine_fault_count, &mut alarm.engine_faults),
                _ => (&mut alarm.other_fault_count, &mut alarm.other_faults),
            };
            *count_slot = count;
            *codes_slot = codes;
        }

        if with_general && offset < body.len() {
            alarm.general_fault_count = body[offset];
            offset += 1;
            let wanted = usize::from(alarm.general_fault_count);
            let avail = (body.len() - offset) / 2;
            let n = wanted.min(avail);
            alarm.general_faults = body[offset..offset + n * 2]
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            // A truncated list means the packet ended mid-group; any dangling
            // half-entry belongs to it too.
            offset = if n < wanted { body.len() } else { offset + n * 2 };
        }

        Ok((alarm, offset))
    }
}

fn read_codes_u32(data: &[u8], count: u8, tolerant: bool) -> Result<(Vec<u32>, usize)> {
    let wanted = usize::from(count);
    let avail = data.len() / 4;
    if avail < wanted && !tolerant {
        return Err(Error::SubRecord(format!(
            "fault code list short: want {wanted}, have {avail}"
        )));
    }
    let n = wanted.min(avail);
    let codes = data[..n * 4]
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    // Truncation ⇒ the body ends inside this list; consume the dangling tail.
    let used = if n < wanted { data.len() } else { n * 4 };
    Ok((codes, used))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_2016() -> Vec<u8> {
        let mut b = vec![3]; // max level
        b.extend_from_slice(&0x0000_0401u32.to_be_bytes());
        b.push(2); // N1
        b.extend_from_slice(&0x1111_1111u32.to_be_bytes());
        b.extend_from_slice(&0x2222_2222u32.to_be_bytes());
        b.push(0); // N2
        b.push(1); // N3
        b.extend_from_slice(&0x3333_3333u32.to_be_bytes());
        b.push(0); // N4
        b
    }

    #[test]
    fn test_decode_2016() {
        let body = body_2016();
        let (a, used) = AlarmData::decode(&body, false).expect("decode");
        assert_eq!(used, body.len());
        assert_eq!(a.max_level, 3);
        assert_eq!(a.alarm_mask, 0x0401);
        assert_eq!(a.battery_faults, vec![0x1111_1111, 0x2222_2222]);
        assert_eq!(a.engine_faults, vec![0x3333_3333]);
        assert!(a.general_faults.is_empty());
    }

    #[test]
    fn test_decode_2025_with_general_group() {
        let mut body = body_2016();
        body.push(2); // N5
        body.extend_from_slice(&0x0102u16.to_be_bytes());
        body.extend_from_slice(&0x0304u16.to_be_bytes());
        let (a, used) = AlarmData::decode(&body, true).expect("decode");
        assert_eq!(used, body.len());
        assert_eq!(a.general_fault_count, 2);
        assert_eq!(a.general_faults, vec![0x0102, 0x0304]);
    }

    #[test]
    fn test_2025_general_group_absent() {
        let body = body_2016();
        let (a, used) = AlarmData::decode(&body, true).expect("decode");
        assert_eq!(used, body.len());
        assert_eq!(a.general_fault_count, 0);
    }

    #[test]
    fn test_missing_group_marker_is_error() {
        // Level + mask + N1 marker only; N1 claims a code that is absent.
        let mut body = vec![1];
        body.extend_from_slice(&0u32.to_be_bytes());
        body.push(1);
        assert!(AlarmData::decode(&body, false).is_err());
    }

    #[test]
    fn test_truncated_trailing_group_tolerated_2016() {
        let mut body = vec![1];
        body.extend_from_slice(&0u32.to_be_bytes());
        body.push(0); // N1
        body.push(0); // N2
        body.push(0); // N3
        body.push(3); // N4 declares 3 codes
        body.extend_from_slice(&0xAAAA_BBBBu32.to_be_bytes()); // only one fits
        let (a, used) = AlarmData::decode(&body, false).expect("decode");
        assert_eq!(a.other_fault_count, 3);
        assert_eq!(a.other_faults, vec![0xAAAA_BBBB]);
        assert_eq!(used, body.len());
    }

    #[test]
    fn test_truncated_middle_group_is_error() {
        let mut body = vec![1];
        body.extend_from_slice(&0u32.to_be_bytes());
        body.push(2); // N1 declares 2 codes
        body.extend_from_slice(&1u32.to_be_bytes()); // only one present
        assert!(AlarmData::decode(&body, false).is_err());
    }

    #[test]
    fn test_truncated_general_list_tolerated() {
        let mut body = body_2016();
        body.push(5); // N5 declares 5
        body.extend_from_slice(&7u16.to_be_bytes()); // one fits
        body.push(0x01); // half an entry
        let (a, used) = AlarmData::decode(&body, true).expect("decode");
        assert_eq!(a.general_fault_count, 5);
        assert_eq!(a.general_faults, vec![7]);
        // The dangling half-entry is swallowed with the truncated list.
        assert_eq!(used, body.len());
    }
}
