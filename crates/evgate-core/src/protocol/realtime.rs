//! Realtime payload decomposition.
//!
//! A realtime (0x02) data unit is a 6-byte collect time followed by info
//! blocks: a 1-byte info-type, then a type-specific body with no length
//! prefix. The decoder must know each body's exact size formula to find the
//! next block.
//!
//! Info-types 0x06–0x09 mean different things in the 2016 and 2025 revisions
//! (see the dispatch in [`decode_block`]); the envelope's start marker decides
//! which schema applies. Treating 2025 as a superset of 2016 silently decodes
//! garbage, so the version is threaded through every block.
//!
//! Count-driven arrays at the tail of a body are truncation-tolerant: when
//! the packet ends before the declared count, the available prefix is decoded
//! (rounded down to the element size) instead of failing the whole packet.
//! Missing fixed headers are hard errors.

use super::alarm::AlarmData;
use super::battery::{
    BatteryTempData, BatteryVoltageData, FuelCellStackData, StorageTempData, StorageVoltageData,
    SuperCapData, SuperCapExtremeData,
};
use super::{CollectTime, ProtocolVersion};
use crate::error::{Error, Result};
use serde::Serialize;

/// A decoded realtime sub-record: one value of a closed sum, tagged the way
/// the downstream sink expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RealtimeRecord {
    /// 0x01: whole-vehicle data.
    Vehicle(VehicleData),
    /// 0x02: drive motor data.
    Motor(MotorData),
    /// 0x03: fuel cell and on-board hydrogen system.
    FuelCell(FuelCellData),
    /// 0x04: engine data.
    Engine(EngineData),
    /// 0x05: position data.
    Location(LocationData),
    /// 0x06 (2016): cell/temperature extremes.
    Extreme(ExtremeData),
    /// 0x07 (2016) / 0x06 (2025): alarms and fault codes.
    Alarm(AlarmData),
    /// 0x07 (2025): battery pack voltages.
    BatteryVoltage(BatteryVoltageData),
    /// 0x08 (2025): battery pack temperatures.
    BatteryTemp(BatteryTempData),
    /// 0x08 (2016): rechargeable-storage subsystem voltages.
    StorageVoltage(StorageVoltageData),
    /// 0x09 (2016): rechargeable-storage subsystem temperatures.
    StorageTemp(StorageTempData),
    /// 0x30: fuel cell stack data.
    FuelCellStack(FuelCellStackData),
    /// 0x31: super-capacitor data.
    SuperCap(SuperCapData),
    /// 0x32: super-capacitor extremes.
    SuperCapExtreme(SuperCapExtremeData),
}

impl RealtimeRecord {
    /// Sink tag for this record kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RealtimeRecord::Vehicle(_) => "VEHICLE",
            RealtimeRecord::Motor(_) => "MOTOR",
            RealtimeRecord::FuelCell(_) => "FUEL_CELL",
            RealtimeRecord::Engine(_) => "ENGINE",
            RealtimeRecord::Location(_) => "LOCATION",
            RealtimeRecord::Extreme(_) => "EXTREME",
            RealtimeRecord::Alarm(_) => "ALARM",
            RealtimeRecord::BatteryVoltage(_) => "BATTERY_VOLTAGE",
            RealtimeRecord::BatteryTemp(_) => "BATTERY_TEMP",
            RealtimeRecord::StorageVoltage(_) => "STORAGE_VOLTAGE",
            RealtimeRecord::StorageTemp(_) => "STORAGE_TEMP",
            RealtimeRecord::FuelCellStack(_) => "FUEL_CELL_STACK",
            RealtimeRecord::SuperCap(_) => "SUPER_CAP",
            RealtimeRecord::SuperCapExtreme(_) => "SUPER_CAP_EXTREME",
        }
    }

    /// The record's fields as a JSON object, without the enum tag.
    pub fn data_value(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        match self {
            RealtimeRecord::Vehicle(d) => serde_json::to_value(d),
            RealtimeRecord::Motor(d) => serde_json::to_value(d),
            RealtimeRecord::FuelCell(d) => serde_json::to_value(d),
            RealtimeRecord::Engine(d) => serde_json::to_value(d),
            RealtimeRecord::Location(d) => serde_json::to_value(d),
            RealtimeRecord::Extreme(d) => serde_json::to_value(d),
            RealtimeRecord::Alarm(d) => serde_json::to_value(d),
            RealtimeRecord::BatteryVoltage(d) => serde_json::to_value(d),
            RealtimeRecord::BatteryTemp(d) => serde_json::to_value(d),
            RealtimeRecord::StorageVoltage(d) => serde_json::to_value(d),
            RealtimeRecord::StorageTemp(d) => serde_json::to_value(d),
            RealtimeRecord::FuelCellStack(d) => serde_json::to_value(d),
            RealtimeRecord::SuperCap(d) => serde_json::to_value(d),
            RealtimeRecord::SuperCapExtreme(d) => serde_json::to_value(d),
        }
    }
}

/// A realtime data unit split into its collect time and block region.
#[derive(Debug, Clone, Copy)]
pub struct RealtimeFrame<'a> {
    /// Data collection time from the first six payload bytes.
    pub collect_time: CollectTime,
    version: ProtocolVersion,
    body: &'a [u8],
}

impl<'a> RealtimeFrame<'a> {
    /// Split a realtime payload. Fails if the collect time is missing.
    pub fn parse(version: ProtocolVersion, payload: &'a [u8]) -> Result<Self> {
        let collect_time = CollectTime::from_slice(payload)
            .ok_or_else(|| Error::Payload("realtime payload missing collect time".into()))?;
        Ok(Self { collect_time, version, body: &payload[6..] })
    }

    /// Iterate the info blocks in payload order.
    pub fn blocks(&self) -> RealtimeBlocks<'a> {
        RealtimeBlocks { version: self.version, rest: self.body, unknown: None }
    }
}

/// Iterator over the info blocks of one realtime payload.
///
/// Yields records in payload order. A decode failure is yielded as `Err` and
/// ends iteration; an unrecognised info-type ends iteration silently (the
/// remaining bytes belong to a schema this gateway does not know) and is
/// reported through [`RealtimeBlocks::unknown_type`].
pub struct RealtimeBlocks<'a> {
    version: ProtocolVersion,
    rest: &'a [u8],
    unknown: Option<u8>,
}

impl RealtimeBlocks<'_> {
    /// The info-type that stopped parsing, if iteration hit one.
    pub fn unknown_type(&self) -> Option<u8> {
        self.unknown
    }
}

impl Iterator for RealtimeBlocks<'_> {
    type Item = Result<RealtimeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (&info, body) = self.rest.split_first()?;
            match decode_block(self.version, info, body) {
                Ok(BlockOutcome::Record(record, used)) => {
                    self.rest = &body[used..];
                    return Some(Ok(record));
                }
                Ok(BlockOutcome::Skipped(used)) => {
                    self.rest = &body[used..];
                }
                Ok(BlockOutcome::Unknown) => {
                    self.unknown = Some(info);
                    self.rest = &[];
                    return None;
                }
                Err(e) => {
                    self.rest = &[];
                    return Some(Err(e));
                }
            }
        }
    }
}

enum BlockOutcome {
    /// A decoded record and the body bytes it consumed.
    Record(RealtimeRecord, usize),
    /// Bytes consumed without producing a record (2025 custom region).
    Skipped(usize),
    /// Info-type not in the dispatch table.
    Unknown,
}

/// Decode one info block body. The (info-type, version) pair selects the
/// schema; 0x06–0x09 overlap between revisions with different meanings.
fn decode_block(version: ProtocolVersion, info: u8, body: &[u8]) -> Result<BlockOutcome> {
    use ProtocolVersion::{V2016, V2025};

    let (record, used) = match (info, version) {
        (0x01, _) => VehicleData::decode(body).map(|(d, n)| (RealtimeRecord::Vehicle(d), n))?,
        (0x02, _) => MotorData::decode(body).map(|(d, n)| (RealtimeRecord::Motor(d), n))?,
        (0x03, _) => FuelCellData::decode(body).map(|(d, n)| (RealtimeRecord::FuelCell(d), n))?,
        (0x04, _) => EngineData::decode(body).map(|(d, n)| (RealtimeRecord::Engine(d), n))?,
        (0x05, _) => LocationData::decode(body).map(|(d, n)| (RealtimeRecord::Location(d), n))?,
        (0x06, V2016) => ExtremeData::decode(body).map(|(d, n)| (RealtimeRecord::Extreme(d), n))?,
        (0x06, V2025) => {
            AlarmData::decode(body, true).map(|(d, n)| (RealtimeRecord::Alarm(d), n))?
        }
        (0x07, V2016) => {
            AlarmData::decode(body, false).map(|(d, n)| (RealtimeRecord::Alarm(d), n))?
        }
        (0x07, V2025) => {
            BatteryVoltageData::decode(body).map(|(d, n)| (RealtimeRecord::BatteryVoltage(d), n))?
        }
        (0x08, V2016) => {
            StorageVoltageData::decode(body).map(|(d, n)| (RealtimeRecord::StorageVoltage(d), n))?
        }
        (0x08, V2025) => {
            BatteryTempData::decode(body).map(|(d, n)| (RealtimeRecord::BatteryTemp(d), n))?
        }
        (0x09, V2016) => {
            StorageTempData::decode(body).map(|(d, n)| (RealtimeRecord::StorageTemp(d), n))?
        }
        // 2025 reserves 0x09 for manufacturer-custom data; consume the rest.
        (0x09, V2025) => return Ok(BlockOutcome::Skipped(body.len())),
        (0x30, _) => {
            FuelCellStackData::decode(body).map(|(d, n)| (RealtimeRecord::FuelCellStack(d), n))?
        }
        (0x31, _) => SuperCapData::decode(body).map(|(d, n)| (RealtimeRecord::SuperCap(d), n))?,
        (0x32, _) => {
            SuperCapExtremeData::decode(body).map(|(d, n)| (RealtimeRecord::SuperCapExtreme(d), n))?
        }
        _ => return Ok(BlockOutcome::Unknown),
    };
    Ok(BlockOutcome::Record(record, used))
}

fn be_u16(data: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([data[off], data[off + 1]])
}

fn be_u32(data: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

/// Biased temperature byte: stored value minus 40 °C.
pub(crate) fn temp(raw: u8) -> i16 {
    i16::from(raw) - 40
}

/// Whole-vehicle data (info 0x01, 20 bytes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleData {
    /// Vehicle state: 0x01 started, 0x02 off, 0x03 other.
    pub status: u8,
    /// Charge state: 0x01 parked charging, 0x02 driving charging,
    /// 0x03 not charging, 0x04 charge complete.
    pub charge_status: u8,
    /// Run mode: 0x01 electric, 0x02 hybrid, 0x03 fuel.
    pub run_mode: u8,
    /// Speed in km/h.
    pub speed: f32,
    /// Accumulated mileage in km.
    pub total_mileage: f64,
    /// Total voltage in V.
    pub voltage: f32,
    /// Total current in A (wire value biased by 1000 A).
    pub current: f32,
    /// State of charge, percent.
    pub soc: u8,
    /// DC-DC converter state: 0x01 working, 0x02 off.
    pub dc_status: u8,
    /// Gear bitmask.
    pub gear: u8,
    /// Insulation resistance in kΩ.
    pub insulation_res: u16,
    /// Accelerator pedal travel, percent.
    pub accel_pedal: u8,
    /// Brake pedal travel, percent.
    pub brake_pedal: u8,
}

impl VehicleData {
    const SIZE: usize = 20;

    fn decode(body: &[u8]) -> Result<(Self, usize)> {
        let data = body
            .get(..Self::SIZE)
            .ok_or_else(|| Error::SubRecord("vehicle data short".into()))?;
        Ok((
            Self {
                status: data[0],
                charge_status: data[1],
                run_mode: data[2],
                speed: f32::from(be_u16(data, 3)) * 0.1,
                total_mileage: f64::from(be_u32(data, 5)) * 0.1,
                voltage: f32::from(be_u16(data, 9)) * 0.1,
                current: f32::from(be_u16(data, 11)) * 0.1 - 1000.0,
                soc: data[13],
                dc_status: data[14],
                gear: data[15],
                insulation_res: be_u16(data, 16),
                accel_pedal: data[18],
                brake_pedal: data[19],
            },
            Self::SIZE,
        ))
    }
}

/// One drive motor (12 bytes within an info 0x02 block).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotorUnit {
    /// Motor index, 1-based.
    pub seq: u8,
    /// Motor state: 0x01 consuming, 0x02 generating, 0x03 off, 0x04 ready.
    pub status: u8,
    /// Controller temperature in °C.
    pub controller_temp: i16,
    /// Rotation speed in r/min (wire value biased by 20000).
    pub speed: i16,
    /// Torque in N·m (wire value biased by 2000).
    pub torque: f32,
    /// Motor temperature in °C.
    pub temp: i16,
    /// Controller input voltage in V.
    pub voltage: f32,
    /// Controller DC bus current in A (wire value biased by 1000 A).
    pub current: f32,
}

/// Drive motor data (info 0x02, 1 + 12·N bytes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotorData {
    /// Declared motor count.
    pub count: u8,
    /// Decoded motors, in wire order.
    pub motors: Vec<MotorUnit>,
}

impl MotorData {
    const UNIT_SIZE: usize = 12;

    fn decode(body: &[u8]) -> Result<(Self, usize)> {
        let (&count, rest) =
            body.split_first().ok_or_else(|| Error::SubRecord("motor data empty".into()))?;
        let wanted = usize::from(count);
        let avail = rest.len() / Self::UNIT_SIZE;
        let n = wanted.min(avail);

        let mut motors = Vec::with_capacity(n);
        for chunk in rest.chunks_exact(Self::UNIT_SIZE).take(n) {
            motors.push(MotorUnit {
                seq: chunk[0],
                status: chunk[1],
                controller_temp: temp(chunk[2]),
                speed: (i32::from(be_u16(chunk, 3)) - 20000) as i16,
                torque: f32::from(be_u16(chunk, 5)) * 0.1 - 2000.0,
                temp: temp(chunk[7]),
                voltage: f32::from(be_u16(chunk, 8)) * 0.1,
                current: f32::from(be_u16(chunk, 10)) * 0.1 - 1000.0,
            });
        }
        // Truncation only happens at the end of the payload; the partial
        // trailing unit (if any) is consumed with the block.
        let used = if n < wanted { body.len() } else { 1 + n * Self::UNIT_SIZE };
        Ok((Self { count, motors }, used))
    }
}

/// Fuel cell and hydrogen system data (info 0x03, 8 + M bytes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuelCellData {
    /// Fuel cell voltage in V.
    pub voltage: f32,
    /// Fuel cell current in A.
    pub current: f32,
    /// Fuel consumption rate in kg/100km.
    pub consume_rate: f32,
    /// Declared temperature probe count.
    pub probe_count: u16,
    /// Probe temperatures in °C.
    pub probe_temps: Vec<i16>,
}

impl FuelCellData {
    fn decode(body: &[u8]) -> Result<(Self, usize)> {
        if body.len() < 8 {
            return Err(Error::SubRecord("fuel cell data short".into()));
        }
        let probe_count = be_u16(body, 6);
        let n = usize::from(probe_count).min(body.len() - 8);
        let probe_temps = body[8..8 + n].iter().map(|&b| temp(b)).collect();
        Ok((
            Self {
                voltage: f32::from(be_u16(body, 0)) * 0.1,
                current: f32::from(be_u16(body, 2)) * 0.1,
                consume_rate: f32::from(be_u16(body, 4)) * 0.01,
                probe_count,
                probe_temps,
            },
            8 + n,
        ))
    }
}

/// Engine data (info 0x04, 5 bytes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineData {
    /// Engine state: 0x01 started, 0x02 off.
    pub status: u8,
    /// Crankshaft speed in r/min.
    pub speed: u16,
    /// Fuel consumption rate in L/100km.
    pub fuel_rate: f32,
}

impl EngineData {
    const SIZE: usize = 5;

    fn decode(body: &[u8]) -> Result<(Self, usize)> {
        let data = body
            .get(..Self::SIZE)
            .ok_or_else(|| Error::SubRecord("engine data short".into()))?;
        Ok((
            Self {
                status: data[0],
                speed: be_u16(data, 1),
                fuel_rate: f32::from(be_u16(data, 3)) * 0.01,
            },
            Self::SIZE,
        ))
    }
}

/// Position data (info 0x05, 9 bytes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationData {
    /// Fix state bitmask: bit 0 invalid, bit 1 south, bit 2 west.
    pub state: u8,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
}

impl LocationData {
    const SIZE: usize = 9;

    fn decode(body: &[u8]) -> Result<(Self, usize)> {
        let data = body
            .get(..Self::SIZE)
            .ok_or_else(|| Error::SubRecord("location data short".into()))?;
        Ok((
            Self {
                state: data[0],
                longitude: f64::from(be_u32(data, 1)) * 1e-6,
                latitude: f64::from(be_u32(data, 5)) * 1e-6,
            },
            Self::SIZE,
        ))
    }
}

/// Cell voltage / probe temperature extremes (2016 info 0x06, 14 bytes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtremeData {
    /// Subsystem holding the highest cell voltage.
    pub max_voltage_subsys: u8,
    /// Cell index of the highest voltage.
    pub max_voltage_cell: u8,
    /// Highest single-cell voltage in V.
    pub max_voltage: f32,
    /// Subsystem holding the lowest cell voltage.
    pub min_voltage_subsys: u8,
    /// Cell index of the lowest voltage.
    pub min_voltage_cell: u8,
    /// Lowest single-cell voltage in V.
    pub min_voltage: f32,
    /// Subsystem holding the highest temperature.
    pub max_temp_subsys: u8,
    /// Probe index of the highest temperature.
    pub max_temp_probe: u8,
    /// Highest probe temperature in °C.
    pub max_temp: i16,
    /// Subsystem holding the lowest temperature.
    pub min_temp_subsys: u8,
    /// Probe index of the lowest temperature.
    pub min_temp_probe: u8,
    /// Lowest probe temperature in °C.
    pub min_temp: i16,
}

impl ExtremeData {
    const SIZE: usize = 14;

    fn decode(body: &[u8]) -> Result<(Self, usize)> {
        let data = body
            .get(..Self::SIZE)
            .ok_or_else(|| Error::SubRecord("extreme data short".into()))?;
        Ok((
            Self {
                max_voltage_subsys: data[0],
                max_voltage_cell: data[1],
                max_voltage: f32::from(be_u16(data, 2)) * 0.001,
                min_voltage_subsys: data[4],
                min_voltage_cell: data[5],
                min_voltage: f32::from(be_u16(data, 6)) * 0.001,
                max_temp_subsys: data[8],
                max_temp_probe: data[9],
                max_temp: temp(data[10]),
                min_temp_subsys: data[11],
                min_temp_probe: data[12],
                min_temp: temp(data[13]),
            },
            Self::SIZE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle_body() -> Vec<u8> {
        let mut b = vec![0x01, 0x03, 0x01];
        b.extend_from_slice(&600u16.to_be_bytes()); // 60.0 km/h
        b.extend_from_slice(&123456u32.to_be_bytes()); // 12345.6 km
        b.extend_from_slice(&3500u16.to_be_bytes()); // 350.0 V
        b.extend_from_slice(&10500u16.to_be_bytes()); // 50.0 A
        b.push(88); // SOC
        b.push(0x01);
        b.push(0x0F);
        b.extend_from_slice(&2000u16.to_be_bytes());
        b.push(10);
        b.push(0);
        b
    }

    #[test]
    fn test_vehicle_decode() {
        let (v, used) = VehicleData::decode(&vehicle_body()).expect("decode");
        assert_eq!(used, 20);
        assert!((v.speed - 60.0).abs() < 1e-4);
        assert!((v.total_mileage - 12345.6).abs() < 1e-6);
        assert!((v.voltage - 350.0).abs() < 1e-3);
        assert!((v.current - 50.0).abs() < 1e-3);
        assert_eq!(v.soc, 88);
        assert_eq!(v.insulation_res, 2000);
    }

    #[test]
    fn test_vehicle_short_is_error() {
        assert!(VehicleData::decode(&[0u8; 19]).is_err());
    }

    fn motor_unit_bytes(seq: u8) -> Vec<u8> {
        let mut b = vec![seq, 0x01, 60]; // controller 20 °C
        b.extend_from_slice(&23000u16.to_be_bytes()); // 3000 r/min
        b.extend_from_slice(&21500u16.to_be_bytes()); // 150.0 N·m
        b.push(75); // motor 35 °C
        b.extend_from_slice(&3400u16.to_be_bytes()); // 340.0 V
        b.extend_from_slice(&10800u16.to_be_bytes()); // 80.0 A
        b
    }

    #[test]
    fn test_motor_decode() {
        let mut body = vec![2u8];
        body.extend(motor_unit_bytes(1));
        body.extend(motor_unit_bytes(2));
        let (m, used) = MotorData::decode(&body).expect("decode");
        assert_eq!(used, 25);
        assert_eq!(m.count, 2);
        assert_eq!(m.motors.len(), 2);
        let u = &m.motors[0];
        assert_eq!(u.controller_temp, 20);
        assert_eq!(u.speed, 3000);
        assert!((u.torque - 150.0).abs() < 1e-3);
        assert_eq!(u.temp, 35);
        assert!((u.voltage - 340.0).abs() < 1e-3);
        assert!((u.current - 80.0).abs() < 1e-3);
    }

    #[test]
    fn test_motor_negative_speed() {
        let mut unit = motor_unit_bytes(1);
        unit[3..5].copy_from_slice(&15000u16.to_be_bytes());
        let mut body = vec![1u8];
        body.extend(unit);
        let (m, _) = MotorData::decode(&body).expect("decode");
        assert_eq!(m.motors[0].speed, -5000);
    }

    #[test]
    fn test_motor_truncated_units() {
        // Declares 3 motors, carries bytes for 1.
        let mut body = vec![3u8];
        body.extend(motor_unit_bytes(1));
        let (m, used) = MotorData::decode(&body).expect("decode");
        assert_eq!(m.count, 3);
        assert_eq!(m.motors.len(), 1);
        assert_eq!(used, body.len());
    }

    #[test]
    fn test_fuel_cell_decode() {
        let mut body = Vec::new();
        body.extend_from_slice(&3000u16.to_be_bytes());
        body.extend_from_slice(&500u16.to_be_bytes());
        body.extend_from_slice(&123u16.to_be_bytes());
        body.extend_from_slice(&3u16.to_be_bytes());
        body.extend_from_slice(&[50, 60, 70]);
        let (f, used) = FuelCellData::decode(&body).expect("decode");
        assert_eq!(used, 11);
        assert_eq!(f.probe_count, 3);
        assert_eq!(f.probe_temps, vec![10, 20, 30]);
        assert!((f.consume_rate - 1.23).abs() < 1e-4);
    }

    #[test]
    fn test_fuel_cell_truncated_probes() {
        let mut body = Vec::new();
        body.extend_from_slice(&3000u16.to_be_bytes());
        body.extend_from_slice(&500u16.to_be_bytes());
        body.extend_from_slice(&123u16.to_be_bytes());
        body.extend_from_slice(&100u16.to_be_bytes()); // declares 100 probes
        body.extend_from_slice(&[50, 60]); // carries 2
        let (f, used) = FuelCellData::decode(&body).expect("decode");
        assert_eq!(f.probe_count, 100);
        assert_eq!(f.probe_temps.len(), 2);
        assert_eq!(used, body.len());
    }

    #[test]
    fn test_engine_decode() {
        let mut body = vec![0x01];
        body.extend_from_slice(&2500u16.to_be_bytes());
        body.extend_from_slice(&850u16.to_be_bytes());
        let (e, used) = EngineData::decode(&body).expect("decode");
        assert_eq!(used, 5);
        assert_eq!(e.speed, 2500);
        assert!((e.fuel_rate - 8.5).abs() < 1e-4);
    }

    #[test]
    fn test_location_decode() {
        let mut body = vec![0x00];
        body.extend_from_slice(&116_397_128u32.to_be_bytes());
        body.extend_from_slice(&39_916_527u32.to_be_bytes());
        let (l, used) = LocationData::decode(&body).expect("decode");
        assert_eq!(used, 9);
        assert!((l.longitude - 116.397128).abs() < 1e-9);
        assert!((l.latitude - 39.916527).abs() < 1e-9);
    }

    #[test]
    fn test_extreme_decode() {
        let mut body = vec![1, 12];
        body.extend_from_slice(&4180u16.to_be_bytes()); // 4.180 V
        body.push(1);
        body.push(33);
        body.extend_from_slice(&3300u16.to_be_bytes()); // 3.300 V
        body.extend_from_slice(&[1, 5, 80, 1, 9, 35]);
        let (x, used) = ExtremeData::decode(&body).expect("decode");
        assert_eq!(used, 14);
        assert!((x.max_voltage - 4.18).abs() < 1e-4);
        assert!((x.min_voltage - 3.30).abs() < 1e-4);
        assert_eq!(x.max_temp, 40);
        assert_eq!(x.min_temp, -5);
    }

    #[test]
    fn test_mixed_blocks_in_order() {
        // time + vehicle + location + motor(1), the canonical mixed-report shape.
        let mut payload = vec![24, 5, 1, 12, 30, 5];
        payload.push(0x01);
        payload.extend(vehicle_body());
        payload.push(0x05);
        payload.extend_from_slice(&{
            let mut b = vec![0x00];
            b.extend_from_slice(&116_000_000u32.to_be_bytes());
            b.extend_from_slice(&39_000_000u32.to_be_bytes());
            b
        });
        payload.push(0x02);
        payload.push(1);
        payload.extend(motor_unit_bytes(1));

        let frame = RealtimeFrame::parse(ProtocolVersion::V2016, &payload).expect("parse");
        let kinds: Vec<&str> = frame.blocks().map(|r| r.expect("record").kind()).collect();
        assert_eq!(kinds, vec!["VEHICLE", "LOCATION", "MOTOR"]);
    }

    #[test]
    fn test_version_overlap_0x06() {
        // 14 bytes that parse as a 2016 extreme block; under 2025 the same
        // opcode selects the alarm schema.
        let mut body = vec![0x02]; // alarm level / max-voltage subsys
        body.extend_from_slice(&[0, 0, 0, 1]); // alarm mask / voltages
        body.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0]); // N1..N4 empty + padding

        let mut payload = vec![24, 5, 1, 12, 30, 5, 0x06];
        payload.extend_from_slice(&body);

        let f2016 = RealtimeFrame::parse(ProtocolVersion::V2016, &payload).expect("parse");
        let recs: Vec<_> = f2016.blocks().collect::<Result<_>>().expect("2016 decode");
        assert!(matches!(recs[0], RealtimeRecord::Extreme(_)));

        let f2025 = RealtimeFrame::parse(ProtocolVersion::V2025, &payload).expect("parse");
        let recs: Vec<_> = f2025.blocks().collect::<Result<_>>().expect("2025 decode");
        assert!(matches!(recs[0], RealtimeRecord::Alarm(_)));
    }

    #[test]
    fn test_unknown_info_type_stops_parsing() {
        let mut payload = vec![24, 5, 1, 12, 30, 5];
        payload.push(0x04);
        payload.extend_from_slice(&[1, 0, 100, 0, 50]);
        payload.push(0x7F); // unknown
        payload.extend_from_slice(&[1, 2, 3, 4]);

        let frame = RealtimeFrame::parse(ProtocolVersion::V2016, &payload).expect("parse");
        let mut blocks = frame.blocks();
        assert!(matches!(blocks.next(), Some(Ok(RealtimeRecord::Engine(_)))));
        assert!(blocks.next().is_none());
        assert_eq!(blocks.unknown_type(), Some(0x7F));
    }

    #[test]
    fn test_decode_error_ends_iteration() {
        let mut payload = vec![24, 5, 1, 12, 30, 5];
        payload.push(0x05);
        payload.extend_from_slice(&[0x00, 1, 2, 3]); // location cut short

        let frame = RealtimeFrame::parse(ProtocolVersion::V2016, &payload).expect("parse");
        let mut blocks = frame.blocks();
        assert!(matches!(blocks.next(), Some(Err(_))));
        assert!(blocks.next().is_none());
    }

    #[test]
    fn test_v2025_custom_region_consumed() {
        let mut payload = vec![24, 5, 1, 12, 30, 5];
        payload.push(0x09);
        payload.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let frame = RealtimeFrame::parse(ProtocolVersion::V2025, &payload).expect("parse");
        let mut blocks = frame.blocks();
        assert!(blocks.next().is_none());
        assert!(blocks.unknown_type().is_none());
    }

    #[test]
    fn test_empty_block_region() {
        let payload = [24, 5, 1, 12, 30, 5];
        let frame = RealtimeFrame::parse(ProtocolVersion::V2016, &payload).expect("parse");
        assert_eq!(frame.blocks().count(), 0);
    }
}
