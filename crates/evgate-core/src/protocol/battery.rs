//! Rechargeable-storage, battery-pack, fuel-cell-stack and super-capacitor
//! blocks.
//!
//! These bodies are count-prefixed lists of per-subsystem (2016) or per-pack
//! (2025) structures whose own lengths depend on embedded cell/probe counts.
//! Terminals routinely split long cell arrays across report frames, so the
//! innermost arrays decode whatever prefix is present instead of failing the
//! packet; the declared count is kept alongside the actually-decoded list.
//!
//! Scaling differences between revisions are easy to get wrong: 2016 cell
//! voltages are 1 mV/bit with a 1000 A current bias, 2025 cell voltages are
//! 10 mV/bit with a 3000 A current bias.

use super::realtime::temp;
use crate::error::{Error, Result};
use serde::Serialize;

/// One rechargeable-storage subsystem voltage frame (2016).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageSubsystem {
    /// Subsystem number.
    pub subsys: u8,
    /// Subsystem voltage in V.
    pub voltage: f32,
    /// Subsystem current in A (wire value biased by 1000 A).
    pub current: f32,
    /// Total single cells in the subsystem.
    pub cell_count: u16,
    /// Index of the first cell carried in this frame.
    pub frame_start: u16,
    /// Declared number of cells carried in this frame.
    pub frame_cell_count: u8,
    /// Cell voltages in V, 1 mV resolution.
    pub cell_voltages: Vec<f32>,
}

/// Rechargeable-storage voltage data (2016 info 0x08).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageVoltageData {
    /// Declared subsystem count.
    pub subsystem_count: u8,
    /// Decoded subsystems.
    pub subsystems: Vec<StorageSubsystem>,
}

impl StorageVoltageData {
    pub(crate) fn decode(body: &[u8]) -> Result<(Self, usize)> {
        let (&count, _) = body
            .split_first()
            .ok_or_else(|| Error::SubRecord("storage voltage data empty".into()))?;
        let mut subsystems = Vec::with_capacity(usize::from(count).min(16));
        let mut offset = 1;
        let mut truncated = false;

        for _ in 0..count {
            if body.len() < offset + 10 {
                truncated = body.len() > offset;
                break;
            }
            let h = &body[offset..offset + 10];
            let frame_cell_count = h[9];
            offset += 10;

            let (cells, used, cut) =
                read_u16_scaled(&body[offset..], usize::from(frame_cell_count), 0.001);
            offset += used;
            truncated |= cut;

            subsystems.push(StorageSubsystem {
                subsys: h[0],
                voltage: f32::from(u16::from_be_bytes([h[1], h[2]])) * 0.1,
                current: f32::from(u16::from_be_bytes([h[3], h[4]])) * 0.1 - 1000.0,
                cell_count: u16::from_be_bytes([h[5], h[6]]),
                frame_start: u16::from_be_bytes([h[7], h[8]]),
                frame_cell_count,
                cell_voltages: cells,
            });
            if cut {
                break;
            }
        }

        Ok((Self { subsystem_count: count, subsystems }, if truncated { body.len() } else { offset }))
    }
}

/// One rechargeable-storage subsystem temperature frame (2016).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageTempSubsystem {
    /// Subsystem number.
    pub subsys: u8,
    /// Declared probe count.
    pub probe_count: u16,
    /// Probe temperatures in °C.
    pub probe_temps: Vec<i16>,
}

/// Rechargeable-storage temperature data (2016 info 0x09).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageTempData {
    /// Declared subsystem count.
    pub subsystem_count: u8,
    /// Decoded subsystems.
    pub subsystems: Vec<StorageTempSubsystem>,
}

impl StorageTempData {
    pub(crate) fn decode(body: &[u8]) -> Result<(Self, usize)> {
        let (&count, _) = body
            .split_first()
            .ok_or_else(|| Error::SubRecord("storage temp data empty".into()))?;
        let mut subsystems = Vec::with_capacity(usize::from(count).min(16));
        let mut offset = 1;
        let mut truncated = false;

        for _ in 0..count {
            if body.len() < offset + 3 {
                truncated = body.len() > offset;
                break;
            }
            let subsys = body[offset];
            let probe_count = u16::from_be_bytes([body[offset + 1], body[offset + 2]]);
            offset += 3;

            let (temps, used, cut) = read_temps(&body[offset..], usize::from(probe_count));
            offset += used;
            truncated |= cut;

            subsystems.push(StorageTempSubsystem { subsys, probe_count, probe_temps: temps });
            if cut {
                break;
            }
        }

        Ok((Self { subsystem_count: count, subsystems }, if truncated { body.len() } else { offset }))
    }
}

/// One battery pack voltage frame (2025).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryPack {
    /// Pack number, 1-based.
    pub pack: u8,
    /// Pack voltage in V.
    pub voltage: f32,
    /// Pack current in A (wire value biased by 3000 A).
    pub current: f32,
    /// Declared minimal-parallel-unit count.
    pub cell_count: u16,
    /// Unit voltages in V, 10 mV resolution.
    pub cell_voltages: Vec<f32>,
}

/// Battery pack voltage data (2025 info 0x07).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryVoltageData {
    /// Declared pack count.
    pub pack_count: u8,
    /// Decoded packs.
    pub packs: Vec<BatteryPack>,
}

impl BatteryVoltageData {
    pub(crate) fn decode(body: &[u8]) -> Result<(Self, usize)> {
        let (&count, _) = body
            .split_first()
            .ok_or_else(|| Error::SubRecord("battery voltage data empty".into()))?;
        let mut packs = Vec::with_capacity(usize::from(count).min(50));
        let mut offset = 1;
        let mut truncated = false;

        for _ in 0..count {
            if body.len() < offset + 7 {
                truncated = body.len() > offset;
                break;
            }
            let h = &body[offset..offset + 7];
            let cell_count = u16::from_be_bytes([h[5], h[6]]);
            offset += 7;

            let (cells, used, cut) = read_u16_scaled(&body[offset..], usize::from(cell_count), 0.01);
            offset += used;
            truncated |= cut;

            packs.push(BatteryPack {
                pack: h[0],
                voltage: f32::from(u16::from_be_bytes([h[1], h[2]])) * 0.1,
                current: f32::from(u16::from_be_bytes([h[3], h[4]])) * 0.1 - 3000.0,
                cell_count,
                cell_voltages: cells,
            });
            if cut {
                break;
            }
        }

        Ok((Self { pack_count: count, packs }, if truncated { body.len() } else { offset }))
    }
}

/// One battery pack temperature frame (2025).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryPackTemp {
    /// Pack number, 1-based.
    pub pack: u8,
    /// Declared probe count.
    pub probe_count: u16,
    /// Probe temperatures in °C.
    pub probe_temps: Vec<i16>,
}

/// Battery pack temperature data (2025 info 0x08).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryTempData {
    /// Declared pack count.
    pub pack_count: u8,
    /// Decoded packs.
    pub packs: Vec<BatteryPackTemp>,
}

impl BatteryTempData {
    pub(crate) fn decode(body: &[u8]) -> Result<(Self, usize)> {
        let (&count, _) = body
            .split_first()
            .ok_or_else(|| Error::SubRecord("battery temp data empty".into()))?;
        let mut packs = Vec::with_capacity(usize::from(count).min(50));
        let mut offset = 1;
        let mut truncated = false;

        for _ in 0..count {
            if body.len() < offset + 3 {
                truncated = body.len() > offset;
                break;
            }
            let pack = body[offset];
            let probe_count = u16::from_be_bytes([body[offset + 1], body[offset + 2]]);
            offset += 3;

            let (temps, used, cut) = read_temps(&body[offset..], usize::from(probe_count));
            offset += used;
            truncated |= cut;

            packs.push(BatteryPackTemp { pack, probe_count, probe_temps: temps });
            if cut {
                break;
            }
        }

        Ok((Self { pack_count: count, packs }, if truncated { body.len() } else { offset }))
    }
}

/// One fuel cell stack (info 0x30).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuelCellStack {
    /// Stack number.
    pub stack: u8,
    /// Stack voltage in V.
    pub voltage: f32,
    /// Stack current in A.
    pub current: f32,
    /// Air inlet pressure in kPa (wire value biased by 100 kPa).
    pub air_in_pressure: f32,
    /// Air inlet temperature in °C.
    pub air_in_temp: i16,
    /// Declared coolant probe count.
    pub probe_count: u16,
    /// Probe temperatures in °C.
    pub probe_temps: Vec<i16>,
}

/// Fuel cell stack data (info 0x30).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuelCellStackData {
    /// Declared stack count.
    pub stack_count: u8,
    /// Decoded stacks.
    pub stacks: Vec<FuelCellStack>,
}

impl FuelCellStackData {
    pub(crate) fn decode(body: &[u8]) -> Result<(Self, usize)> {
        let (&count, _) = body
            .split_first()
            .ok_or_else(|| Error::SubRecord("fuel cell stack data empty".into()))?;
        let mut stacks = Vec::with_capacity(usize::from(count).min(8));
        let mut offset = 1;
        let mut truncated = false;

        for _ in 0..count {
            if body.len() < offset + 10 {
                truncated = body.len() > offset;
                break;
            }
            let h = &body[offset..offset + 10];
            let probe_count = u16::from_be_bytes([h[8], h[9]]);
            offset += 10;

            let (temps, used, cut) = read_temps(&body[offset..], usize::from(probe_count));
            offset += used;
            truncated |= cut;

            stacks.push(FuelCellStack {
                stack: h[0],
                voltage: f32::from(u16::from_be_bytes([h[1], h[2]])) * 0.1,
                current: f32::from(u16::from_be_bytes([h[3], h[4]])) * 0.1,
                air_in_pressure: f32::from(u16::from_be_bytes([h[5], h[6]])) * 0.1 - 100.0,
                air_in_temp: temp(h[7]),
                probe_count,
                probe_temps: temps,
            });
            if cut {
                break;
            }
        }

        Ok((Self { stack_count: count, stacks }, if truncated { body.len() } else { offset }))
    }
}

/// Super-capacitor data (info 0x31).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuperCapData {
    /// System number.
    pub subsys: u8,
    /// Total voltage in V.
    pub total_voltage: f32,
    /// Total current in A (wire value biased by 3000 A).
    pub total_current: f32,
    /// Declared single-cell count.
    pub cell_count: u16,
    /// Cell voltages in V, 10 mV resolution.
    pub cell_voltages: Vec<f32>,
    /// Declared temperature probe count.
    pub probe_count: u16,
    /// Probe temperatures in °C.
    pub probe_temps: Vec<i16>,
}

impl SuperCapData {
    pub(crate) fn decode(body: &[u8]) -> Result<(Self, usize)> {
        if body.len() < 7 {
            return Err(Error::SubRecord("super-cap data short".into()));
        }
        let cell_count = u16::from_be_bytes([body[5], body[6]]);
        let mut offset = 7;

        let (cells, used, cells_cut) = read_u16_scaled(&body[offset..], usize::from(cell_count), 0.01);
        offset += used;

        // The probe count is mandatory; a cell array that ate the rest of the
        // body means the required field is missing.
        if cells_cut || body.len() < offset + 2 {
            return Err(Error::SubRecord("super-cap data missing probe count".into()));
        }
        let probe_count = u16::from_be_bytes([body[offset], body[offset + 1]]);
        offset += 2;

        let (temps, used, temps_cut) = read_temps(&body[offset..], usize::from(probe_count));
        offset += used;

        Ok((
            Self {
                subsys: body[0],
                total_voltage: f32::from(u16::from_be_bytes([body[1], body[2]])) * 0.1,
                total_current: f32::from(u16::from_be_bytes([body[3], body[4]])) * 0.1 - 3000.0,
                cell_count,
                cell_voltages: cells,
                probe_count,
                probe_temps: temps,
            },
            if temps_cut { body.len() } else { offset },
        ))
    }
}

/// Super-capacitor extremes (info 0x32, 18 bytes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuperCapExtremeData {
    /// System holding the highest cell voltage.
    pub max_voltage_subsys: u8,
    /// Cell code of the highest voltage.
    pub max_voltage_cell: u16,
    /// Highest cell voltage in V, 1 mV resolution.
    pub max_voltage: f32,
    /// System holding the lowest cell voltage.
    pub min_voltage_subsys: u8,
    /// Cell code of the lowest voltage.
    pub min_voltage_cell: u16,
    /// Lowest cell voltage in V, 1 mV resolution.
    pub min_voltage: f32,
    /// System holding the highest temperature.
    pub max_temp_subsys: u8,
    /// Probe code of the highest temperature.
    pub max_temp_probe: u16,
    /// Highest probe temperature in °C.
    pub max_temp: i16,
    /// System holding the lowest temperature.
    pub min_temp_subsys: u8,
    /// Probe code of the lowest temperature.
    pub min_temp_probe: u16,
    /// Lowest probe temperature in °C.
    pub min_temp: i16,
}

impl SuperCapExtremeData {
    const SIZE: usize = 18;

    pub(crate) fn decode(body: &[u8]) -> Result<(Self, usize)> {
        let d = body
            .get(..Self::SIZE)
            .ok_or_else(|| Error::SubRecord("super-cap extreme data short".into()))?;
        Ok((
            Self {
                max_voltage_subsys: d[0],
                max_voltage_cell: u16::from_be_bytes([d[1], d[2]]),
                max_voltage: f32::from(u16::from_be_bytes([d[3], d[4]])) * 0.001,
                min_voltage_subsys: d[5],
                min_voltage_cell: u16::from_be_bytes([d[6], d[7]]),
                min_voltage: f32::from(u16::from_be_bytes([d[8], d[9]])) * 0.001,
                max_temp_subsys: d[10],
                max_temp_probe: u16::from_be_bytes([d[11], d[12]]),
                max_temp: temp(d[13]),
                min_temp_subsys: d[14],
                min_temp_probe: u16::from_be_bytes([d[15], d[16]]),
                min_temp: temp(d[17]),
            },
            Self::SIZE,
        ))
    }
}

/// Read up to `wanted` big-endian u16 values scaled by `scale`.
///
/// Returns (values, bytes consumed, truncated). On truncation the consumed
/// length covers the whole remainder, dangling odd byte included.
fn read_u16_scaled(data: &[u8], wanted: usize, scale: f32) -> (Vec<f32>, usize, bool) {
    let avail = data.len() / 2;
    let n = wanted.min(avail);
    let values = data[..n * 2]
        .chunks_exact(2)
        .map(|c| f32::from(u16::from_be_bytes([c[0], c[1]])) * scale)
        .collect();
    if n < wanted {
        (values, data.len(), true)
    } else {
        (values, n * 2, false)
    }
}

/// Read up to `wanted` biased temperature bytes.
fn read_temps(data: &[u8], wanted: usize) -> (Vec<i16>, usize, bool) {
    let n = wanted.min(data.len());
    let temps = data[..n].iter().map(|&b| temp(b)).collect();
    (temps, n, n < wanted)
}
