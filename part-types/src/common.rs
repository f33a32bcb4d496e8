//! Common utility types shared across models

use anyhow::Result;
use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

/// One mebibyte, the unit most alignment and reserve rules are expressed in.
pub const MIB: u64 = 1024 * 1024;

/// Default alignment grain (1 MiB) used when a device does not report a usable optimal I/O size
pub const DEFAULT_GRAIN_BYTES: u64 = MIB;

/// An inclusive range of sectors on a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorRange {
    /// First sector (inclusive)
    pub start: u64,

    /// Last sector (inclusive)
    pub end: u64,
}

impl SectorRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Build a range from a start sector and a non-zero length.
    pub fn with_length(start: u64, length: u64) -> Self {
        Self {
            start,
            end: start + length.saturating_sub(1),
        }
    }

    /// Number of sectors covered by the range
    pub fn length(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn contains(&self, sector: u64) -> bool {
        self.start <= sector && sector <= self.end
    }

    pub fn overlaps(&self, other: &SectorRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Whether `other` lies entirely within this range
    pub fn encloses(&self, other: &SectorRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Physical properties a device reports about itself, all in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    /// Logical sector size
    pub sector_size: u64,

    /// Physical sector size
    pub physical_sector_size: u64,

    /// Minimal I/O size
    pub minimum_io_size: u64,

    /// Optimal I/O size (0 when the device does not report one)
    pub optimal_io_size: u64,

    /// Total number of logical sectors
    pub total_sectors: u64,
}

impl Geometry {
    /// Total size of the device in bytes
    pub fn size(&self) -> u64 {
        self.total_sectors * self.sector_size
    }

    /// Grain the device considers optimal for partition placement.
    ///
    /// Devices that report no optimal I/O size, or one that evenly divides
    /// 1 MiB, are aligned to 1 MiB. Anything else is taken at face value.
    pub fn default_grain(&self) -> u64 {
        if self.optimal_io_size == 0 || DEFAULT_GRAIN_BYTES % self.optimal_io_size == 0 {
            DEFAULT_GRAIN_BYTES.max(self.sector_size)
        } else {
            self.optimal_io_size
        }
    }

    /// Convert a byte count to whole sectors, rounding down
    pub fn bytes_to_sectors(&self, bytes: u64) -> u64 {
        bytes / self.sector_size
    }

    pub fn sectors_to_bytes(&self, sectors: u64) -> u64 {
        sectors * self.sector_size
    }
}

/// Format utilities for converting between bytes and human-readable strings
/// Convert bytes to human-readable format (e.g., "1.50 GiB")
pub fn bytes_to_pretty(bytes: &u64, add_bytes: bool) -> String {
    let mut steps = 0;
    let mut val: f64 = *bytes as f64;

    while val >= 1024. && steps < 6 {
        val /= 1024.;
        steps += 1;
    }

    let unit = match steps {
        0 => "B",
        1 => "KiB",
        2 => "MiB",
        3 => "GiB",
        4 => "TiB",
        5 => "PiB",
        _ => "EiB",
    };

    if add_bytes {
        let bytes_str = bytes.to_formatted_string(&Locale::en);
        format!("{:.2} {} ({} bytes)", val, unit, bytes_str)
    } else {
        format!("{:.2} {}", val, unit)
    }
}

/// Parse a size such as "512 MiB", "2GiB" or "4096" into bytes.
///
/// Both binary (KiB) and the looser KB spellings are read as powers of 1024.
pub fn pretty_to_bytes(pretty: &str) -> Result<u64> {
    let trimmed = pretty.trim();
    let split_at = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split_at);

    if number.is_empty() {
        return Err(anyhow::anyhow!("Invalid size: {:?}", pretty));
    }

    let mut val: f64 = number.parse()?;

    let mut steps = match unit.trim() {
        "" | "B" => 0,
        "K" | "KB" | "KiB" => 1,
        "M" | "MB" | "MiB" => 2,
        "G" | "GB" | "GiB" => 3,
        "T" | "TB" | "TiB" => 4,
        "P" | "PB" | "PiB" => 5,
        other => return Err(anyhow::anyhow!("Invalid unit: {}", other)),
    };

    while steps > 0 {
        val *= 1024.;
        steps -= 1;
    }

    Ok(val as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(sector_size: u64, optimal_io_size: u64) -> Geometry {
        Geometry {
            sector_size,
            physical_sector_size: sector_size,
            minimum_io_size: sector_size,
            optimal_io_size,
            total_sectors: 1 << 20,
        }
    }

    #[test]
    fn default_grain_falls_back_to_one_mib() {
        assert_eq!(geometry(512, 0).default_grain(), MIB);
        assert_eq!(geometry(512, 64 * 1024).default_grain(), MIB);
        assert_eq!(geometry(4096, 0).default_grain(), MIB);
    }

    #[test]
    fn default_grain_honours_odd_optimal_io() {
        assert_eq!(geometry(512, 3 * MIB).default_grain(), 3 * MIB);
    }

    #[test]
    fn sector_range_relations() {
        let outer = SectorRange::new(2048, 4095);
        let inner = SectorRange::with_length(3000, 10);
        assert_eq!(outer.length(), 2048);
        assert!(outer.encloses(&inner));
        assert!(outer.overlaps(&SectorRange::new(4095, 5000)));
        assert!(!outer.overlaps(&SectorRange::new(4096, 5000)));
        assert!(!outer.contains(4096));
    }

    #[test]
    fn pretty_sizes_parse() {
        assert_eq!(pretty_to_bytes("4096").unwrap(), 4096);
        assert_eq!(pretty_to_bytes("2 MiB").unwrap(), 2 * MIB);
        assert_eq!(pretty_to_bytes("1GiB").unwrap(), 1024 * MIB);
        assert_eq!(pretty_to_bytes("1.5 KiB").unwrap(), 1536);
        assert!(pretty_to_bytes("MiB").is_err());
        assert!(pretty_to_bytes("3 furlongs").is_err());
    }

    #[test]
    fn pretty_sizes_render() {
        assert_eq!(bytes_to_pretty(&(2 * MIB), false), "2.00 MiB");
        assert_eq!(bytes_to_pretty(&1536, true), "1.50 KiB (1,536 bytes)");
    }
}
