//! Disk data models
//!
//! A [`DiskSpec`] is the read-only picture of a disk taken when it is opened.

use std::fmt;
use std::str::FromStr;

use enumflags2::{BitFlags, bitflags};
use serde::{Deserialize, Serialize};

use crate::PartitionSpec;

/// Partition table type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    /// MBR/DOS (Master Boot Record)
    Msdos,

    /// GPT (GUID Partition Table)
    Gpt,
}

impl TableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Msdos => "msdos",
            Self::Gpt => "gpt",
        }
    }

    /// Whether the table distinguishes primary, extended and logical partitions
    pub fn supports_extended(&self) -> bool {
        matches!(self, Self::Msdos)
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gpt" => Ok(Self::Gpt),
            "dos" | "mbr" | "msdos" => Ok(Self::Msdos),
            _ => Err(format!(
                "Invalid table type: {s}. Must be 'gpt' or 'msdos'/'dos'/'mbr'"
            )),
        }
    }
}

/// Disk-wide flags.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskFlag {
    /// The GPT protective MBR entry is marked bootable
    PmbrBoot = 1 << 0,
    /// The device is a regular image file rather than a block device
    ImageFile = 1 << 1,
}

pub type DiskFlags = BitFlags<DiskFlag>;

/// Complete disk information as seen at open time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    /// Device path (e.g., "/dev/sda")
    pub path: String,

    /// Partition table type, or None when the disk carries no table
    pub table_type: Option<TableType>,

    /// Total size in bytes
    pub size: u64,

    /// Logical sector size in bytes
    pub sector_size: u64,

    pub flags: DiskFlags,

    /// Real partitions, ordered by start offset
    pub partitions: Vec<PartitionSpec>,
}

impl DiskSpec {
    pub fn has_table(&self) -> bool {
        self.table_type.is_some()
    }

    /// Get a human-readable display name for the disk
    pub fn display_name(&self) -> String {
        self.path
            .split('/')
            .next_back()
            .unwrap_or(&self.path)
            .to_string()
    }
}
