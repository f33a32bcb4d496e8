//! Partition information - flat representation
//!
//! These types describe partitions the way callers see them: byte offsets,
//! device nodes and a kind bitset mirroring what table enumeration reports.

use std::fmt;
use std::str::FromStr;

use enumflags2::{BitFlags, bitflags, make_bitflags};
use serde::{Deserialize, Serialize};

/// Individual bits of a [`PartitionKind`].
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionKindFlag {
    Logical = 1 << 0,
    Extended = 1 << 1,
    FreeSpace = 1 << 2,
    Metadata = 1 << 3,
    Protected = 1 << 4,
}

/// Kind of a table entry.
///
/// NORMAL is the empty set. FREESPACE, METADATA and PROTECTED never come from
/// a caller; enumeration synthesizes them, sometimes combined with LOGICAL for
/// regions inside the extended container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKind(BitFlags<PartitionKindFlag>);

impl PartitionKind {
    pub const NORMAL: Self = Self(BitFlags::EMPTY);
    pub const LOGICAL: Self = Self(make_bitflags!(PartitionKindFlag::{Logical}));
    pub const EXTENDED: Self = Self(make_bitflags!(PartitionKindFlag::{Extended}));
    pub const FREESPACE: Self = Self(make_bitflags!(PartitionKindFlag::{FreeSpace}));
    pub const METADATA: Self = Self(make_bitflags!(PartitionKindFlag::{Metadata}));
    pub const PROTECTED: Self = Self(make_bitflags!(PartitionKindFlag::{Protected}));

    pub fn bits(&self) -> u8 {
        self.0.bits()
    }

    pub fn flags(&self) -> BitFlags<PartitionKindFlag> {
        self.0
    }

    pub fn contains(&self, other: PartitionKind) -> bool {
        self.0.contains(other.0)
    }

    pub fn is_normal(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_logical(&self) -> bool {
        self.0.contains(PartitionKindFlag::Logical)
    }

    pub fn is_extended(&self) -> bool {
        self.0.contains(PartitionKindFlag::Extended)
    }

    pub fn is_free_space(&self) -> bool {
        self.0.contains(PartitionKindFlag::FreeSpace)
    }

    pub fn is_metadata(&self) -> bool {
        self.0.contains(PartitionKindFlag::Metadata)
    }

    /// Synthetic entries are reported by enumeration but are not partitions
    pub fn is_synthetic(&self) -> bool {
        self.0.intersects(
            PartitionKindFlag::FreeSpace | PartitionKindFlag::Metadata | PartitionKindFlag::Protected,
        )
    }

    /// Whether this entry occupies one of the four top-level MSDOS slots
    pub fn is_top_level(&self) -> bool {
        !self.is_synthetic() && !self.is_logical()
    }
}

impl std::ops::BitOr for PartitionKind {
    type Output = PartitionKind;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_normal() {
            return f.write_str("normal");
        }

        let names: Vec<&str> = self
            .0
            .iter()
            .map(|flag| match flag {
                PartitionKindFlag::Logical => "logical",
                PartitionKindFlag::Extended => "extended",
                PartitionKindFlag::FreeSpace => "freespace",
                PartitionKindFlag::Metadata => "metadata",
                PartitionKindFlag::Protected => "protected",
            })
            .collect();
        f.write_str(&names.join("|"))
    }
}

/// What kind of partition a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionTypeRequest {
    Normal,
    Logical,
    Extended,
    /// Let the planner infer the kind from the current layout
    Next,
}

impl PartitionTypeRequest {
    /// The concrete kind for explicit requests; `None` for [`Self::Next`]
    pub fn explicit_kind(&self) -> Option<PartitionKind> {
        match self {
            Self::Normal => Some(PartitionKind::NORMAL),
            Self::Logical => Some(PartitionKind::LOGICAL),
            Self::Extended => Some(PartitionKind::EXTENDED),
            Self::Next => None,
        }
    }
}

impl FromStr for PartitionTypeRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" | "primary" => Ok(Self::Normal),
            "logical" => Ok(Self::Logical),
            "extended" => Ok(Self::Extended),
            "next" => Ok(Self::Next),
            _ => Err(format!(
                "Invalid partition type: {s}. Must be one of normal, logical, extended, next"
            )),
        }
    }
}

/// Which device-reported grain is authoritative when aligning a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    /// Align to the minimal I/O size
    Minimal,
    /// Align to the device's default (optimal) grain
    #[default]
    Optimal,
    /// Align to sectors only
    None,
}

impl FromStr for AlignmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "optimal" => Ok(Self::Optimal),
            "none" => Ok(Self::None),
            _ => Err(format!(
                "Invalid alignment: {s}. Must be one of minimal, optimal, none"
            )),
        }
    }
}

/// User-toggleable partition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionFlag {
    Boot,
    Esp,
    BiosGrub,
    LegacyBoot,
    Hidden,
    Raid,
    Lvm,
    Swap,
}

impl PartitionFlag {
    pub const ALL: [PartitionFlag; 8] = [
        Self::Boot,
        Self::Esp,
        Self::BiosGrub,
        Self::LegacyBoot,
        Self::Hidden,
        Self::Raid,
        Self::Lvm,
        Self::Swap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::Esp => "esp",
            Self::BiosGrub => "bios_grub",
            Self::LegacyBoot => "legacy_boot",
            Self::Hidden => "hidden",
            Self::Raid => "raid",
            Self::Lvm => "lvm",
            Self::Swap => "swap",
        }
    }
}

impl fmt::Display for PartitionFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|flag| flag.as_str() == normalized)
            .ok_or_else(|| format!("Unknown partition flag: {s}"))
    }
}

/// A partition as returned from creation or enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    /// Device node (e.g., "/dev/sda1")
    pub path: String,

    /// Partition number (1-based)
    pub number: u32,

    pub kind: PartitionKind,

    /// Offset from the start of the disk in bytes
    pub start: u64,

    /// Size in bytes
    pub size: u64,

    /// Flags currently set on the partition
    pub flags: Vec<PartitionFlag>,

    /// Partition name (GPT only)
    pub name: Option<String>,

    /// Partition type GUID (GPT) or system id (MSDOS, e.g. "0x83")
    pub type_id: String,
}

impl PartitionSpec {
    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    pub fn has_flag(&self, flag: PartitionFlag) -> bool {
        self.flags.contains(&flag)
    }
}
