// SPDX-License-Identifier: GPL-3.0-only

//! Format-independent view of a partition label

use part_types::{DiskFlags, Geometry, PartitionFlag, PartitionKind, SectorRange, TableType};

use crate::device::Device;
use crate::error::Result;
use crate::gpt::GptLabel;
use crate::msdos::MsdosLabel;

/// A partition as stored in a label, in sectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    /// 1-based partition number
    pub number: u32,
    pub kind: PartitionKind,
    pub range: SectorRange,
    pub flags: Vec<PartitionFlag>,
    pub name: Option<String>,
    pub type_id: String,
}

/// A partition to be added to a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewEntry {
    pub kind: PartitionKind,
    pub range: SectorRange,
    /// MSDOS system id; the Linux default is used when unset
    pub system: Option<u8>,
}

impl NewEntry {
    pub fn new(kind: PartitionKind, range: SectorRange) -> Self {
        Self {
            kind,
            range,
            system: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Msdos(MsdosLabel),
    Gpt(GptLabel),
}

impl Label {
    pub fn fresh(table_type: TableType, geometry: &Geometry) -> Result<Self> {
        match table_type {
            TableType::Msdos => Ok(Self::Msdos(MsdosLabel::fresh(geometry))),
            TableType::Gpt => Ok(Self::Gpt(GptLabel::fresh(geometry)?)),
        }
    }

    /// Read the label of `device`. GPT wins over MSDOS, since a GPT disk
    /// also carries a (protective) MBR.
    pub fn read(device: &Device) -> Result<Option<Self>> {
        if let Some(gpt) = GptLabel::read(device)? {
            return Ok(Some(Self::Gpt(gpt)));
        }
        Ok(MsdosLabel::read(device)?.map(Self::Msdos))
    }

    pub fn table_type(&self) -> TableType {
        match self {
            Self::Msdos(_) => TableType::Msdos,
            Self::Gpt(_) => TableType::Gpt,
        }
    }

    /// Real partitions, ordered by start sector
    pub fn entries(&self) -> Vec<LabelEntry> {
        match self {
            Self::Msdos(label) => label.entries(),
            Self::Gpt(label) => label.entries(),
        }
    }

    pub fn usable_range(&self) -> SectorRange {
        match self {
            Self::Msdos(label) => label.usable_range(),
            Self::Gpt(label) => label.usable_range(),
        }
    }

    /// Sectors the label itself occupies
    pub fn metadata(&self) -> Vec<SectorRange> {
        match self {
            Self::Msdos(label) => label.metadata(),
            Self::Gpt(label) => label.metadata(),
        }
    }

    /// Add a partition and return its 1-based number.
    pub fn add(&mut self, entry: &NewEntry) -> Result<u32> {
        match self {
            Self::Msdos(label) => label.add(entry),
            Self::Gpt(label) => label.add(entry),
        }
    }

    pub fn remove(&mut self, slot: usize) -> Result<()> {
        match self {
            Self::Msdos(label) => label.remove(slot),
            Self::Gpt(label) => label.remove(slot),
        }
    }

    pub fn set_flag(&mut self, slot: usize, flag: PartitionFlag, enabled: bool) -> Result<()> {
        match self {
            Self::Msdos(label) => label.set_flag(slot, flag, enabled),
            Self::Gpt(label) => label.set_flag(slot, flag, enabled),
        }
    }

    pub fn flags(&self) -> DiskFlags {
        match self {
            Self::Msdos(_) => DiskFlags::empty(),
            Self::Gpt(label) => label.disk_flags(),
        }
    }

    pub fn write(&self, device: &Device) -> Result<()> {
        match self {
            Self::Msdos(label) => label.write(device),
            Self::Gpt(label) => label.write(device),
        }
    }
}
