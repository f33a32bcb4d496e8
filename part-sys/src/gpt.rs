// SPDX-License-Identifier: GPL-3.0-only

//! GPT label adapter
//!
//! `gptman` reads and writes the headers, entry arrays and the protective
//! MBR. The label is kept here as plain entries so edits stay checkable
//! before anything reaches the device.

use part_types::{DiskFlag, DiskFlags, Geometry, PartitionFlag, PartitionKind, SectorRange};
use uuid::Uuid;

use crate::device::Device;
use crate::error::{Result, SysError};
use crate::exception;
use crate::label::{LabelEntry, NewEntry};

const SIGNATURE: &[u8; 8] = b"EFI PART";
pub const ENTRY_COUNT: usize = 128;
pub const ENTRY_SIZE: usize = 128;

pub const TYPE_LINUX_FS: Uuid = Uuid::from_u128(0x0fc63daf_8483_4772_8e79_3d69d8477de4);
pub const TYPE_ESP: Uuid = Uuid::from_u128(0xc12a7328_f81f_11d2_ba4b_00a0c93ec93b);
pub const TYPE_BIOS_BOOT: Uuid = Uuid::from_u128(0x21686148_6449_6e6f_744e_656564454649);
pub const TYPE_LINUX_RAID: Uuid = Uuid::from_u128(0xa19d880f_05fc_4d3b_a006_743f0f84911e);
pub const TYPE_LINUX_LVM: Uuid = Uuid::from_u128(0xe6d6d379_f507_44c2_a23c_238f2a3df928);
pub const TYPE_LINUX_SWAP: Uuid = Uuid::from_u128(0x0657fd6d_a4ab_43c4_84e5_0933c84b4f4f);

const ATTR_LEGACY_BOOT: u64 = 1 << 2;
const ATTR_HIDDEN: u64 = 1 << 62;

const PMBR_TABLE_OFFSET: usize = 446;
const PMBR_SYSTEM: u8 = 0xee;
const PMBR_ACTIVE: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptEntry {
    pub type_guid: Uuid,
    pub unique_guid: Uuid,
    pub range: SectorRange,
    pub attributes: u64,
    pub name: String,
}

impl GptEntry {
    fn from_entry(entry: &gptman::GPTPartitionEntry) -> Self {
        Self {
            type_guid: Uuid::from_bytes_le(entry.partition_type_guid),
            unique_guid: Uuid::from_bytes_le(entry.unique_partition_guid),
            range: SectorRange::new(entry.starting_lba, entry.ending_lba),
            attributes: entry.attribute_bits,
            name: entry.partition_name.to_string(),
        }
    }

    fn to_entry(&self) -> gptman::GPTPartitionEntry {
        gptman::GPTPartitionEntry {
            partition_type_guid: self.type_guid.to_bytes_le(),
            unique_partition_guid: self.unique_guid.to_bytes_le(),
            starting_lba: self.range.start,
            ending_lba: self.range.end,
            attribute_bits: self.attributes,
            partition_name: self.name.as_str().into(),
        }
    }

    fn flags(&self) -> Vec<PartitionFlag> {
        let mut flags = Vec::new();
        match self.type_guid {
            TYPE_ESP => {
                flags.push(PartitionFlag::Boot);
                flags.push(PartitionFlag::Esp);
            }
            TYPE_BIOS_BOOT => flags.push(PartitionFlag::BiosGrub),
            TYPE_LINUX_RAID => flags.push(PartitionFlag::Raid),
            TYPE_LINUX_LVM => flags.push(PartitionFlag::Lvm),
            TYPE_LINUX_SWAP => flags.push(PartitionFlag::Swap),
            _ => {}
        }
        if self.attributes & ATTR_LEGACY_BOOT != 0 {
            flags.push(PartitionFlag::LegacyBoot);
        }
        if self.attributes & ATTR_HIDDEN != 0 {
            flags.push(PartitionFlag::Hidden);
        }
        flags.sort();
        flags
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptLabel {
    disk_guid: Uuid,
    first_usable: u64,
    last_usable: u64,
    entries: Vec<Option<GptEntry>>,
    total_sectors: u64,
    sector_size: u64,
    pmbr_boot: bool,
}

fn array_sectors(sector_size: u64) -> u64 {
    ((ENTRY_COUNT * ENTRY_SIZE) as u64).div_ceil(sector_size)
}

impl GptLabel {
    pub fn fresh(geometry: &Geometry) -> Result<Self> {
        let array = array_sectors(geometry.sector_size);
        // Protective MBR, two headers and two entry arrays, plus one sector to use.
        if geometry.total_sectors < 4 + 2 * array {
            return Err(exception::throw(SysError::OutOfRange(format!(
                "{} sectors are too few for a GPT label",
                geometry.total_sectors
            ))));
        }
        Ok(Self {
            disk_guid: Uuid::new_v4(),
            first_usable: 2 + array,
            last_usable: geometry.total_sectors - 2 - array,
            entries: vec![None; ENTRY_COUNT],
            total_sectors: geometry.total_sectors,
            sector_size: geometry.sector_size,
            pmbr_boot: false,
        })
    }

    /// Read the primary GPT, falling back to the backup copy. `Ok(None)`
    /// means neither header carries a GPT signature.
    pub fn read(device: &Device) -> Result<Option<Self>> {
        let geometry = device.geometry();
        let array = array_sectors(geometry.sector_size);
        if geometry.total_sectors < 4 + 2 * array {
            return Ok(None);
        }
        let last = geometry.total_sectors - 1;

        if !signed(device, 1)? && !signed(device, last)? {
            return Ok(None);
        }

        let mut file = device.file();
        let gpt = gptman::GPT::read_from(&mut file, geometry.sector_size).map_err(|e| {
            exception::throw(SysError::codec(
                format!(
                    "Both the primary and backup GPT tables of '{}' are corrupt",
                    device.path()
                ),
                &e,
                SysError::CorruptLabel,
            ))
        })?;

        // The backup header describes itself as living on the last sector.
        if gpt.header.primary_lba != 1 {
            let proceed = exception::warn(format!(
                "The primary GPT table of '{}' is corrupt, but the backup appears OK, so that will be used.",
                device.path()
            ));
            if !proceed {
                return Err(exception::throw(SysError::CorruptLabel(format!(
                    "primary GPT of '{}' is corrupt",
                    device.path()
                ))));
            }
        }

        let count = (gpt.header.number_of_partition_entries as usize).max(ENTRY_COUNT);
        let mut entries = vec![None; count];
        for (number, entry) in gpt.iter() {
            if !entry.is_used() {
                continue;
            }
            if let Some(slot) = (number as usize)
                .checked_sub(1)
                .and_then(|index| entries.get_mut(index))
            {
                *slot = Some(GptEntry::from_entry(entry));
            }
        }

        let mbr = device.read_sectors(0, 1)?;
        let pmbr_boot = mbr[PMBR_TABLE_OFFSET + 4] == PMBR_SYSTEM
            && mbr[PMBR_TABLE_OFFSET] == PMBR_ACTIVE;

        Ok(Some(Self {
            disk_guid: Uuid::from_bytes_le(gpt.header.disk_guid),
            first_usable: gpt.header.first_usable_lba.max(2 + array),
            last_usable: gpt.header.last_usable_lba.min(last - 1 - array),
            entries,
            total_sectors: geometry.total_sectors,
            sector_size: geometry.sector_size,
            pmbr_boot,
        }))
    }

    pub fn usable_range(&self) -> SectorRange {
        SectorRange::new(self.first_usable, self.last_usable)
    }

    /// Sectors holding the protective MBR, headers and entry arrays
    pub fn metadata(&self) -> Vec<SectorRange> {
        vec![
            SectorRange::new(0, self.first_usable - 1),
            SectorRange::new(self.last_usable + 1, self.total_sectors - 1),
        ]
    }

    pub fn entries(&self) -> Vec<LabelEntry> {
        let mut entries: Vec<LabelEntry> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| {
                entry.as_ref().map(|entry| LabelEntry {
                    number: slot as u32 + 1,
                    kind: PartitionKind::NORMAL,
                    range: entry.range,
                    flags: entry.flags(),
                    name: (!entry.name.is_empty()).then(|| entry.name.clone()),
                    type_id: entry.type_guid.to_string(),
                })
            })
            .collect();
        entries.sort_by_key(|e| e.range.start);
        entries
    }

    pub fn add(&mut self, new: &NewEntry) -> Result<u32> {
        if !new.kind.is_normal() {
            return Err(exception::throw(SysError::Unsupported(format!(
                "GPT labels have no {} partitions",
                new.kind
            ))));
        }

        let range = new.range;
        let usable = self.usable_range();
        if !usable.encloses(&range) {
            return Err(exception::throw(SysError::OutOfRange(format!(
                "sectors {}-{} are outside the usable area {}-{}",
                range.start, range.end, usable.start, usable.end
            ))));
        }

        if let Some(conflict) = self.entries.iter().flatten().find(|e| e.range.overlaps(&range)) {
            return Err(exception::throw(SysError::Overlap(format!(
                "sectors {}-{} overlap the partition at {}-{}",
                range.start, range.end, conflict.range.start, conflict.range.end
            ))));
        }

        let slot = self
            .entries
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                exception::throw(SysError::NoSlot(format!(
                    "all {} GPT entries are in use",
                    self.entries.len()
                )))
            })?;

        self.entries[slot] = Some(GptEntry {
            type_guid: TYPE_LINUX_FS,
            unique_guid: Uuid::new_v4(),
            range,
            attributes: 0,
            name: String::new(),
        });
        Ok(slot as u32 + 1)
    }

    pub fn remove(&mut self, slot: usize) -> Result<()> {
        match self.entries.get_mut(slot) {
            Some(entry) if entry.is_some() => {
                *entry = None;
                Ok(())
            }
            _ => Err(missing(slot)),
        }
    }

    pub fn set_flag(&mut self, slot: usize, flag: PartitionFlag, enabled: bool) -> Result<()> {
        let entry = self
            .entries
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or_else(|| missing(slot))?;

        let type_guid = match flag {
            PartitionFlag::Boot | PartitionFlag::Esp => Some(TYPE_ESP),
            PartitionFlag::BiosGrub => Some(TYPE_BIOS_BOOT),
            PartitionFlag::Raid => Some(TYPE_LINUX_RAID),
            PartitionFlag::Lvm => Some(TYPE_LINUX_LVM),
            PartitionFlag::Swap => Some(TYPE_LINUX_SWAP),
            PartitionFlag::LegacyBoot | PartitionFlag::Hidden => None,
        };

        match type_guid {
            Some(guid) if enabled => entry.type_guid = guid,
            Some(guid) => {
                if entry.type_guid == guid {
                    entry.type_guid = TYPE_LINUX_FS;
                }
            }
            None => {
                let bit = if flag == PartitionFlag::LegacyBoot {
                    ATTR_LEGACY_BOOT
                } else {
                    ATTR_HIDDEN
                };
                if enabled {
                    entry.attributes |= bit;
                } else {
                    entry.attributes &= !bit;
                }
            }
        }
        Ok(())
    }

    pub fn disk_flags(&self) -> DiskFlags {
        if self.pmbr_boot {
            DiskFlag::PmbrBoot.into()
        } else {
            DiskFlags::empty()
        }
    }

    pub fn set_pmbr_boot(&mut self, enabled: bool) {
        self.pmbr_boot = enabled;
    }

    pub fn write(&self, device: &Device) -> Result<()> {
        let path = device.path();
        let failed = |e: gptman::Error| {
            exception::throw(SysError::codec(
                format!("Failed to write the GPT label of '{}'", path),
                &e,
                SysError::InvalidArgument,
            ))
        };

        let mut file = device.file();
        let mut gpt =
            gptman::GPT::new_from(&mut file, self.sector_size, self.disk_guid.to_bytes_le())
                .map_err(failed)?;
        gpt.header.first_usable_lba = self.first_usable;
        gpt.header.last_usable_lba = self.last_usable;

        let capacity = gpt.header.number_of_partition_entries;
        for (slot, entry) in self.entries.iter().enumerate() {
            let Some(entry) = entry else { continue };
            let number = slot as u32 + 1;
            if number > capacity {
                return Err(exception::throw(SysError::NoSlot(format!(
                    "partition {} does not fit a {}-entry GPT",
                    number, capacity
                ))));
            }
            gpt[number] = entry.to_entry();
        }

        gpt.write_into(&mut file).map_err(failed)?;
        gptman::GPT::write_protective_mbr_into(&mut file, self.sector_size).map_err(failed)?;

        if self.pmbr_boot {
            let mut mbr = device.read_sectors(0, 1)?;
            mbr[PMBR_TABLE_OFFSET] = PMBR_ACTIVE;
            device.write_sectors(0, &mbr)?;
        }
        Ok(())
    }
}

fn missing(slot: usize) -> SysError {
    exception::throw(SysError::InvalidArgument(format!(
        "partition {} does not exist",
        slot + 1
    )))
}

fn signed(device: &Device, lba: u64) -> Result<bool> {
    Ok(&device.read_sectors(lba, 1)?[0..8] == SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceOptions;

    const MIB_SECTORS: u64 = 2048;

    fn image(bytes: u64) -> (tempfile::NamedTempFile, Device) {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(bytes).unwrap();
        let device = Device::open(file.path().to_str().unwrap(), DeviceOptions::default()).unwrap();
        (file, device)
    }

    fn normal(start: u64, length: u64) -> NewEntry {
        NewEntry {
            kind: PartitionKind::NORMAL,
            range: SectorRange::with_length(start, length),
            system: None,
        }
    }

    #[test]
    fn fresh_label_reserves_headers_and_arrays() {
        let (_file, device) = image(64 * 1024 * 1024);
        let label = GptLabel::fresh(&device.geometry()).unwrap();
        assert_eq!(label.usable_range(), SectorRange::new(34, 131072 - 34));
        assert_eq!(
            label.metadata(),
            vec![SectorRange::new(0, 33), SectorRange::new(131072 - 33, 131071)]
        );
    }

    #[test]
    fn only_normal_partitions_exist() {
        let (_file, device) = image(64 * 1024 * 1024);
        let mut label = GptLabel::fresh(&device.geometry()).unwrap();
        let err = label
            .add(&NewEntry {
                kind: PartitionKind::LOGICAL,
                range: SectorRange::with_length(MIB_SECTORS, MIB_SECTORS),
                system: None,
            })
            .unwrap_err();
        assert!(matches!(err, SysError::Unsupported(_)));

        assert_eq!(label.add(&normal(MIB_SECTORS, MIB_SECTORS)).unwrap(), 1);
        assert!(matches!(
            label.add(&normal(MIB_SECTORS + 10, MIB_SECTORS)),
            Err(SysError::Overlap(_))
        ));
        assert!(matches!(
            label.add(&normal(10, MIB_SECTORS)),
            Err(SysError::OutOfRange(_))
        ));
    }

    #[test]
    fn flags_map_to_types_and_attributes() {
        let (_file, device) = image(64 * 1024 * 1024);
        let mut label = GptLabel::fresh(&device.geometry()).unwrap();
        label.add(&normal(MIB_SECTORS, MIB_SECTORS)).unwrap();

        label.set_flag(0, PartitionFlag::Esp, true).unwrap();
        label.set_flag(0, PartitionFlag::Hidden, true).unwrap();
        let entry = &label.entries()[0];
        assert_eq!(entry.type_id, TYPE_ESP.to_string());
        assert_eq!(
            entry.flags,
            vec![PartitionFlag::Boot, PartitionFlag::Esp, PartitionFlag::Hidden]
        );

        label.set_flag(0, PartitionFlag::Boot, false).unwrap();
        label.set_flag(0, PartitionFlag::Hidden, false).unwrap();
        let entry = &label.entries()[0];
        assert_eq!(entry.type_id, TYPE_LINUX_FS.to_string());
        assert!(entry.flags.is_empty());
    }

    #[test]
    fn label_survives_a_write_and_read() {
        let (_file, device) = image(64 * 1024 * 1024);
        let mut label = GptLabel::fresh(&device.geometry()).unwrap();
        label.add(&normal(MIB_SECTORS, 8 * MIB_SECTORS)).unwrap();
        label.add(&normal(20 * MIB_SECTORS, 8 * MIB_SECTORS)).unwrap();
        label.set_flag(1, PartitionFlag::LegacyBoot, true).unwrap();
        label.set_pmbr_boot(true);
        label.write(&device).unwrap();

        let read = GptLabel::read(&device).unwrap().expect("label present");
        assert_eq!(read.entries(), label.entries());
        assert_eq!(read.disk_flags(), DiskFlags::from(DiskFlag::PmbrBoot));
    }

    #[test]
    fn corrupt_primary_falls_back_to_backup() {
        let (_file, device) = image(64 * 1024 * 1024);
        let mut label = GptLabel::fresh(&device.geometry()).unwrap();
        label.add(&normal(MIB_SECTORS, 8 * MIB_SECTORS)).unwrap();
        label.write(&device).unwrap();

        let mut header = device.read_sectors(1, 1).unwrap();
        header[40] ^= 0xff;
        device.write_sectors(1, &header).unwrap();

        let read = GptLabel::read(&device).unwrap().expect("backup used");
        assert_eq!(read.entries(), label.entries());

        let total = device.geometry().total_sectors;
        let mut backup = device.read_sectors(total - 1, 1).unwrap();
        backup[40] ^= 0xff;
        device.write_sectors(total - 1, &backup).unwrap();
        assert!(matches!(
            GptLabel::read(&device),
            Err(SysError::CorruptLabel(_))
        ));

        device.write_sectors(1, &[0u8; 512]).unwrap();
        device.write_sectors(total - 1, &[0u8; 512]).unwrap();
        assert!(GptLabel::read(&device).unwrap().is_none());
    }
}
