// SPDX-License-Identifier: GPL-3.0-only

//! MSDOS (MBR) label adapter
//!
//! The byte layout is handled by `mbrman`. This module keeps the staged view
//! of the label and the rules for editing it. Four primary slots live in
//! sector 0; one of them may be an extended container whose logical
//! partitions are chained through extended boot records (EBRs). The first EBR
//! always sits on the container's first sector, every further EBR on the
//! sector right before its logical partition.

use part_types::{Geometry, PartitionFlag, PartitionKind, SectorRange};

use crate::device::Device;
use crate::error::{Result, SysError};
use crate::exception;
use crate::label::{LabelEntry, NewEntry};

pub const SYSTEM_EMPTY: u8 = 0x00;
pub const SYSTEM_EXTENDED: u8 = 0x05;
pub const SYSTEM_EXTENDED_LBA: u8 = 0x0f;
pub const SYSTEM_LINUX_EXTENDED: u8 = 0x85;
pub const SYSTEM_LINUX_SWAP: u8 = 0x82;
pub const SYSTEM_LINUX: u8 = 0x83;
pub const SYSTEM_LINUX_LVM: u8 = 0x8e;
pub const SYSTEM_GPT_PROTECTIVE: u8 = 0xee;
pub const SYSTEM_EFI: u8 = 0xef;
pub const SYSTEM_LINUX_RAID: u8 = 0xfd;

const HIDDEN_BIT: u8 = 0x10;
/// FAT/NTFS ids that have a "hidden" twin with bit 0x10 set
const HIDEABLE: [u8; 7] = [0x01, 0x04, 0x06, 0x07, 0x0b, 0x0c, 0x0e];

const BOOT_ACTIVE: u8 = 0x80;
const TABLE_OFFSET: usize = 446;
const BOOT_CODE_LEN: usize = 440;
const SIGNATURE_OFFSET: usize = 510;
const SIGNATURE: [u8; 2] = [0x55, 0xAA];

pub const PRIMARY_SLOTS: usize = 4;
/// Guard against looping EBR chains
const MAX_LOGICALS: usize = 128;

pub fn is_extended_system(system: u8) -> bool {
    matches!(
        system,
        SYSTEM_EXTENDED | SYSTEM_EXTENDED_LBA | SYSTEM_LINUX_EXTENDED
    )
}

/// A table slot as found on disk, looked at before the label is handed to
/// `mbrman`
#[derive(Debug, Clone, Copy)]
struct RawSlot {
    boot: u8,
    system: u8,
    start: u64,
    sectors: u64,
}

impl RawSlot {
    fn peek(sector: &[u8], slot: usize) -> Self {
        let at = TABLE_OFFSET + slot * 16;
        let le32 = |from: usize| {
            u32::from_le_bytes([sector[from], sector[from + 1], sector[from + 2], sector[from + 3]])
        };
        Self {
            boot: sector[at],
            system: sector[at + 4],
            start: u64::from(le32(at + 8)),
            sectors: u64::from(le32(at + 12)),
        }
    }

    fn is_used(&self) -> bool {
        self.system != SYSTEM_EMPTY && self.sectors != 0
    }
}

/// One partition as stored in an MSDOS label, in absolute sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosPartition {
    pub range: SectorRange,
    pub system: u8,
    pub active: bool,
}

impl DosPartition {
    fn from_entry(entry: &mbrman::MBRPartitionEntry) -> Self {
        Self {
            range: SectorRange::with_length(
                u64::from(entry.starting_lba),
                u64::from(entry.sectors),
            ),
            system: entry.sys,
            active: entry.boot,
        }
    }

    /// Ranges are kept within 32 bits by [`MsdosLabel::add`].
    fn to_entry(&self) -> mbrman::MBRPartitionEntry {
        mbrman::MBRPartitionEntry {
            boot: self.active,
            first_chs: mbrman::CHS::empty(),
            sys: self.system,
            last_chs: mbrman::CHS::empty(),
            starting_lba: self.range.start as u32,
            sectors: self.range.length() as u32,
        }
    }

    fn flags(&self) -> Vec<PartitionFlag> {
        let mut flags = Vec::new();
        if self.active {
            flags.push(PartitionFlag::Boot);
        }
        match self.system {
            SYSTEM_EFI => flags.push(PartitionFlag::Esp),
            SYSTEM_LINUX_RAID => flags.push(PartitionFlag::Raid),
            SYSTEM_LINUX_LVM => flags.push(PartitionFlag::Lvm),
            SYSTEM_LINUX_SWAP => flags.push(PartitionFlag::Swap),
            id if id & HIDDEN_BIT != 0 && HIDEABLE.contains(&(id & !HIDDEN_BIT)) => {
                flags.push(PartitionFlag::Hidden)
            }
            _ => {}
        }
        flags
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsdosLabel {
    boot_code: Vec<u8>,
    disk_signature: [u8; 4],
    primaries: [Option<DosPartition>; PRIMARY_SLOTS],
    /// Sorted by start sector
    logicals: Vec<DosPartition>,
    total_sectors: u64,
}

impl MsdosLabel {
    pub fn fresh(geometry: &Geometry) -> Self {
        Self {
            boot_code: vec![0u8; BOOT_CODE_LEN],
            disk_signature: uuid::Uuid::new_v4().as_fields().0.to_le_bytes(),
            primaries: [None; PRIMARY_SLOTS],
            logicals: Vec::new(),
            total_sectors: geometry.total_sectors,
        }
    }

    /// Read the label in sector 0 of `device`. `Ok(None)` means there is no
    /// MSDOS label, which includes a GPT protective MBR.
    pub fn read(device: &Device) -> Result<Option<Self>> {
        let sector = device.read_sectors(0, 1)?;
        if sector[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2] != SIGNATURE {
            return Ok(None);
        }

        let slots: Vec<RawSlot> = (0..PRIMARY_SLOTS)
            .map(|slot| RawSlot::peek(&sector, slot))
            .collect();

        // A FAT boot sector also ends in 55AA; its "boot flags" are code bytes.
        if slots.iter().any(|s| s.boot != 0 && s.boot != BOOT_ACTIVE) {
            return Ok(None);
        }
        if slots.iter().any(|s| s.system == SYSTEM_GPT_PROTECTIVE) {
            return Ok(None);
        }

        let total_sectors = device.geometry().total_sectors;
        for (slot, raw) in slots.iter().enumerate().filter(|(_, s)| s.is_used()) {
            if raw.start == 0 || raw.start + raw.sectors > total_sectors {
                return Err(exception::throw(SysError::CorruptLabel(format!(
                    "partition {} of '{}' covers sectors {}-{}, outside the disk's {} sectors",
                    slot + 1,
                    device.path(),
                    raw.start,
                    raw.start + raw.sectors - 1,
                    total_sectors
                ))));
            }
        }
        if let Some(extended) = slots
            .iter()
            .find(|s| s.is_used() && is_extended_system(s.system))
        {
            check_ebr_links(device, SectorRange::with_length(extended.start, extended.sectors))?;
        }

        let mut file = device.file();
        let mbr = mbrman::MBR::read_from(&mut file, device.geometry().sector_size as u32)
            .map_err(|e| {
                exception::throw(SysError::codec(
                    format!("Failed to read the msdos label of '{}'", device.path()),
                    &e,
                    SysError::CorruptLabel,
                ))
            })?;

        let mut primaries = [None; PRIMARY_SLOTS];
        for (slot, primary) in primaries.iter_mut().enumerate() {
            let entry = &mbr[slot + 1];
            if entry.sys != SYSTEM_EMPTY && entry.sectors != 0 {
                *primary = Some(DosPartition::from_entry(entry));
            }
        }

        let mut label = Self {
            boot_code: sector[..BOOT_CODE_LEN].to_vec(),
            disk_signature: mbr.header.disk_signature,
            primaries,
            logicals: Vec::new(),
            total_sectors,
        };

        if let Some(extended) = label.extended() {
            for logical in &mbr.logical_partitions {
                let entry = &logical.partition;
                if entry.sys == SYSTEM_EMPTY || entry.sectors == 0 {
                    continue;
                }
                let partition = DosPartition::from_entry(entry);
                if !extended.range.encloses(&partition.range)
                    || partition.range.start <= u64::from(logical.absolute_ebr_lba)
                {
                    return Err(exception::throw(SysError::CorruptLabel(format!(
                        "logical partition at {}-{} lies outside its extended partition",
                        partition.range.start, partition.range.end
                    ))));
                }
                label.logicals.push(partition);
            }
            label.logicals.sort_by_key(|p| p.range.start);
        }

        Ok(Some(label))
    }

    pub fn extended(&self) -> Option<DosPartition> {
        self.primaries
            .iter()
            .flatten()
            .find(|p| is_extended_system(p.system))
            .copied()
    }

    pub fn usable_range(&self) -> SectorRange {
        let last = self
            .total_sectors
            .saturating_sub(1)
            .min(u32::MAX as u64);
        SectorRange::new(1, last)
    }

    /// Sectors holding the MBR and the EBR chain
    pub fn metadata(&self) -> Vec<SectorRange> {
        let mut ranges = vec![SectorRange::new(0, 0)];
        if let Some(extended) = self.extended() {
            ranges.extend(
                ebr_locations(extended.range, &self.logicals)
                    .into_iter()
                    .map(|lba| SectorRange::new(lba, lba)),
            );
        }
        ranges
    }

    pub fn entries(&self) -> Vec<LabelEntry> {
        let mut entries = Vec::new();
        for (slot, partition) in self.primaries.iter().enumerate() {
            if let Some(partition) = partition {
                let extended = is_extended_system(partition.system);
                entries.push(LabelEntry {
                    number: slot as u32 + 1,
                    kind: if extended {
                        PartitionKind::EXTENDED
                    } else {
                        PartitionKind::NORMAL
                    },
                    range: partition.range,
                    flags: if extended { Vec::new() } else { partition.flags() },
                    name: None,
                    type_id: format!("0x{:02x}", partition.system),
                });
            }
        }
        for (index, partition) in self.logicals.iter().enumerate() {
            entries.push(LabelEntry {
                number: (PRIMARY_SLOTS + index) as u32 + 1,
                kind: PartitionKind::LOGICAL,
                range: partition.range,
                flags: partition.flags(),
                name: None,
                type_id: format!("0x{:02x}", partition.system),
            });
        }
        entries.sort_by_key(|e| e.range.start);
        entries
    }

    pub fn add(&mut self, new: &NewEntry) -> Result<u32> {
        let range = new.range;
        let usable = self.usable_range();
        if !usable.encloses(&range) || range.length() > u32::MAX as u64 {
            return Err(exception::throw(SysError::OutOfRange(format!(
                "sectors {}-{} do not fit an msdos label (usable {}-{})",
                range.start, range.end, usable.start, usable.end
            ))));
        }

        if new.kind.is_logical() {
            return self.add_logical(range, new.system.unwrap_or(SYSTEM_LINUX));
        }

        let extended = new.kind.is_extended();
        if extended && self.extended().is_some() {
            return Err(exception::throw(SysError::Nesting(
                "only one extended partition is allowed on an msdos label".to_string(),
            )));
        }

        if let Some(conflict) = self.primaries.iter().flatten().find(|p| p.range.overlaps(&range)) {
            return Err(exception::throw(SysError::Overlap(format!(
                "sectors {}-{} overlap the partition at {}-{}",
                range.start, range.end, conflict.range.start, conflict.range.end
            ))));
        }

        let slot = self
            .primaries
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                exception::throw(SysError::NoSlot(
                    "all four primary slots of the msdos label are in use".to_string(),
                ))
            })?;

        let system = if extended {
            SYSTEM_EXTENDED
        } else {
            new.system.unwrap_or(SYSTEM_LINUX)
        };
        self.primaries[slot] = Some(DosPartition {
            range,
            system,
            active: false,
        });
        Ok(slot as u32 + 1)
    }

    fn add_logical(&mut self, range: SectorRange, system: u8) -> Result<u32> {
        let Some(extended) = self.extended() else {
            return Err(exception::throw(SysError::Nesting(
                "logical partitions need an extended partition".to_string(),
            )));
        };

        if !extended.range.encloses(&range) || range.start == extended.range.start {
            return Err(exception::throw(SysError::Nesting(format!(
                "sectors {}-{} are not inside the extended partition at {}-{}",
                range.start, range.end, extended.range.start, extended.range.end
            ))));
        }

        if self.logicals.len() >= MAX_LOGICALS {
            return Err(exception::throw(SysError::NoSlot(
                "too many logical partitions".to_string(),
            )));
        }

        let mut logicals = self.logicals.clone();
        logicals.push(DosPartition {
            range,
            system,
            active: false,
        });
        logicals.sort_by_key(|p| p.range.start);

        for pair in logicals.windows(2) {
            // The EBR of the second partition sits right before it.
            if pair[1].range.start <= pair[0].range.end + 1 {
                return Err(exception::throw(SysError::Overlap(format!(
                    "logical partitions at {}-{} and {}-{} leave no room for an extended boot record",
                    pair[0].range.start, pair[0].range.end, pair[1].range.start, pair[1].range.end
                ))));
            }
        }

        let index = logicals
            .iter()
            .position(|p| p.range == range)
            .unwrap_or(logicals.len() - 1);
        self.logicals = logicals;
        Ok((PRIMARY_SLOTS + index) as u32 + 1)
    }

    /// Remove the partition in `slot` (0-based: primaries 0-3, logicals from 4).
    /// Removing the extended partition removes its logical partitions too.
    pub fn remove(&mut self, slot: usize) -> Result<()> {
        if slot < PRIMARY_SLOTS {
            let Some(partition) = self.primaries[slot].take() else {
                return Err(missing(slot));
            };
            if is_extended_system(partition.system) {
                self.logicals.clear();
            }
            return Ok(());
        }

        let index = slot - PRIMARY_SLOTS;
        if index >= self.logicals.len() {
            return Err(missing(slot));
        }
        self.logicals.remove(index);
        Ok(())
    }

    pub fn set_flag(&mut self, slot: usize, flag: PartitionFlag, enabled: bool) -> Result<()> {
        let partition = self.partition(slot).ok_or_else(|| missing(slot))?;
        if is_extended_system(partition.system) {
            return Err(exception::throw(SysError::Unsupported(format!(
                "flag '{}' cannot be set on an extended partition",
                flag
            ))));
        }

        match flag {
            PartitionFlag::Boot => {
                if enabled {
                    // Only one partition may be active at a time.
                    for other in self.primaries.iter_mut().flatten() {
                        other.active = false;
                    }
                    for other in self.logicals.iter_mut() {
                        other.active = false;
                    }
                }
                if let Some(partition) = self.partition_mut(slot) {
                    partition.active = enabled;
                }
            }
            PartitionFlag::Hidden => {
                let system = partition.system;
                if !HIDEABLE.contains(&(system & !HIDDEN_BIT)) {
                    return Err(exception::throw(SysError::Unsupported(format!(
                        "partitions of type 0x{:02x} cannot be hidden",
                        system
                    ))));
                }
                if let Some(partition) = self.partition_mut(slot) {
                    partition.system = if enabled {
                        system | HIDDEN_BIT
                    } else {
                        system & !HIDDEN_BIT
                    };
                }
            }
            PartitionFlag::Esp
            | PartitionFlag::Raid
            | PartitionFlag::Lvm
            | PartitionFlag::Swap => {
                let system = match flag {
                    PartitionFlag::Esp => SYSTEM_EFI,
                    PartitionFlag::Raid => SYSTEM_LINUX_RAID,
                    PartitionFlag::Lvm => SYSTEM_LINUX_LVM,
                    _ => SYSTEM_LINUX_SWAP,
                };
                if let Some(partition) = self.partition_mut(slot) {
                    if enabled {
                        partition.system = system;
                    } else if partition.system == system {
                        partition.system = SYSTEM_LINUX;
                    }
                }
            }
            PartitionFlag::BiosGrub | PartitionFlag::LegacyBoot => {
                return Err(exception::throw(SysError::Unsupported(format!(
                    "flag '{}' is not available on msdos labels",
                    flag
                ))));
            }
        }
        Ok(())
    }

    pub fn write(&self, device: &Device) -> Result<()> {
        let path = device.path();
        let failed = |e: mbrman::Error| {
            exception::throw(SysError::codec(
                format!("Failed to write the msdos label of '{}'", path),
                &e,
                SysError::InvalidArgument,
            ))
        };

        let mut file = device.file();
        let mut mbr = mbrman::MBR::new_from(
            &mut file,
            device.geometry().sector_size as u32,
            self.disk_signature,
        )
        .map_err(failed)?;
        // Placement is decided by the caller; mbrman must not move anything.
        mbr.align = 1;

        for (slot, partition) in self.primaries.iter().enumerate() {
            if let Some(partition) = partition {
                mbr[slot + 1] = partition.to_entry();
            }
        }

        let extended = self.extended();
        if let Some(extended) = extended {
            let locations = ebr_locations(extended.range, &self.logicals);
            for (logical, &ebr) in self.logicals.iter().zip(&locations) {
                let pushed = mbr
                    .push(logical.system, ebr as u32, (logical.range.end - ebr + 1) as u32)
                    .map_err(failed)?;
                pushed.absolute_ebr_lba = ebr as u32;
                pushed.partition = logical.to_entry();
            }
        }

        mbr.write_into(&mut file).map_err(failed)?;

        if let Some(extended) = extended
            && self.logicals.is_empty()
        {
            // A stale chain would come back as logical partitions.
            let sector_size = device.geometry().sector_size as usize;
            let mut ebr = vec![0u8; sector_size];
            ebr[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2].copy_from_slice(&SIGNATURE);
            device.write_sectors(extended.range.start, &ebr)?;
        }

        let mut first = device.read_sectors(0, 1)?;
        first[..BOOT_CODE_LEN].copy_from_slice(&self.boot_code);
        device.write_sectors(0, &first)
    }

    fn partition(&self, slot: usize) -> Option<DosPartition> {
        if slot < PRIMARY_SLOTS {
            self.primaries[slot]
        } else {
            self.logicals.get(slot - PRIMARY_SLOTS).copied()
        }
    }

    fn partition_mut(&mut self, slot: usize) -> Option<&mut DosPartition> {
        if slot < PRIMARY_SLOTS {
            self.primaries[slot].as_mut()
        } else {
            self.logicals.get_mut(slot - PRIMARY_SLOTS)
        }
    }
}

fn missing(slot: usize) -> SysError {
    exception::throw(SysError::InvalidArgument(format!(
        "partition {} does not exist",
        slot + 1
    )))
}

/// Where each logical partition's EBR lives, in chain order
fn ebr_locations(extended: SectorRange, logicals: &[DosPartition]) -> Vec<u64> {
    if logicals.is_empty() {
        return vec![extended.start];
    }
    logicals
        .iter()
        .enumerate()
        .map(|(index, p)| {
            if index == 0 {
                extended.start
            } else {
                p.range.start.saturating_sub(1).max(extended.start)
            }
        })
        .collect()
}

/// Follow the EBR links of `extended` without decoding them. `mbrman`
/// trusts every link, so a chain that loops or leaves the container is
/// refused here first.
fn check_ebr_links(device: &Device, extended: SectorRange) -> Result<()> {
    let mut current = extended.start;
    let mut visited = Vec::new();

    loop {
        if visited.contains(&current) || visited.len() >= MAX_LOGICALS {
            return Err(exception::throw(SysError::CorruptLabel(format!(
                "extended boot record chain of '{}' loops",
                device.path()
            ))));
        }
        visited.push(current);

        let sector = device.read_sectors(current, 1)?;
        if sector[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2] != SIGNATURE {
            if current == extended.start {
                return Ok(());
            }
            return Err(exception::throw(SysError::CorruptLabel(format!(
                "invalid extended boot record at sector {} of '{}'",
                current,
                device.path()
            ))));
        }

        let link = RawSlot::peek(&sector, 1);
        if !link.is_used() || !is_extended_system(link.system) {
            return Ok(());
        }
        current = extended.start + link.start;
        if !extended.contains(current) {
            return Err(exception::throw(SysError::CorruptLabel(format!(
                "extended boot record link to sector {} leaves the extended partition of '{}'",
                current,
                device.path()
            ))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceOptions;

    const MIB_SECTORS: u64 = 2048;

    fn geometry(total_sectors: u64) -> Geometry {
        Geometry {
            sector_size: 512,
            physical_sector_size: 512,
            minimum_io_size: 512,
            optimal_io_size: 0,
            total_sectors,
        }
    }

    fn entry(kind: PartitionKind, start: u64, length: u64) -> NewEntry {
        NewEntry {
            kind,
            range: SectorRange::with_length(start, length),
            system: None,
        }
    }

    #[test]
    fn primaries_fill_slots_in_order() {
        let mut label = MsdosLabel::fresh(&geometry(100 * MIB_SECTORS));
        for i in 0..4 {
            let number = label
                .add(&entry(PartitionKind::NORMAL, (1 + i * 10) * MIB_SECTORS, MIB_SECTORS))
                .unwrap();
            assert_eq!(number, i as u32 + 1);
        }
        let err = label
            .add(&entry(PartitionKind::NORMAL, 60 * MIB_SECTORS, MIB_SECTORS))
            .unwrap_err();
        assert!(matches!(err, SysError::NoSlot(_)));
    }

    #[test]
    fn overlapping_primaries_are_refused() {
        let mut label = MsdosLabel::fresh(&geometry(100 * MIB_SECTORS));
        label
            .add(&entry(PartitionKind::NORMAL, MIB_SECTORS, 10 * MIB_SECTORS))
            .unwrap();
        let err = label
            .add(&entry(PartitionKind::NORMAL, 5 * MIB_SECTORS, MIB_SECTORS))
            .unwrap_err();
        assert!(matches!(err, SysError::Overlap(_)));
    }

    #[test]
    fn logicals_need_a_container_and_room_for_their_ebr() {
        let mut label = MsdosLabel::fresh(&geometry(100 * MIB_SECTORS));
        let err = label
            .add(&entry(PartitionKind::LOGICAL, 10 * MIB_SECTORS, MIB_SECTORS))
            .unwrap_err();
        assert!(matches!(err, SysError::Nesting(_)));

        label
            .add(&entry(PartitionKind::EXTENDED, 10 * MIB_SECTORS, 50 * MIB_SECTORS))
            .unwrap();
        let second_extended = label
            .add(&entry(PartitionKind::EXTENDED, 70 * MIB_SECTORS, MIB_SECTORS))
            .unwrap_err();
        assert!(matches!(second_extended, SysError::Nesting(_)));

        let first = label
            .add(&entry(PartitionKind::LOGICAL, 12 * MIB_SECTORS, MIB_SECTORS))
            .unwrap();
        assert_eq!(first, 5);

        // Starts right after the first logical: no sector left for its EBR.
        let err = label
            .add(&entry(PartitionKind::LOGICAL, 13 * MIB_SECTORS, MIB_SECTORS))
            .unwrap_err();
        assert!(matches!(err, SysError::Overlap(_)));

        let second = label
            .add(&entry(PartitionKind::LOGICAL, 13 * MIB_SECTORS + 1, MIB_SECTORS))
            .unwrap();
        assert_eq!(second, 6);
    }

    #[test]
    fn removing_the_extended_partition_drops_its_logicals() {
        let mut label = MsdosLabel::fresh(&geometry(100 * MIB_SECTORS));
        label
            .add(&entry(PartitionKind::EXTENDED, 10 * MIB_SECTORS, 50 * MIB_SECTORS))
            .unwrap();
        label
            .add(&entry(PartitionKind::LOGICAL, 12 * MIB_SECTORS, MIB_SECTORS))
            .unwrap();
        label.remove(0).unwrap();
        assert!(label.entries().is_empty());
        assert!(matches!(label.remove(0), Err(SysError::InvalidArgument(_))));
    }

    #[test]
    fn boot_flag_is_exclusive() {
        let mut label = MsdosLabel::fresh(&geometry(100 * MIB_SECTORS));
        label
            .add(&entry(PartitionKind::NORMAL, MIB_SECTORS, MIB_SECTORS))
            .unwrap();
        label
            .add(&entry(PartitionKind::NORMAL, 3 * MIB_SECTORS, MIB_SECTORS))
            .unwrap();
        label.set_flag(0, PartitionFlag::Boot, true).unwrap();
        label.set_flag(1, PartitionFlag::Boot, true).unwrap();

        let entries = label.entries();
        assert!(entries[0].flags.is_empty());
        assert_eq!(entries[1].flags, vec![PartitionFlag::Boot]);

        label.set_flag(1, PartitionFlag::Lvm, true).unwrap();
        assert_eq!(label.entries()[1].type_id, "0x8e");
        label.set_flag(1, PartitionFlag::Lvm, false).unwrap();
        assert_eq!(label.entries()[1].type_id, "0x83");

        assert!(matches!(
            label.set_flag(0, PartitionFlag::BiosGrub, true),
            Err(SysError::Unsupported(_))
        ));
        assert!(matches!(
            label.set_flag(0, PartitionFlag::Hidden, true),
            Err(SysError::Unsupported(_))
        ));
    }

    #[test]
    fn label_survives_a_write_and_read() {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(64 * 1024 * 1024).unwrap();
        let device = Device::open(file.path().to_str().unwrap(), DeviceOptions::default()).unwrap();

        let mut label = MsdosLabel::fresh(&device.geometry());
        label
            .add(&entry(PartitionKind::NORMAL, MIB_SECTORS, 8 * MIB_SECTORS))
            .unwrap();
        label
            .add(&entry(PartitionKind::EXTENDED, 10 * MIB_SECTORS, 40 * MIB_SECTORS))
            .unwrap();
        label
            .add(&entry(PartitionKind::LOGICAL, 12 * MIB_SECTORS, 4 * MIB_SECTORS))
            .unwrap();
        label
            .add(&entry(PartitionKind::LOGICAL, 20 * MIB_SECTORS, 4 * MIB_SECTORS))
            .unwrap();
        label.set_flag(0, PartitionFlag::Boot, true).unwrap();
        label.write(&device).unwrap();

        let read = MsdosLabel::read(&device).unwrap().expect("label present");
        assert_eq!(read.entries(), label.entries());
        assert_eq!(
            read.metadata(),
            vec![
                SectorRange::new(0, 0),
                SectorRange::new(10 * MIB_SECTORS, 10 * MIB_SECTORS),
                SectorRange::new(20 * MIB_SECTORS - 1, 20 * MIB_SECTORS - 1),
            ]
        );
    }

    fn raw_mbr(device: &Device, system: u8, start: u32, sectors: u32) {
        let mut sector = vec![0u8; 512];
        sector[446 + 4] = system;
        sector[446 + 8..446 + 12].copy_from_slice(&start.to_le_bytes());
        sector[446 + 12..446 + 16].copy_from_slice(&sectors.to_le_bytes());
        sector[510] = 0x55;
        sector[511] = 0xAA;
        device.write_sectors(0, &sector).unwrap();
    }

    #[test]
    fn extended_partition_at_sector_zero_is_corrupt() {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(8 * 1024 * 1024).unwrap();
        let device = Device::open(file.path().to_str().unwrap(), DeviceOptions::default()).unwrap();

        raw_mbr(&device, SYSTEM_EXTENDED, 0, 4096);
        assert!(matches!(
            MsdosLabel::read(&device),
            Err(SysError::CorruptLabel(_))
        ));
    }

    #[test]
    fn partitions_past_the_end_are_corrupt() {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(64 * 1024 * 1024).unwrap();
        let device = Device::open(file.path().to_str().unwrap(), DeviceOptions::default()).unwrap();

        raw_mbr(&device, SYSTEM_EXTENDED, 1_000_000, 2048);
        assert!(matches!(
            MsdosLabel::read(&device),
            Err(SysError::CorruptLabel(_))
        ));

        raw_mbr(&device, SYSTEM_LINUX, 2048, 4096);
        let label = MsdosLabel::read(&device).unwrap().expect("label present");
        assert_eq!(label.entries()[0].range, SectorRange::new(2048, 6143));
    }

    #[test]
    fn blank_devices_have_no_label() {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(1024 * 1024).unwrap();
        let device = Device::open(file.path().to_str().unwrap(), DeviceOptions::default()).unwrap();
        assert!(MsdosLabel::read(&device).unwrap().is_none());
    }
}
