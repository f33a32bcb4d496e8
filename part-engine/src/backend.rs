// SPDX-License-Identifier: GPL-3.0-only

//! The collaborator seam
//!
//! Everything the engine needs from a disk goes through [`DiskBackend`]. The
//! production implementation is [`part_sys::Disk`]; tests wrap it to inject
//! failures.

use part_sys::{Disk, LabelEntry, NewEntry, SysError};
use part_types::{DiskFlag, DiskFlags, Geometry, PartitionFlag, SectorRange, TableType};

type SysResult<T> = std::result::Result<T, SysError>;

pub trait DiskBackend: std::fmt::Debug {
    fn path(&self) -> &str;

    fn geometry(&self) -> Geometry;

    /// Whether a table was present when the device was opened
    fn has_label(&self) -> bool;

    /// Type of the staged table, if any
    fn table_type(&self) -> Option<TableType>;

    fn disk_flags(&self) -> DiskFlags;

    fn usable_range(&self) -> Option<SectorRange>;

    fn metadata(&self) -> Vec<SectorRange>;

    /// Real partitions of the staged table, ordered by start sector
    fn entries(&self) -> Vec<LabelEntry>;

    fn create_label(&mut self, table_type: TableType) -> SysResult<()>;

    /// Stage a new partition and return its number
    fn add_partition(&mut self, entry: &NewEntry) -> SysResult<u32>;

    fn delete_partition(&mut self, slot: usize) -> SysResult<()>;

    fn set_partition_flag(&mut self, slot: usize, flag: PartitionFlag, enabled: bool) -> SysResult<()>;

    fn commit_to_device(&mut self) -> SysResult<()>;

    fn commit_to_os(&mut self) -> SysResult<()>;

    fn partition_path(&self, number: u32) -> String;

    fn close(self: Box<Self>) -> SysResult<()>;
}

impl DiskBackend for Disk {
    fn path(&self) -> &str {
        Disk::path(self)
    }

    fn geometry(&self) -> Geometry {
        Disk::geometry(self)
    }

    fn has_label(&self) -> bool {
        Disk::has_label(self)
    }

    fn table_type(&self) -> Option<TableType> {
        Disk::table_type(self)
    }

    fn disk_flags(&self) -> DiskFlags {
        let flags = self.flags();
        if self.is_image() {
            flags | DiskFlag::ImageFile
        } else {
            flags
        }
    }

    fn usable_range(&self) -> Option<SectorRange> {
        self.label().map(|label| label.usable_range())
    }

    fn metadata(&self) -> Vec<SectorRange> {
        self.label().map(|label| label.metadata()).unwrap_or_default()
    }

    fn entries(&self) -> Vec<LabelEntry> {
        Disk::entries(self)
    }

    fn create_label(&mut self, table_type: TableType) -> SysResult<()> {
        Disk::create_label(self, table_type)
    }

    fn add_partition(&mut self, entry: &NewEntry) -> SysResult<u32> {
        Disk::add_partition(self, entry)
    }

    fn delete_partition(&mut self, slot: usize) -> SysResult<()> {
        Disk::delete_partition(self, slot)
    }

    fn set_partition_flag(&mut self, slot: usize, flag: PartitionFlag, enabled: bool) -> SysResult<()> {
        Disk::set_partition_flag(self, slot, flag, enabled)
    }

    fn commit_to_device(&mut self) -> SysResult<()> {
        Disk::commit_to_device(self)
    }

    fn commit_to_os(&mut self) -> SysResult<()> {
        Disk::commit_to_os(self)
    }

    fn partition_path(&self, number: u32) -> String {
        Disk::partition_path(self, number)
    }

    fn close(self: Box<Self>) -> SysResult<()> {
        Disk::close(*self)
    }
}
