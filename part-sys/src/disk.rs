// SPDX-License-Identifier: GPL-3.0-only

//! An opened device together with its staged label
//!
//! Every mutation edits the in-memory label only. [`Disk::commit_to_device`]
//! writes it out and [`Disk::commit_to_os`] tells the kernel about it.

use part_types::{DiskFlags, Geometry, PartitionFlag, TableType};

use crate::device::{Device, DeviceKind, DeviceOptions};
use crate::error::{Result, SysError};
use crate::exception;
use crate::label::{Label, LabelEntry, NewEntry};

const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";

#[derive(Debug)]
pub struct Disk {
    device: Device,
    found_label: bool,
    label: Option<Label>,
}

impl Disk {
    pub fn open(path: &str, options: DeviceOptions) -> Result<Self> {
        let device = Device::open(path, options)?;
        let (found_label, label) = match Label::read(&device) {
            Ok(label) => (label.is_some(), label),
            // A damaged label still counts as existing, so it is only replaced on request.
            Err(err @ (SysError::CorruptLabel(_) | SysError::OutOfRange(_))) => {
                let proceed = exception::warn(format!(
                    "The partition table of '{}' is damaged and was not loaded ({}).",
                    path, err
                ));
                if !proceed {
                    return Err(err);
                }
                (true, None)
            }
            Err(err) => return Err(err),
        };
        if let Some(label) = &label {
            tracing::debug!("{} carries a {} label", path, label.table_type());
        }
        Ok(Self {
            device,
            found_label,
            label,
        })
    }

    pub fn path(&self) -> &str {
        self.device.path()
    }

    pub fn geometry(&self) -> Geometry {
        self.device.geometry()
    }

    pub fn is_image(&self) -> bool {
        self.device.kind() == DeviceKind::Image
    }

    /// Whether a label was found on the device when it was opened
    pub fn has_label(&self) -> bool {
        self.found_label
    }

    pub fn label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    pub fn table_type(&self) -> Option<TableType> {
        self.label.as_ref().map(Label::table_type)
    }

    pub fn flags(&self) -> DiskFlags {
        self.label
            .as_ref()
            .map(Label::flags)
            .unwrap_or_else(DiskFlags::empty)
    }

    pub fn entries(&self) -> Vec<LabelEntry> {
        self.label.as_ref().map(Label::entries).unwrap_or_default()
    }

    /// Stage a fresh, empty label, replacing whatever was staged before.
    pub fn create_label(&mut self, table_type: TableType) -> Result<()> {
        self.label = Some(Label::fresh(table_type, &self.device.geometry())?);
        Ok(())
    }

    pub fn add_partition(&mut self, entry: &NewEntry) -> Result<u32> {
        self.label_mut()?.add(entry)
    }

    /// Remove the partition in 0-based `slot`
    pub fn delete_partition(&mut self, slot: usize) -> Result<()> {
        self.label_mut()?.remove(slot)
    }

    pub fn set_partition_flag(&mut self, slot: usize, flag: PartitionFlag, enabled: bool) -> Result<()> {
        self.label_mut()?.set_flag(slot, flag, enabled)
    }

    /// Write the staged label to the device and flush it
    pub fn commit_to_device(&self) -> Result<()> {
        let label = self.label.as_ref().ok_or_else(|| self.no_label())?;

        if label.table_type() == TableType::Msdos {
            self.wipe_gpt_headers()?;
        }
        label.write(&self.device)?;
        self.device.sync()
    }

    /// Ask the kernel to re-read the partition table
    pub fn commit_to_os(&self) -> Result<()> {
        self.device.reread_partitions()
    }

    /// Device node of partition `number`, e.g. "/dev/sda1" or "/dev/nvme0n1p1"
    pub fn partition_path(&self, number: u32) -> String {
        partition_path(self.device.path(), number)
    }

    pub fn close(self) -> Result<()> {
        self.device.close()
    }

    fn label_mut(&mut self) -> Result<&mut Label> {
        match self.label.as_mut() {
            Some(label) => Ok(label),
            None => Err(exception::throw(SysError::NoLabel(
                self.device.path().to_string(),
            ))),
        }
    }

    fn no_label(&self) -> SysError {
        exception::throw(SysError::NoLabel(self.device.path().to_string()))
    }

    /// Leftover GPT headers would make the disk read as GPT again.
    fn wipe_gpt_headers(&self) -> Result<()> {
        let geometry = self.device.geometry();
        let zero = vec![0u8; geometry.sector_size as usize];
        for lba in [1, geometry.total_sectors - 1] {
            if lba == 0 {
                continue;
            }
            let sector = self.device.read_sectors(lba, 1)?;
            if &sector[0..8] == GPT_SIGNATURE {
                tracing::debug!("Wiping stale GPT header at LBA {} of {}", lba, self.path());
                self.device.write_sectors(lba, &zero)?;
            }
        }
        Ok(())
    }
}

pub fn partition_path(disk_path: &str, number: u32) -> String {
    if disk_path.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{disk_path}p{number}")
    } else {
        format!("{disk_path}{number}")
    }
}
