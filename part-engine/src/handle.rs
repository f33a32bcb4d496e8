// SPDX-License-Identifier: GPL-3.0-only

//! Scoped access to one disk
//!
//! A [`DiskHandle`] lives for a single logical operation. All mutations are
//! staged on the backend until [`DiskHandle::commit`]; dropping the handle
//! releases the device, and a failure to do so is only logged.

use part_sys::{DeviceOptions, Disk, LabelEntry, NewEntry};
use part_types::{
    DiskSpec, Geometry, PartitionFlag, PartitionKind, PartitionSpec, SectorRange,
    TableType,
};

use crate::backend::DiskBackend;
use crate::commit;
use crate::diagnostics::{self, ErrnoText};
use crate::error::{PartError, Result};
use crate::snapshot::TableSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Idle,
    Committing,
}

#[derive(Debug)]
pub struct DiskHandle {
    backend: Option<Box<dyn DiskBackend>>,
    path: String,
    state: HandleState,
    errno_text: ErrnoText,
}

impl DiskHandle {
    /// Open and claim `path`. Succeeds on disks without a partition table.
    pub fn open(path: &str, options: DeviceOptions, errno_text: ErrnoText) -> Result<Self> {
        diagnostics::install();
        let disk = Disk::open(path, options).map_err(|e| {
            diagnostics::translate(
                e,
                &format!("Device '{}' invalid or not existing", path),
                errno_text,
            )
        })?;
        Ok(Self::with_backend(Box::new(disk), errno_text))
    }

    pub fn with_backend(backend: Box<dyn DiskBackend>, errno_text: ErrnoText) -> Self {
        Self {
            path: backend.path().to_string(),
            backend: Some(backend),
            state: HandleState::Idle,
            errno_text,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn errno_text(&self) -> ErrnoText {
        self.errno_text
    }

    pub fn geometry(&self) -> Result<Geometry> {
        Ok(self.backend()?.geometry())
    }

    pub fn has_existing_table(&self) -> Result<bool> {
        Ok(self.backend()?.has_label())
    }

    pub fn table_type(&self) -> Result<Option<TableType>> {
        Ok(self.backend()?.table_type())
    }

    /// Fresh view of the staged table
    pub fn snapshot(&self) -> Result<TableSnapshot> {
        let backend = self.backend()?;
        let (Some(table_type), Some(usable)) = (backend.table_type(), backend.usable_range())
        else {
            return Err(PartError::OperationFailed(format!(
                "Device '{}' has no partition table",
                self.path
            )));
        };
        Ok(TableSnapshot::build(
            table_type,
            backend.geometry(),
            usable,
            &backend.metadata(),
            &backend.entries(),
        ))
    }

    pub fn create_table(&mut self, table_type: TableType) -> Result<()> {
        let errno_text = self.errno_text;
        let path = self.path.clone();
        self.backend_mut()?.create_label(table_type).map_err(|e| {
            let err = diagnostics::translate(
                e,
                &format!(
                    "Failed to create a new partition table of type '{}' on device '{}'",
                    table_type, path
                ),
                errno_text,
            );
            PartError::OperationFailed(err.to_string())
        })
    }

    /// Stage a partition of `kind` covering `range`; returns its number.
    pub fn add_partition(&mut self, kind: PartitionKind, range: SectorRange) -> Result<u32> {
        let errno_text = self.errno_text;
        let prefix = format!("Failed to add partition to device '{}'", self.path);
        let number = self
            .backend_mut()?
            .add_partition(&NewEntry::new(kind, range))
            .map_err(|e| diagnostics::translate(e, &prefix, errno_text))?;
        tracing::debug!(
            "Staged {} partition {} at sectors {}-{} on {}",
            kind,
            number,
            range.start,
            range.end,
            self.path
        );
        Ok(number)
    }

    /// Remove the partition in 0-based `slot`
    pub fn delete_partition(&mut self, slot: usize) -> Result<()> {
        let errno_text = self.errno_text;
        let prefix = format!(
            "Failed to delete partition {} on device '{}'",
            slot + 1,
            self.path
        );
        self.backend_mut()?
            .delete_partition(slot)
            .map_err(|e| diagnostics::translate(e, &prefix, errno_text))
    }

    pub fn set_flag(&mut self, slot: usize, flag: PartitionFlag, enabled: bool) -> Result<()> {
        let errno_text = self.errno_text;
        let prefix = format!(
            "Failed to set flag '{}' on partition {} of device '{}'",
            flag,
            slot + 1,
            self.path
        );
        self.backend_mut()?
            .set_partition_flag(slot, flag, enabled)
            .map_err(|e| diagnostics::translate(e, &prefix, errno_text))
    }

    /// Write staged changes to the device, then notify the kernel.
    pub fn commit(&mut self) -> Result<()> {
        if self.state == HandleState::Committing {
            return Err(PartError::OperationFailed(format!(
                "A commit on '{}' is already in progress",
                self.path
            )));
        }

        let errno_text = self.errno_text;
        self.state = HandleState::Committing;
        let result = match self.backend.as_deref_mut() {
            Some(backend) => commit::run(backend, errno_text),
            None => Err(self.closed()),
        };
        self.state = HandleState::Idle;
        result
    }

    /// Describe partition `number` of the staged table
    pub fn partition(&self, number: u32) -> Result<Option<PartitionSpec>> {
        let backend = self.backend()?;
        Ok(backend
            .entries()
            .into_iter()
            .find(|e| e.number == number)
            .map(|e| partition_spec(backend, e)))
    }

    pub fn describe(&self) -> Result<DiskSpec> {
        let backend = self.backend()?;
        let geometry = backend.geometry();
        Ok(DiskSpec {
            path: self.path.clone(),
            table_type: backend.table_type(),
            size: geometry.size(),
            sector_size: geometry.sector_size,
            flags: backend.disk_flags(),
            partitions: backend
                .entries()
                .into_iter()
                .map(|e| partition_spec(backend, e))
                .collect(),
        })
    }

    /// Release the device now; [`Drop`] does the same.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(backend) = self.backend.take()
            && let Err(e) = backend.close()
        {
            tracing::warn!("Failed to close and sync the device {}: {}", self.path, e);
        }
    }

    fn backend(&self) -> Result<&dyn DiskBackend> {
        self.backend.as_deref().ok_or_else(|| self.closed())
    }

    fn backend_mut(&mut self) -> Result<&mut (dyn DiskBackend + 'static)> {
        if self.state == HandleState::Committing {
            return Err(PartError::OperationFailed(format!(
                "Cannot stage changes on '{}' while a commit is in progress",
                self.path
            )));
        }
        match self.backend.as_deref_mut() {
            Some(backend) => Ok(backend),
            None => Err(PartError::Device(format!(
                "Device '{}' is no longer open",
                self.path
            ))),
        }
    }

    fn closed(&self) -> PartError {
        PartError::Device(format!("Device '{}' is no longer open", self.path))
    }
}

fn partition_spec(backend: &dyn DiskBackend, entry: LabelEntry) -> PartitionSpec {
    let sector_size = backend.geometry().sector_size;
    PartitionSpec {
        path: backend.partition_path(entry.number),
        number: entry.number,
        kind: entry.kind,
        start: entry.range.start * sector_size,
        size: entry.range.length() * sector_size,
        flags: entry.flags,
        name: entry.name,
        type_id: entry.type_id,
    }
}

impl Drop for DiskHandle {
    fn drop(&mut self) {
        self.release();
    }
}
