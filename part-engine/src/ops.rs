// SPDX-License-Identifier: GPL-3.0-only

//! Public operations
//!
//! Each operation opens its own [`DiskHandle`], stages changes through the
//! configured provider, commits and releases the device, reporting a
//! started/finished pair of progress events around the whole sequence.

use part_sys::DeviceOptions;
use part_types::{
    AlignmentMode, DiskSpec, PartitionFlag, PartitionSpec, PartitionTypeRequest, TableType,
};

use crate::config::EngineConfig;
use crate::diagnostics;
use crate::error::{PartError, Result};
use crate::handle::DiskHandle;
use crate::index;
use crate::planner::PlacementRequest;
use crate::progress::{Operation, ProgressReporter, TracingReporter};
use crate::provider::TableTypeProvider;

pub struct PartitionManager {
    config: EngineConfig,
    reporter: Box<dyn ProgressReporter>,
}

impl Default for PartitionManager {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for PartitionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PartitionManager {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_reporter(config, Box::new(TracingReporter))
    }

    pub fn with_reporter(config: EngineConfig, reporter: Box<dyn ProgressReporter>) -> Self {
        diagnostics::install();
        Self { config, reporter }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn provider(&self) -> &'static dyn TableTypeProvider {
        self.config.provider.implementation()
    }

    fn open(&self, disk: &str, options: DeviceOptions) -> Result<DiskHandle> {
        diagnostics::clear();
        DiskHandle::open(disk, options, self.config.errno_text)
    }

    /// Create a new, empty partition table on `disk`.
    ///
    /// Fails with [`PartError::ExistingTable`] when the disk already carries
    /// one and `ignore_existing` is false.
    pub fn create_table(&self, disk: &str, table_type: TableType, ignore_existing: bool) -> Result<()> {
        let operation = Operation::start(
            self.reporter.as_ref(),
            format!("Starting creation of a new partition table on '{}'", disk),
        );
        operation.finish(self.run_create_table(disk, table_type, ignore_existing))
    }

    fn run_create_table(&self, disk: &str, table_type: TableType, ignore_existing: bool) -> Result<()> {
        let mut handle = self.open(disk, self.config.write_options())?;
        if !ignore_existing && handle.has_existing_table()? {
            return Err(PartError::ExistingTable(format!(
                "Device '{}' already contains a partition table",
                disk
            )));
        }
        self.provider().create_table(&mut handle, table_type)?;
        handle.commit()
    }

    /// Create a partition and return it as it was committed.
    ///
    /// `start` and `size` are bytes; a `size` of 0 takes all free space
    /// available at the resolved start.
    pub fn create_partition(
        &self,
        disk: &str,
        kind: PartitionTypeRequest,
        start: u64,
        size: u64,
        align: AlignmentMode,
    ) -> Result<PartitionSpec> {
        let operation = Operation::start(
            self.reporter.as_ref(),
            format!("Started adding partition to '{}'", disk),
        );
        let request = PlacementRequest {
            kind,
            start,
            size,
            align,
        };
        operation.finish(self.run_create_partition(disk, &request))
    }

    fn run_create_partition(&self, disk: &str, request: &PlacementRequest) -> Result<PartitionSpec> {
        let mut handle = self.open(disk, self.config.write_options())?;
        let number = self.provider().add_partition(&mut handle, request)?;
        handle.commit()?;
        handle.partition(number)?.ok_or_else(|| {
            PartError::OperationFailed(format!(
                "Failed to find the new partition {} on device '{}'",
                number, disk
            ))
        })
    }

    pub fn delete_partition(&self, disk: &str, partition: &str) -> Result<()> {
        let operation = Operation::start(
            self.reporter.as_ref(),
            format!("Started deleting partition '{}'", partition),
        );
        operation.finish(self.run_delete_partition(disk, partition))
    }

    fn run_delete_partition(&self, disk: &str, partition: &str) -> Result<()> {
        // Bad paths are rejected before the device is touched.
        let slot = index::partition_slot(partition)?;
        let mut handle = self.open(disk, self.config.write_options())?;
        self.provider().delete_partition(&mut handle, slot)?;
        handle.commit()
    }

    pub fn set_partition_flag(
        &self,
        disk: &str,
        partition: &str,
        flag: PartitionFlag,
        enabled: bool,
    ) -> Result<()> {
        let operation = Operation::start(
            self.reporter.as_ref(),
            format!(
                "Started {} flag '{}' on partition '{}'",
                if enabled { "setting" } else { "clearing" },
                flag,
                partition
            ),
        );
        operation.finish(self.run_set_partition_flag(disk, partition, flag, enabled))
    }

    fn run_set_partition_flag(
        &self,
        disk: &str,
        partition: &str,
        flag: PartitionFlag,
        enabled: bool,
    ) -> Result<()> {
        let slot = index::partition_slot(partition)?;
        let mut handle = self.open(disk, self.config.write_options())?;
        self.provider().set_flag(&mut handle, slot, flag, enabled)?;
        handle.commit()
    }

    /// Describe `disk` and the partitions on it without changing anything.
    pub fn examine(&self, disk: &str) -> Result<DiskSpec> {
        let operation = Operation::start(
            self.reporter.as_ref(),
            format!("Started getting info about '{}'", disk),
        );
        let result = self
            .open(disk, DeviceOptions::read_only())
            .and_then(|handle| handle.describe());
        operation.finish(result)
    }
}

/// [`PartitionManager::create_table`] with the default configuration
pub fn create_table(disk: &str, table_type: TableType, ignore_existing: bool) -> Result<()> {
    PartitionManager::default().create_table(disk, table_type, ignore_existing)
}

/// [`PartitionManager::create_partition`] with the default configuration
pub fn create_partition(
    disk: &str,
    kind: PartitionTypeRequest,
    start: u64,
    size: u64,
    align: AlignmentMode,
) -> Result<PartitionSpec> {
    PartitionManager::default().create_partition(disk, kind, start, size, align)
}

pub fn delete_partition(disk: &str, partition: &str) -> Result<()> {
    PartitionManager::default().delete_partition(disk, partition)
}

pub fn set_partition_flag(
    disk: &str,
    partition: &str,
    flag: PartitionFlag,
    enabled: bool,
) -> Result<()> {
    PartitionManager::default().set_partition_flag(disk, partition, flag, enabled)
}

pub fn examine(disk: &str) -> Result<DiskSpec> {
    PartitionManager::default().examine(disk)
}
