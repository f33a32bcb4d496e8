// SPDX-License-Identifier: GPL-3.0-only

//! Table-type providers
//!
//! A provider decides how staged mutations are derived from a request. Both
//! variants share the same handle, error taxonomy and commit semantics; they
//! differ in how a new partition is placed.

use std::str::FromStr;

use part_types::{AlignmentMode, PartitionFlag, PartitionKind, SectorRange, TableType};
use serde::{Deserialize, Serialize};

use crate::alignment;
use crate::error::{PartError, Result};
use crate::handle::DiskHandle;
use crate::planner::{self, PlacementRequest};

pub trait TableTypeProvider: Sync {
    fn name(&self) -> &'static str;

    fn create_table(&self, handle: &mut DiskHandle, table_type: TableType) -> Result<()> {
        handle.create_table(table_type)
    }

    /// Stage a new partition and return its number
    fn add_partition(&self, handle: &mut DiskHandle, request: &PlacementRequest) -> Result<u32>;

    fn delete_partition(&self, handle: &mut DiskHandle, slot: usize) -> Result<()> {
        handle.delete_partition(slot)
    }

    fn set_flag(
        &self,
        handle: &mut DiskHandle,
        slot: usize,
        flag: PartitionFlag,
        enabled: bool,
    ) -> Result<()> {
        handle.set_flag(slot, flag, enabled)
    }
}

/// Explicit kinds only, sector alignment only, no kind inference.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicProvider;

impl TableTypeProvider for BasicProvider {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn add_partition(&self, handle: &mut DiskHandle, request: &PlacementRequest) -> Result<u32> {
        let Some(kind) = request.kind.explicit_kind() else {
            return Err(PartError::InvalidInput(
                "The basic provider cannot infer a partition type; ask for normal, logical or extended".to_string(),
            ));
        };

        let snapshot = handle.snapshot()?;
        let aligned = alignment::align_request(
            request.start,
            request.size,
            &snapshot.geometry,
            AlignmentMode::None,
        )?;

        let range = if aligned.size_sectors == 0 {
            let region = snapshot
                .free_region(aligned.start_sector, kind.is_logical())
                .ok_or_else(|| {
                    PartError::Capacity(format!(
                        "Sector {} does not lie in free space",
                        aligned.start_sector
                    ))
                })?;
            SectorRange::new(aligned.start_sector, region.end)
        } else {
            SectorRange::with_length(aligned.start_sector, aligned.size_sectors)
        };

        handle.add_partition(kind, range)
    }
}

/// Geometry-aware placement through the planner.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullProvider;

impl TableTypeProvider for FullProvider {
    fn name(&self) -> &'static str {
        "full"
    }

    fn add_partition(&self, handle: &mut DiskHandle, request: &PlacementRequest) -> Result<u32> {
        let snapshot = handle.snapshot()?;
        let plan = planner::plan(request, &snapshot)?;

        if let Some(container) = plan.container {
            handle.add_partition(PartitionKind::EXTENDED, container)?;
            handle.commit()?;
        }

        handle.add_partition(plan.partition.kind, plan.partition.range)
    }
}

/// Which provider drives a disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Basic,
    #[default]
    Full,
}

impl Provider {
    pub fn implementation(self) -> &'static dyn TableTypeProvider {
        match self {
            Self::Basic => &BasicProvider,
            Self::Full => &FullProvider,
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "full" => Ok(Self::Full),
            _ => Err(format!("Invalid provider: {s}. Must be 'basic' or 'full'")),
        }
    }
}
