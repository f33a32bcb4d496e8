// SPDX-License-Identifier: GPL-3.0-only

//! Partition placement
//!
//! Turns a request (kind, byte start, byte size, alignment) into a concrete
//! partition kind and sector range against a [`TableSnapshot`]. On MSDOS
//! tables a NEXT request is classified from the layout around its start; on a
//! disk with three primaries and no extended partition it first plans an
//! extended container reaching to the end of the free region and places the
//! partition as logical 2 MiB into it.

use part_types::{
    AlignmentMode, MIB, PartitionKind, PartitionTypeRequest, SectorRange, TableType,
    bytes_to_pretty,
};

use crate::alignment::{self, AlignedRequest};
use crate::error::{PartError, Result};
use crate::snapshot::TableSnapshot;

const MSDOS_PRIMARY_SLOTS: usize = 4;
/// Offset of the first logical partition inside a freshly planned extended container
const CONTAINER_LEAD_BYTES: u64 = 2 * MIB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementRequest {
    pub kind: PartitionTypeRequest,
    /// Bytes from the start of the disk
    pub start: u64,
    /// Bytes; 0 takes all remaining space
    pub size: u64,
    pub align: AlignmentMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedPartition {
    pub kind: PartitionKind,
    pub range: SectorRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Extended container to create and commit before the partition itself
    pub container: Option<SectorRange>,
    pub partition: PlannedPartition,
}

impl Plan {
    fn single(kind: PartitionKind, range: SectorRange) -> Self {
        Self {
            container: None,
            partition: PlannedPartition { kind, range },
        }
    }
}

pub fn plan(request: &PlacementRequest, snapshot: &TableSnapshot) -> Result<Plan> {
    let aligned = alignment::align_request(
        request.start,
        request.size,
        &snapshot.geometry,
        request.align,
    )?;

    let plan = match snapshot.table_type {
        TableType::Gpt => plan_gpt(request.kind, &aligned, snapshot)?,
        TableType::Msdos => plan_msdos(request.kind, &aligned, snapshot)?,
    };

    if let Some(container) = plan.container {
        tracing::debug!(
            "Planned extended container at sectors {}-{}",
            container.start,
            container.end
        );
    }
    tracing::debug!(
        "Planned {:?} request as {} partition at sectors {}-{}",
        request.kind,
        plan.partition.kind,
        plan.partition.range.start,
        plan.partition.range.end
    );
    Ok(plan)
}

fn plan_gpt(
    kind: PartitionTypeRequest,
    aligned: &AlignedRequest,
    snapshot: &TableSnapshot,
) -> Result<Plan> {
    if let Some(kind) = kind.explicit_kind()
        && !kind.is_normal()
    {
        return Err(PartError::InvalidInput(format!(
            "GPT partition tables have no {} partitions",
            kind
        )));
    }

    let start = aligned.start_sector;
    if let Some(host) = snapshot.host(start) {
        return Err(PartError::Capacity(format!(
            "Sector {} is already used by partition {}",
            start,
            host.number.unwrap_or_default()
        )));
    }

    let region = free_region(snapshot, start, false)?;
    Ok(Plan::single(
        PartitionKind::NORMAL,
        extent(start, region, aligned, snapshot)?,
    ))
}

fn plan_msdos(
    request: PartitionTypeRequest,
    aligned: &AlignedRequest,
    snapshot: &TableSnapshot,
) -> Result<Plan> {
    let start = aligned.start_sector;
    let extended = snapshot.extended();
    let primaries = snapshot.top_level_count();
    let host = snapshot.host(start);

    let kind = match request.explicit_kind() {
        Some(kind) => kind,
        None => match host {
            Some(host) if host.kind.is_extended() => PartitionKind::LOGICAL,
            Some(_) => {
                return Err(PartError::Placement(
                    "Cannot nest a partition inside a non-extended one".to_string(),
                ));
            }
            None if extended.is_some() => PartitionKind::NORMAL,
            None if primaries == MSDOS_PRIMARY_SLOTS - 1 => {
                return plan_with_container(start, aligned, snapshot);
            }
            None => PartitionKind::NORMAL,
        },
    };

    if kind.is_logical() {
        let Some(extended) = extended else {
            return Err(PartError::Placement(
                "There is no extended partition to hold a logical partition".to_string(),
            ));
        };
        if !extended.range.contains(start) {
            return Err(PartError::Placement(format!(
                "Sector {} is outside the extended partition (sectors {}-{})",
                start, extended.range.start, extended.range.end
            )));
        }
        if host.is_some_and(|h| !h.kind.is_extended()) {
            return Err(PartError::Placement(
                "Cannot nest a partition inside a non-extended one".to_string(),
            ));
        }

        let region = free_region(snapshot, start, true)?;
        // The sector in front of a logical partition holds its boot record.
        if start == region.start && region.start - 1 != extended.range.start {
            return Err(PartError::Capacity(format!(
                "No room for an extended boot record in front of sector {}",
                start
            )));
        }
        return Ok(Plan::single(kind, extent(start, region, aligned, snapshot)?));
    }

    if kind.is_extended() && extended.is_some() {
        return Err(PartError::Placement(
            "Only one extended partition is allowed on an msdos partition table".to_string(),
        ));
    }
    if let Some(host) = host {
        return Err(PartError::Placement(format!(
            "Cannot place a {} partition inside partition {}",
            kind,
            host.number.unwrap_or_default()
        )));
    }
    if primaries >= MSDOS_PRIMARY_SLOTS {
        return Err(PartError::Capacity(
            "No free primary partition slot left".to_string(),
        ));
    }

    let region = free_region(snapshot, start, false)?;
    let range = if kind.is_extended() && aligned.size_sectors == 0 {
        SectorRange::new(start, region.end)
    } else {
        extent(start, region, aligned, snapshot)?
    };
    Ok(Plan::single(kind, range))
}

fn plan_with_container(
    start: u64,
    aligned: &AlignedRequest,
    snapshot: &TableSnapshot,
) -> Result<Plan> {
    let region = free_region(snapshot, start, false)?;
    let lead = CONTAINER_LEAD_BYTES / snapshot.geometry.sector_size;
    let logical_start = start + lead;
    if logical_start > region.end {
        return Err(PartError::Capacity(format!(
            "Not enough free space at sector {} for an extended partition",
            start
        )));
    }

    let range = extent(
        logical_start,
        SectorRange::new(logical_start, region.end),
        aligned,
        snapshot,
    )?;
    Ok(Plan {
        container: Some(SectorRange::new(start, region.end)),
        partition: PlannedPartition {
            kind: PartitionKind::LOGICAL,
            range,
        },
    })
}

fn free_region(snapshot: &TableSnapshot, start: u64, logical: bool) -> Result<SectorRange> {
    snapshot.free_region(start, logical).ok_or_else(|| {
        PartError::Capacity(format!("Sector {} does not lie in free space", start))
    })
}

/// Range of the requested size at `start`, or the largest whole number of
/// grains that fits when the size is 0.
fn extent(
    start: u64,
    region: SectorRange,
    aligned: &AlignedRequest,
    snapshot: &TableSnapshot,
) -> Result<SectorRange> {
    let available = region.end - start + 1;
    let sector_size = snapshot.geometry.sector_size;

    let length = if aligned.size_sectors == 0 {
        let length = available / aligned.grain_sectors * aligned.grain_sectors;
        if length == 0 {
            return Err(PartError::Capacity(format!(
                "Only {} free at sector {}, less than one alignment grain",
                bytes_to_pretty(&(available * sector_size), false),
                start
            )));
        }
        length
    } else if aligned.size_sectors > available {
        return Err(PartError::InvalidInput(format!(
            "Requested size {} is larger than the {} available at sector {}",
            bytes_to_pretty(&(aligned.size_sectors * sector_size), false),
            bytes_to_pretty(&(available * sector_size), false),
            start
        )));
    } else {
        aligned.size_sectors
    };

    Ok(SectorRange::with_length(start, length))
}
