// SPDX-License-Identifier: GPL-3.0-only

//! Point-in-time view of a partition table
//!
//! A snapshot lists the real partitions together with synthetic entries for
//! free space and label metadata, ordered by start sector. Regions inside an
//! MSDOS extended partition carry the LOGICAL bit. The sector holding each
//! logical partition's extended boot record is reported as metadata, so free
//! regions never include it.

use part_sys::LabelEntry;
use part_types::{Geometry, PartitionKind, SectorRange, TableType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Partition number, `None` for synthetic entries
    pub number: Option<u32>,
    pub kind: PartitionKind,
    pub range: SectorRange,
}

impl SnapshotEntry {
    fn synthetic(kind: PartitionKind, range: SectorRange) -> Self {
        Self {
            number: None,
            kind,
            range,
        }
    }

    pub fn is_real(&self) -> bool {
        !self.kind.is_synthetic()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    pub table_type: TableType,
    pub geometry: Geometry,
    pub usable: SectorRange,
    entries: Vec<SnapshotEntry>,
}

/// Split `outer` around the sorted, non-overlapping `taken` ranges.
fn gaps(outer: SectorRange, taken: &[SectorRange]) -> Vec<SectorRange> {
    let mut gaps = Vec::new();
    let mut cursor = outer.start;
    for range in taken {
        if range.end < cursor || range.start > outer.end {
            continue;
        }
        if range.start > cursor {
            gaps.push(SectorRange::new(cursor, range.start - 1));
        }
        cursor = cursor.max(range.end + 1);
        if cursor > outer.end {
            return gaps;
        }
    }
    gaps.push(SectorRange::new(cursor, outer.end));
    gaps
}

impl TableSnapshot {
    pub fn build(
        table_type: TableType,
        geometry: Geometry,
        usable: SectorRange,
        metadata: &[SectorRange],
        partitions: &[LabelEntry],
    ) -> Self {
        let mut entries: Vec<SnapshotEntry> = partitions
            .iter()
            .map(|p| SnapshotEntry {
                number: Some(p.number),
                kind: p.kind,
                range: p.range,
            })
            .collect();

        let extended = partitions.iter().find(|p| p.kind.is_extended()).map(|p| p.range);

        // Metadata outside the extended partition is top level, inside it is logical.
        for range in metadata {
            let inside = extended.is_some_and(|ext| ext.encloses(range));
            let kind = if inside {
                PartitionKind::METADATA | PartitionKind::LOGICAL
            } else {
                PartitionKind::METADATA
            };
            entries.push(SnapshotEntry::synthetic(kind, *range));
        }

        if let Some(ext) = extended {
            // Every logical partition needs the sector before it for its EBR.
            for logical in partitions.iter().filter(|p| p.kind.is_logical()) {
                let Some(ebr) = logical.range.start.checked_sub(1) else {
                    continue;
                };
                if ebr > ext.start && !metadata.iter().any(|m| m.contains(ebr)) {
                    entries.push(SnapshotEntry::synthetic(
                        PartitionKind::METADATA | PartitionKind::LOGICAL,
                        SectorRange::new(ebr, ebr),
                    ));
                }
            }
            if !metadata.iter().any(|m| m.contains(ext.start)) {
                entries.push(SnapshotEntry::synthetic(
                    PartitionKind::METADATA | PartitionKind::LOGICAL,
                    SectorRange::new(ext.start, ext.start),
                ));
            }
        }

        let mut top_taken: Vec<SectorRange> = entries
            .iter()
            .filter(|e| e.kind.is_top_level() || (e.kind.is_metadata() && !e.kind.is_logical()))
            .map(|e| e.range)
            .collect();
        top_taken.sort_by_key(|r| r.start);
        for gap in gaps(usable, &top_taken) {
            entries.push(SnapshotEntry::synthetic(PartitionKind::FREESPACE, gap));
        }

        if let Some(ext) = extended {
            let mut inner_taken: Vec<SectorRange> = entries
                .iter()
                .filter(|e| e.kind.is_logical())
                .map(|e| e.range)
                .collect();
            inner_taken.sort_by_key(|r| r.start);
            for gap in gaps(ext, &inner_taken) {
                entries.push(SnapshotEntry::synthetic(
                    PartitionKind::FREESPACE | PartitionKind::LOGICAL,
                    gap,
                ));
            }
        }

        entries.sort_by_key(|e| (e.range.start, e.kind.is_logical(), e.range.end));

        Self {
            table_type,
            geometry,
            usable,
            entries,
        }
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn partitions(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.iter().filter(|e| e.is_real())
    }

    pub fn extended(&self) -> Option<&SnapshotEntry> {
        self.partitions().find(|e| e.kind.is_extended())
    }

    /// Number of real partitions occupying top-level slots
    pub fn top_level_count(&self) -> usize {
        self.partitions().filter(|e| e.kind.is_top_level()).count()
    }

    /// The innermost real partition containing `sector`
    pub fn host(&self, sector: u64) -> Option<&SnapshotEntry> {
        let mut hosts = self.partitions().filter(|e| e.range.contains(sector));
        let first = hosts.next()?;
        Some(hosts.find(|e| e.kind.is_logical()).unwrap_or(first))
    }

    /// Free region containing `sector`, top level or inside the extended partition
    pub fn free_region(&self, sector: u64, logical: bool) -> Option<SectorRange> {
        self.entries
            .iter()
            .find(|e| {
                e.kind.is_free_space() && e.kind.is_logical() == logical && e.range.contains(sector)
            })
            .map(|e| e.range)
    }
}
