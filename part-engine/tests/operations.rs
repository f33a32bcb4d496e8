// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end operations on sparse image files

use std::os::unix::fs::FileExt;
use std::sync::{Arc, Mutex};

use part_engine::{
    EngineConfig, ErrorKind, OperationEvent, PartitionManager, ProgressReporter, Provider,
};
use part_types::{
    AlignmentMode, DiskFlag, MIB, PartitionFlag, PartitionKind, PartitionTypeRequest, TableType,
};
use tempfile::TempDir;

const SECTOR: u64 = 512;

fn image(size: u64) -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(size).unwrap();
    (dir, path.to_string_lossy().into_owned())
}

fn manager() -> PartitionManager {
    PartitionManager::new(EngineConfig::default())
}

fn add(
    manager: &PartitionManager,
    disk: &str,
    kind: PartitionTypeRequest,
    start: u64,
    size: u64,
) -> part_engine::Result<part_types::PartitionSpec> {
    manager.create_partition(disk, kind, start, size, AlignmentMode::Optimal)
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<OperationEvent>>>);

impl ProgressReporter for Recorder {
    fn report(&self, event: &OperationEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

#[test]
fn blank_image_is_examined_as_an_image_without_table() {
    let (_dir, disk) = image(64 * MIB);
    let spec = manager().examine(&disk).unwrap();

    assert_eq!(spec.table_type, None);
    assert_eq!(spec.size, 64 * MIB);
    assert_eq!(spec.sector_size, SECTOR);
    assert!(spec.flags.contains(DiskFlag::ImageFile));
    assert!(spec.partitions.is_empty());
}

#[test]
fn missing_device_is_a_device_error() {
    let err = manager()
        .create_table("/nonexistent/disk.img", TableType::Msdos, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Device);
    assert_eq!(err.code(), 404);
    assert!(
        err.to_string()
            .starts_with("Device '/nonexistent/disk.img' invalid or not existing (")
    );
}

#[test]
fn existing_tables_are_kept_unless_ignored() {
    let (_dir, disk) = image(64 * MIB);
    let manager = manager();
    manager.create_table(&disk, TableType::Msdos, false).unwrap();
    add(&manager, &disk, PartitionTypeRequest::Normal, MIB, 8 * MIB).unwrap();

    let err = manager.create_table(&disk, TableType::Gpt, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExistingTable);
    assert_eq!(
        err.to_string(),
        format!("Device '{}' already contains a partition table", disk)
    );
    assert_eq!(manager.examine(&disk).unwrap().partitions.len(), 1);

    manager.create_table(&disk, TableType::Gpt, true).unwrap();
    let spec = manager.examine(&disk).unwrap();
    assert_eq!(spec.table_type, Some(TableType::Gpt));
    assert!(spec.partitions.is_empty());
}

/// Sector 0 with a single partition entry in slot 1
fn write_raw_mbr(disk: &str, system: u8, start: u32, sectors: u32) {
    let mut sector = [0u8; 512];
    sector[446 + 4] = system;
    sector[446 + 8..446 + 12].copy_from_slice(&start.to_le_bytes());
    sector[446 + 12..446 + 16].copy_from_slice(&sectors.to_le_bytes());
    sector[510] = 0x55;
    sector[511] = 0xAA;
    let file = std::fs::OpenOptions::new().write(true).open(disk).unwrap();
    file.write_all_at(&sector, 0).unwrap();
}

#[test]
fn damaged_table_can_be_replaced_on_request() {
    let (_dir, disk) = image(64 * MIB);
    write_raw_mbr(&disk, 0x05, 1_000_000, 2048);
    let manager = manager();

    let spec = manager.examine(&disk).unwrap();
    assert_eq!(spec.table_type, None);
    assert!(spec.partitions.is_empty());

    let err = manager.create_table(&disk, TableType::Msdos, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExistingTable);

    manager.create_table(&disk, TableType::Gpt, true).unwrap();
    let spec = manager.examine(&disk).unwrap();
    assert_eq!(spec.table_type, Some(TableType::Gpt));
    assert!(spec.partitions.is_empty());
}

#[test]
fn extended_entry_at_sector_zero_is_refused_without_panicking() {
    let (_dir, disk) = image(64 * MIB);
    write_raw_mbr(&disk, 0x05, 0, 4096);
    let manager = manager();

    let err = add(&manager, &disk, PartitionTypeRequest::Next, 8 * MIB, MIB).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationFailed);
    assert_eq!(manager.examine(&disk).unwrap().table_type, None);
}

#[test]
fn msdos_over_gpt_no_longer_reads_as_gpt() {
    let (_dir, disk) = image(64 * MIB);
    let manager = manager();
    manager.create_table(&disk, TableType::Gpt, false).unwrap();
    manager.create_table(&disk, TableType::Msdos, true).unwrap();
    assert_eq!(
        manager.examine(&disk).unwrap().table_type,
        Some(TableType::Msdos)
    );
}

#[test]
fn created_partitions_are_aligned_and_reported_in_bytes() {
    let (_dir, disk) = image(64 * MIB);
    let manager = manager();
    manager.create_table(&disk, TableType::Msdos, false).unwrap();

    // The size is floored to the 1 MiB grain.
    let partition = add(
        &manager,
        &disk,
        PartitionTypeRequest::Normal,
        MIB,
        10 * MIB + 300 * 1024,
    )
    .unwrap();

    assert_eq!(partition.number, 1);
    assert_eq!(partition.kind, PartitionKind::NORMAL);
    assert_eq!(partition.start, MIB);
    assert_eq!(partition.size, 10 * MIB);
    assert_eq!(partition.path, format!("{}1", disk));
    assert_eq!(partition.type_id, "0x83");
}

#[test]
fn fourth_next_request_gets_an_extended_container() {
    let (_dir, disk) = image(64 * MIB);
    let manager = manager();
    manager.create_table(&disk, TableType::Msdos, false).unwrap();
    for i in 0..3 {
        let partition = add(
            &manager,
            &disk,
            PartitionTypeRequest::Next,
            MIB + i * 10 * MIB,
            10 * MIB,
        )
        .unwrap();
        assert_eq!(partition.kind, PartitionKind::NORMAL);
    }

    let logical = add(&manager, &disk, PartitionTypeRequest::Next, 31 * MIB, 0).unwrap();
    assert_eq!(logical.kind, PartitionKind::LOGICAL);
    assert_eq!(logical.number, 5);
    assert_eq!(logical.start, 33 * MIB);
    // Everything to the last sector, floored to the grain.
    assert_eq!(logical.size, 31 * MIB);

    let spec = manager.examine(&disk).unwrap();
    let extended = spec
        .partitions
        .iter()
        .find(|p| p.kind.is_extended())
        .unwrap();
    assert_eq!(extended.number, 4);
    assert_eq!(extended.start, 31 * MIB);
    assert_eq!(extended.end(), 64 * MIB);
    assert!(extended.start < logical.start && logical.end() <= extended.end());
}

#[test]
fn next_inside_the_extended_partition_becomes_logical() {
    let (_dir, disk) = image(64 * MIB);
    let manager = manager();
    manager.create_table(&disk, TableType::Msdos, false).unwrap();
    add(&manager, &disk, PartitionTypeRequest::Extended, MIB, 0).unwrap();

    let first = add(&manager, &disk, PartitionTypeRequest::Next, 2 * MIB, 8 * MIB).unwrap();
    let second = add(&manager, &disk, PartitionTypeRequest::Next, 12 * MIB, 8 * MIB).unwrap();
    assert_eq!(first.kind, PartitionKind::LOGICAL);
    assert_eq!(second.kind, PartitionKind::LOGICAL);
    assert_eq!((first.number, second.number), (5, 6));

    let spec = manager.examine(&disk).unwrap();
    assert_eq!(spec.partitions.len(), 3);
}

#[test]
fn placement_rules_are_enforced() {
    let (_dir, disk) = image(64 * MIB);
    let manager = manager();
    manager.create_table(&disk, TableType::Msdos, false).unwrap();

    let err = add(&manager, &disk, PartitionTypeRequest::Logical, MIB, 4 * MIB).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Placement);

    add(&manager, &disk, PartitionTypeRequest::Normal, MIB, 10 * MIB).unwrap();
    let err = add(&manager, &disk, PartitionTypeRequest::Next, 2 * MIB, MIB).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Placement);
    assert_eq!(
        err.to_string(),
        "Cannot nest a partition inside a non-extended one"
    );

    add(&manager, &disk, PartitionTypeRequest::Extended, 20 * MIB, 10 * MIB).unwrap();
    let err = add(&manager, &disk, PartitionTypeRequest::Extended, 40 * MIB, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Placement);

    // A logical outside the extended partition
    let err = add(&manager, &disk, PartitionTypeRequest::Logical, 40 * MIB, MIB).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Placement);

    // Failed requests leave the table as it was.
    assert_eq!(manager.examine(&disk).unwrap().partitions.len(), 2);
}

#[test]
fn oversized_requests_are_rejected() {
    let (_dir, disk) = image(64 * MIB);
    let manager = manager();
    manager.create_table(&disk, TableType::Msdos, false).unwrap();

    let err = add(&manager, &disk, PartitionTypeRequest::Normal, MIB, 128 * MIB).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = add(&manager, &disk, PartitionTypeRequest::Normal, MIB, 1000).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn gpt_fills_free_space_and_refuses_msdos_kinds() {
    let (_dir, disk) = image(64 * MIB);
    let manager = manager();
    manager.create_table(&disk, TableType::Gpt, false).unwrap();

    let err = add(&manager, &disk, PartitionTypeRequest::Extended, MIB, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let partition = add(&manager, &disk, PartitionTypeRequest::Next, MIB, 0).unwrap();
    assert_eq!(partition.kind, PartitionKind::NORMAL);
    assert_eq!(partition.start, MIB);
    assert_eq!(partition.size % MIB, 0);
    // The backup header and entry array live in the last 33 sectors.
    assert!(partition.end() <= 64 * MIB - 33 * SECTOR);

    let err = add(&manager, &disk, PartitionTypeRequest::Normal, 4 * MIB, MIB).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Capacity);
}

#[test]
fn flags_and_deletion_round_trip() {
    let (_dir, disk) = image(64 * MIB);
    let manager = manager();
    manager.create_table(&disk, TableType::Msdos, false).unwrap();
    let first = add(&manager, &disk, PartitionTypeRequest::Normal, MIB, 8 * MIB).unwrap();
    add(&manager, &disk, PartitionTypeRequest::Normal, 10 * MIB, 8 * MIB).unwrap();

    manager
        .set_partition_flag(&disk, &first.path, PartitionFlag::Boot, true)
        .unwrap();
    let spec = manager.examine(&disk).unwrap();
    assert!(spec.partitions[0].has_flag(PartitionFlag::Boot));
    assert!(!spec.partitions[1].has_flag(PartitionFlag::Boot));

    manager
        .set_partition_flag(&disk, &first.path, PartitionFlag::Boot, false)
        .unwrap();
    assert!(
        !manager.examine(&disk).unwrap().partitions[0].has_flag(PartitionFlag::Boot)
    );

    manager.delete_partition(&disk, &first.path).unwrap();
    let spec = manager.examine(&disk).unwrap();
    assert_eq!(spec.partitions.len(), 1);
    assert_eq!(spec.partitions[0].number, 2);
}

#[test]
fn bad_partition_paths_are_rejected_before_opening() {
    let manager = manager();
    for path in ["/dev/sdx0", "/dev/sdx", "/dev/sdx-2"] {
        let err = manager.delete_partition("/nonexistent", path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{path}");
        assert!(err.to_string().contains(path));
    }
}

#[test]
fn basic_provider_takes_explicit_kinds_only() {
    let (_dir, disk) = image(64 * MIB);
    let manager = PartitionManager::new(EngineConfig {
        provider: Provider::Basic,
        ..EngineConfig::default()
    });
    manager.create_table(&disk, TableType::Msdos, false).unwrap();

    let err = add(&manager, &disk, PartitionTypeRequest::Next, MIB, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    // Sector alignment only: an odd size survives and size 0 runs to the last sector.
    let odd = add(&manager, &disk, PartitionTypeRequest::Normal, MIB, MIB + SECTOR).unwrap();
    assert_eq!(odd.size, MIB + SECTOR);
    let rest = add(&manager, &disk, PartitionTypeRequest::Normal, 4 * MIB, 0).unwrap();
    assert_eq!(rest.end(), 64 * MIB);
}

#[test]
fn operations_report_started_and_finished() {
    let (_dir, disk) = image(64 * MIB);
    let recorder = Recorder::default();
    let manager = PartitionManager::with_reporter(EngineConfig::default(), Box::new(recorder.clone()));

    manager.create_table(&disk, TableType::Msdos, false).unwrap();
    let err = manager.create_table(&disk, TableType::Msdos, false).unwrap_err();

    let events = recorder.0.lock().unwrap();
    assert_eq!(events.len(), 4);
    match (&events[0], &events[1]) {
        (
            OperationEvent::Started { id, message },
            OperationEvent::Finished {
                id: finished,
                message: outcome,
                success: true,
            },
        ) => {
            assert_eq!(id, finished);
            assert_eq!(
                message,
                &format!("Starting creation of a new partition table on '{}'", disk)
            );
            assert_eq!(outcome, "Completed");
        }
        other => panic!("unexpected events {other:?}"),
    }
    match &events[3] {
        OperationEvent::Finished {
            message,
            success: false,
            ..
        } => assert_eq!(message, &err.to_string()),
        other => panic!("unexpected event {other:?}"),
    }
}
