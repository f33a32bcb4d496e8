// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for partition table management
//!
//! This crate defines the single source of truth for the types that cross
//! crate boundaries:
//!
//! - **part-sys**: reports device geometry with these types
//! - **part-engine**: plans and returns partitions with these types
//! - **part-cli**: prints these types as JSON
//!
//! Sizes and offsets are bytes at this level; only the engine's internals
//! work in sectors.

pub mod common;
pub mod disk;
pub mod partition;

pub use common::{
    DEFAULT_GRAIN_BYTES, Geometry, MIB, SectorRange, bytes_to_pretty, pretty_to_bytes,
};
pub use disk::{DiskFlag, DiskFlags, DiskSpec, TableType};
pub use partition::{
    AlignmentMode, PartitionFlag, PartitionKind, PartitionKindFlag, PartitionSpec,
    PartitionTypeRequest,
};
