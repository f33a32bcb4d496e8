// SPDX-License-Identifier: GPL-3.0-only

//! Partition table planning and mutation
//!
//! The engine decides where a new partition may go, aligns it to the device
//! and commits the result in two ordered phases: the device first, then the
//! kernel. Disk access goes through [`backend::DiskBackend`], implemented
//! for real devices by `part-sys`.
//!
//! Operations are synchronous. Callers serialize access per device.

pub mod alignment;
pub mod backend;
mod commit;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod handle;
pub mod index;
pub mod ops;
pub mod planner;
pub mod progress;
pub mod provider;
pub mod snapshot;

pub use backend::DiskBackend;
pub use config::EngineConfig;
pub use diagnostics::ErrnoText;
pub use error::{CommitStage, ErrorKind, ErrorReport, PartError, Result};
pub use handle::{DiskHandle, HandleState};
pub use ops::{
    PartitionManager, create_partition, create_table, delete_partition, examine,
    set_partition_flag,
};
pub use planner::{Plan, PlacementRequest, PlannedPartition};
pub use progress::{OperationEvent, OperationId, ProgressReporter, TracingReporter};
pub use provider::{BasicProvider, FullProvider, Provider, TableTypeProvider};
pub use snapshot::{SnapshotEntry, TableSnapshot};
