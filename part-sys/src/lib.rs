// SPDX-License-Identifier: GPL-3.0-only

//! Low-level device access and partition labels on top of mbrman and gptman
//!
//! This crate is the only place that touches a disk directly. It opens block
//! devices (or image files), reads their geometry, parses and writes MSDOS and
//! GPT labels and reports problems through the [`exception`] channel before
//! returning a [`SysError`].

pub mod device;
pub mod disk;
pub mod error;
pub mod exception;
pub mod gpt;
pub mod label;
pub mod msdos;

pub use device::{Device, DeviceKind, DeviceOptions};
pub use disk::{Disk, partition_path};
pub use error::{Result, SysError};
pub use exception::{Exception, ExceptionHandler, ExceptionOption, Severity};
pub use label::{Label, LabelEntry, NewEntry};
