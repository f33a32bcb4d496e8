// SPDX-License-Identifier: GPL-3.0-only

//! Raw device access
//!
//! A [`Device`] is either a block device or a regular image file. Block
//! devices report their geometry through ioctls; image files are treated as
//! 512-byte-sector disks with no optimal I/O hint.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::{FileExt, FileTypeExt, OpenOptionsExt};

use nix::errno::Errno;
use part_types::Geometry;

use crate::error::{Result, SysError};
use crate::exception;

/// Sector size assumed for image files
pub const IMAGE_SECTOR_SIZE: u64 = 512;

/// Queries gptman does not cover
mod ioctl {
    nix::ioctl_read_bad!(blkiomin, nix::request_code_none!(0x12, 120), libc::c_uint);
    nix::ioctl_read_bad!(blkioopt, nix::request_code_none!(0x12, 121), libc::c_uint);
    nix::ioctl_read_bad!(blkpbszget, nix::request_code_none!(0x12, 123), libc::c_uint);
    nix::ioctl_read_bad!(
        blkgetsize64,
        nix::request_code_read!(0x12, 114, std::mem::size_of::<libc::size_t>()),
        u64
    );
}

/// How a device is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOptions {
    pub write: bool,
    /// Claim block devices with O_EXCL so a mounted or otherwise held device is refused
    pub exclusive: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            write: true,
            exclusive: true,
        }
    }
}

impl DeviceOptions {
    pub fn read_only() -> Self {
        Self {
            write: false,
            exclusive: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Block,
    Image,
}

#[derive(Debug)]
pub struct Device {
    path: String,
    file: File,
    kind: DeviceKind,
    writable: bool,
    geometry: Geometry,
}

impl Device {
    pub fn open(path: &str, options: DeviceOptions) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            exception::throw(SysError::io(
                format!("Device '{}' invalid or not existing", path),
                e,
            ))
        })?;

        let file_type = metadata.file_type();
        let kind = if file_type.is_block_device() {
            DeviceKind::Block
        } else if file_type.is_file() {
            DeviceKind::Image
        } else {
            return Err(exception::throw(SysError::InvalidArgument(format!(
                "'{}' is neither a block device nor an image file",
                path
            ))));
        };

        let mut open_options = OpenOptions::new();
        open_options.read(true).write(options.write);
        if options.exclusive && kind == DeviceKind::Block {
            open_options.custom_flags(libc::O_EXCL);
        }

        let file = open_options.open(path).map_err(|e| {
            exception::throw(SysError::io(format!("Failed to open device '{}'", path), e))
        })?;

        let geometry = match kind {
            DeviceKind::Block => block_geometry(&file, path)?,
            DeviceKind::Image => Geometry {
                sector_size: IMAGE_SECTOR_SIZE,
                physical_sector_size: IMAGE_SECTOR_SIZE,
                minimum_io_size: IMAGE_SECTOR_SIZE,
                optimal_io_size: 0,
                total_sectors: metadata.len() / IMAGE_SECTOR_SIZE,
            },
        };

        if geometry.sector_size == 0 || geometry.total_sectors == 0 {
            return Err(exception::throw(SysError::InvalidArgument(format!(
                "Device '{}' reports an empty geometry",
                path
            ))));
        }

        tracing::debug!(
            "Opened {} ({:?}): {} sectors of {} bytes",
            path,
            kind,
            geometry.total_sectors,
            geometry.sector_size
        );

        Ok(Self {
            path: path.to_string(),
            file,
            kind,
            writable: options.write,
            geometry,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// The open file, for the label codecs that work on `Read + Write + Seek`
    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    /// Read `count` sectors starting at `lba`
    pub fn read_sectors(&self, lba: u64, count: u64) -> Result<Vec<u8>> {
        self.check_bounds(lba, count)?;
        let mut buffer = vec![0u8; (count * self.geometry.sector_size) as usize];
        self.file
            .read_exact_at(&mut buffer, lba * self.geometry.sector_size)
            .map_err(|e| {
                exception::throw(SysError::io(
                    format!("Failed to read sector {} of '{}'", lba, self.path),
                    e,
                ))
            })?;
        Ok(buffer)
    }

    /// Write whole sectors starting at `lba`
    pub fn write_sectors(&self, lba: u64, data: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(exception::throw(SysError::PermissionDenied(format!(
                "'{}' was opened read-only",
                self.path
            ))));
        }

        let sector_size = self.geometry.sector_size as usize;
        if data.len() % sector_size != 0 {
            return Err(exception::throw(SysError::InvalidArgument(format!(
                "write of {} bytes is not a whole number of sectors",
                data.len()
            ))));
        }
        self.check_bounds(lba, (data.len() / sector_size) as u64)?;

        self.file
            .write_all_at(data, lba * self.geometry.sector_size)
            .map_err(|e| {
                exception::throw(SysError::io(
                    format!("Failed to write sector {} of '{}'", lba, self.path),
                    e,
                ))
            })
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().map_err(|e| {
            exception::throw(SysError::io(format!("Failed to sync '{}'", self.path), e))
        })
    }

    /// Ask the kernel to re-read the partition table.
    ///
    /// Image files have no kernel view to refresh, so this is a no-op for them.
    pub fn reread_partitions(&self) -> Result<()> {
        if self.kind == DeviceKind::Image {
            return Ok(());
        }

        let context = format!(
            "Failed to inform the kernel about changes on '{}'",
            self.path
        );
        let mut file = self
            .file
            .try_clone()
            .map_err(|e| exception::throw(SysError::io(context.clone(), e)))?;
        gptman::linux::reread_partition_table(&mut file).map_err(|e| {
            let errno = Errno::last();
            tracing::debug!("BLKRRPART on {}: {}", self.path, e);
            exception::throw(SysError::from_errno(context.clone(), errno))
        })
    }

    /// Flush pending writes and release the device
    pub fn close(self) -> Result<()> {
        if self.writable {
            self.sync()?;
        }
        Ok(())
    }

    fn check_bounds(&self, lba: u64, count: u64) -> Result<()> {
        if lba + count > self.geometry.total_sectors {
            return Err(exception::throw(SysError::OutOfRange(format!(
                "sectors {}..{} are beyond the end of '{}' ({} sectors)",
                lba,
                lba + count,
                self.path,
                self.geometry.total_sectors
            ))));
        }
        Ok(())
    }
}

fn block_geometry(file: &File, path: &str) -> Result<Geometry> {
    let fd = file.as_raw_fd();
    let fail = |what: &str, errno: Errno| {
        exception::throw(SysError::from_errno(
            format!("Failed to query {} of '{}'", what, path),
            errno,
        ))
    };

    let mut handle = file.try_clone().map_err(|e| {
        exception::throw(SysError::io(format!("Failed to open device '{}'", path), e))
    })?;
    let sector_size = gptman::linux::get_sector_size(&mut handle).map_err(|e| {
        let errno = Errno::last();
        tracing::debug!("BLKSSZGET on {}: {}", path, e);
        fail("sector size", errno)
    })?;

    let mut physical: libc::c_uint = 0;
    let mut minimum_io: libc::c_uint = 0;
    let mut optimal_io: libc::c_uint = 0;
    let mut size_bytes: u64 = 0;

    // SAFETY: each call writes a single integer of the declared type through a
    // pointer to a live local.
    unsafe {
        ioctl::blkpbszget(fd, &mut physical).map_err(|e| fail("physical sector size", e))?;
        ioctl::blkiomin(fd, &mut minimum_io).map_err(|e| fail("minimum I/O size", e))?;
        ioctl::blkioopt(fd, &mut optimal_io).map_err(|e| fail("optimal I/O size", e))?;
        ioctl::blkgetsize64(fd, &mut size_bytes).map_err(|e| fail("size", e))?;
    }

    if sector_size == 0 {
        return Err(exception::throw(SysError::InvalidArgument(format!(
            "Device '{}' reports a zero sector size",
            path
        ))));
    }

    Ok(Geometry {
        sector_size,
        physical_sector_size: u64::from(physical).max(sector_size),
        minimum_io_size: u64::from(minimum_io).max(sector_size),
        optimal_io_size: u64::from(optimal_io),
        total_sectors: size_bytes / sector_size,
    })
}
