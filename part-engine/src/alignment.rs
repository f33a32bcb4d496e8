// SPDX-License-Identifier: GPL-3.0-only

//! Alignment arithmetic
//!
//! Starts are rounded up to the next sector boundary. Sizes are rounded down
//! to a multiple of the grain picked by the [`AlignmentMode`]; a size of zero
//! means "everything that is left" and is passed through untouched.

use part_types::{AlignmentMode, Geometry, bytes_to_pretty};

use crate::error::{PartError, Result};

/// A request converted to sectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedRequest {
    pub start_sector: u64,
    /// 0 when the caller asked for all remaining space
    pub size_sectors: u64,
    /// Grain in sectors, used to trim open-ended extents
    pub grain_sectors: u64,
}

/// Grain size in bytes for `mode`
pub fn grain(geometry: &Geometry, mode: AlignmentMode) -> Result<u64> {
    if geometry.sector_size == 0 {
        return Err(PartError::InvalidInput(
            "Device reports a sector size of zero".to_string(),
        ));
    }

    let grain = match mode {
        AlignmentMode::Minimal => geometry.minimum_io_size,
        AlignmentMode::Optimal => geometry.default_grain(),
        AlignmentMode::None => geometry.sector_size,
    };

    if grain == 0 {
        return Err(PartError::InvalidInput(format!(
            "Device reports a zero grain size for {:?} alignment",
            mode
        )));
    }
    // A grain that is not a whole number of sectors cannot be honoured.
    Ok(grain.div_ceil(geometry.sector_size) * geometry.sector_size)
}

/// Round `start` up to the next multiple of `sector_size`
pub fn align_start(start: u64, sector_size: u64) -> u64 {
    start.div_ceil(sector_size) * sector_size
}

/// Round `size` down to a multiple of `grain`; zero stays zero
pub fn align_size(size: u64, grain: u64) -> u64 {
    if size == 0 { 0 } else { size / grain * grain }
}

pub fn align_request(
    start: u64,
    size: u64,
    geometry: &Geometry,
    mode: AlignmentMode,
) -> Result<AlignedRequest> {
    let grain = grain(geometry, mode)?;
    let sector_size = geometry.sector_size;

    let aligned_size = align_size(size, grain);
    if size != 0 && aligned_size == 0 {
        return Err(PartError::InvalidInput(format!(
            "Requested size {} is smaller than the alignment grain of {}",
            bytes_to_pretty(&size, true),
            bytes_to_pretty(&grain, false)
        )));
    }

    let request = AlignedRequest {
        start_sector: align_start(start, sector_size) / sector_size,
        size_sectors: aligned_size / sector_size,
        grain_sectors: grain / sector_size,
    };
    tracing::debug!(
        "Aligned start {} size {} ({:?}) to sector {} length {}",
        start,
        size,
        mode,
        request.start_sector,
        request.size_sectors
    );
    Ok(request)
}
