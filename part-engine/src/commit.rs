// SPDX-License-Identifier: GPL-3.0-only

//! Two-phase commit: persist the staged table, then tell the kernel.
//!
//! A persist failure leaves the kernel untouched. A notify failure means the
//! device already carries the new layout; it is reported as such and neither
//! rolled back nor retried.

use crate::backend::DiskBackend;
use crate::diagnostics::{self, ErrnoText};
use crate::error::{CommitStage, Result};

pub(crate) fn run(backend: &mut dyn DiskBackend, errno_text: ErrnoText) -> Result<()> {
    let path = backend.path().to_string();

    tracing::debug!("Persisting partition table of {}", path);
    backend.commit_to_device().map_err(|e| {
        diagnostics::translate_commit(
            e,
            CommitStage::Persist,
            &format!("Failed to commit changes to device '{}'", path),
            errno_text,
        )
    })?;

    tracing::debug!("Asking the kernel to re-read {}", path);
    backend.commit_to_os().map_err(|e| {
        let err = diagnostics::translate_commit(
            e,
            CommitStage::NotifyKernel,
            &format!("Failed to inform OS about changes on the '{}' device", path),
            errno_text,
        );
        tracing::warn!("{} now holds a partition table the kernel has not seen: {}", path, err);
        err
    })
}
