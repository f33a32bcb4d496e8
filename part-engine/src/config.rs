// SPDX-License-Identifier: GPL-3.0-only

use part_sys::DeviceOptions;
use part_types::AlignmentMode;
use serde::{Deserialize, Serialize};

use crate::diagnostics::ErrnoText;
use crate::provider::Provider;

/// Engine settings, usually read from the `[engine]` table of a TOML file.
/// Missing keys take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub provider: Provider,
    /// Used when a request does not name an alignment
    pub default_alignment: AlignmentMode,
    pub errno_text: ErrnoText,
    /// Open block devices with O_EXCL so busy devices are refused
    pub exclusive_open: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Full,
            default_alignment: AlignmentMode::Optimal,
            errno_text: ErrnoText::Portable,
            exclusive_open: true,
        }
    }
}

impl EngineConfig {
    pub(crate) fn write_options(&self) -> DeviceOptions {
        DeviceOptions {
            write: true,
            exclusive: self.exclusive_open,
        }
    }
}
