// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of a commit that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStage {
    /// Writing the staged table to the device
    Persist,
    /// Asking the kernel to re-read the table; the device already holds the new layout
    NotifyKernel,
}

/// Error categories with stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Device,
    ExistingTable,
    Placement,
    Capacity,
    InvalidInput,
    Commit,
    OperationFailed,
}

impl ErrorKind {
    pub fn code(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::Device => 404,
            Self::ExistingTable => 409,
            Self::Placement => 422,
            Self::Capacity => 507,
            Self::Commit => 500,
            Self::OperationFailed => 502,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartError {
    #[error("{0}")]
    Device(String),

    #[error("{0}")]
    ExistingTable(String),

    #[error("{0}")]
    Placement(String),

    #[error("{0}")]
    Capacity(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{message}")]
    Commit { stage: CommitStage, message: String },

    #[error("{0}")]
    OperationFailed(String),
}

impl PartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Device(_) => ErrorKind::Device,
            Self::ExistingTable(_) => ErrorKind::ExistingTable,
            Self::Placement(_) => ErrorKind::Placement,
            Self::Capacity(_) => ErrorKind::Capacity,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Commit { .. } => ErrorKind::Commit,
            Self::OperationFailed(_) => ErrorKind::OperationFailed,
        }
    }

    pub fn code(&self) -> u16 {
        self.kind().code()
    }

    /// The failed commit phase, for commit errors
    pub fn commit_stage(&self) -> Option<CommitStage> {
        match self {
            Self::Commit { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            code: self.code(),
            message: self.to_string(),
            stage: self.commit_stage(),
        }
    }
}

/// Serializable form of a [`PartError`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<CommitStage>,
}

pub type Result<T> = std::result::Result<T, PartError>;
