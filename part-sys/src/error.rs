// SPDX-License-Identifier: GPL-3.0-only

use nix::errno::Errno;
use thiserror::Error;

/// Error types for device and label operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("{context}: {}", .errno.desc())]
    Os { context: String, errno: Errno },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device is busy: {0}")]
    Busy(String),

    #[error("No partition table on device: {0}")]
    NoLabel(String),

    #[error("Corrupt partition table: {0}")]
    CorruptLabel(String),

    #[error("Overlapping partitions: {0}")]
    Overlap(String),

    #[error("Invalid nesting: {0}")]
    Nesting(String),

    #[error("No free partition slot: {0}")]
    NoSlot(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl SysError {
    /// Wrap an I/O error, keeping the errno so callers can render it themselves
    pub fn io(context: impl Into<String>, err: std::io::Error) -> Self {
        let context = context.into();
        match err.raw_os_error() {
            Some(code) => Self::from_errno(context, Errno::from_raw(code)),
            None => Self::Os {
                context: format!("{context}: {err}"),
                errno: Errno::EIO,
            },
        }
    }

    pub fn from_errno(context: impl Into<String>, errno: Errno) -> Self {
        let context = context.into();
        match errno {
            Errno::ENOENT | Errno::ENXIO | Errno::ENODEV => Self::DeviceNotFound(context),
            Errno::EACCES | Errno::EPERM => Self::PermissionDenied(context),
            Errno::EBUSY => Self::Busy(context),
            _ => Self::Os { context, errno },
        }
    }

    /// Map a failure reported by mbrman or gptman. An I/O failure keeps its
    /// errno; anything else is a problem with the label itself and becomes
    /// `otherwise`.
    pub(crate) fn codec(
        context: impl Into<String>,
        err: &(dyn std::error::Error + 'static),
        otherwise: fn(String) -> SysError,
    ) -> Self {
        let context = context.into();
        let mut source = Some(err);
        while let Some(cause) = source {
            if let Some(code) = cause
                .downcast_ref::<std::io::Error>()
                .and_then(std::io::Error::raw_os_error)
            {
                return Self::from_errno(context, Errno::from_raw(code));
            }
            source = cause.source();
        }
        otherwise(format!("{context}: {err}"))
    }

    /// The errno behind this error, if it came from the operating system
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Self::Os { errno, .. } => Some(*errno),
            Self::DeviceNotFound(_) => Some(Errno::ENOENT),
            Self::PermissionDenied(_) => Some(Errno::EACCES),
            Self::Busy(_) => Some(Errno::EBUSY),
            _ => None,
        }
    }
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_errno() {
        let err = SysError::io("open /dev/nope", std::io::Error::from_raw_os_error(libc::ENOENT));
        assert!(matches!(err, SysError::DeviceNotFound(_)));
        assert_eq!(err.errno(), Some(Errno::ENOENT));

        let err = SysError::io("write", std::io::Error::from_raw_os_error(libc::ENOSPC));
        assert_eq!(err.errno(), Some(Errno::ENOSPC));
        assert_eq!(err.to_string(), format!("write: {}", Errno::ENOSPC.desc()));
    }

    #[derive(Debug, Error)]
    enum CodecError {
        #[error("I/O error")]
        Io(#[source] std::io::Error),
        #[error("invalid signature")]
        InvalidSignature,
    }

    #[test]
    fn codec_errors_keep_io_errno_or_fall_back() {
        let io = CodecError::Io(std::io::Error::from_raw_os_error(libc::EBUSY));
        assert!(matches!(
            SysError::codec("write label", &io, SysError::CorruptLabel),
            SysError::Busy(_)
        ));

        let err = SysError::codec("read label", &CodecError::InvalidSignature, SysError::CorruptLabel);
        assert!(matches!(&err, SysError::CorruptLabel(m) if m == "read label: invalid signature"));
    }

    #[test]
    fn busy_devices_are_distinct() {
        let err = SysError::from_errno("/dev/sdz", Errno::EBUSY);
        assert!(matches!(err, SysError::Busy(_)));
    }
}
