// SPDX-License-Identifier: GPL-3.0-only

//! Translation of collaborator failures into [`PartError`]
//!
//! part-sys announces every problem on its process-wide exception channel
//! before returning an error. The handler installed here keeps the most
//! recent message in a per-thread slot, so concurrent operations on other
//! threads never see each other's diagnostics. Each public operation clears
//! the slot when it starts.

use std::cell::RefCell;
use std::sync::Once;

use nix::errno::Errno;
use part_sys::{Exception, ExceptionOption, Severity, SysError};
use serde::{Deserialize, Serialize};

use crate::error::{CommitStage, PartError};

thread_local! {
    static LAST_DIAGNOSTIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

/// How errno values are rendered into messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrnoText {
    /// Fixed, locale-independent descriptions
    #[default]
    Portable,
    /// Whatever the C library reports for the current locale
    System,
}

impl ErrnoText {
    pub fn render(self, errno: Errno) -> String {
        match self {
            Self::Portable => errno.desc().to_string(),
            Self::System => std::io::Error::from_raw_os_error(errno as i32).to_string(),
        }
    }
}

fn record(exception: &Exception) -> ExceptionOption {
    match exception.severity {
        Severity::Information => tracing::debug!("{}", exception.message),
        Severity::Warning => {
            tracing::warn!("{}", exception.message);
            set(exception.message.clone());
        }
        Severity::Error | Severity::Fatal => set(exception.message.clone()),
    }
    ExceptionOption::Unhandled
}

/// Route part-sys exceptions into the per-thread diagnostic slot.
pub fn install() {
    INSTALL.call_once(|| part_sys::exception::set_handler(Some(record)));
}

pub fn clear() {
    LAST_DIAGNOSTIC.with(|slot| slot.borrow_mut().take());
}

fn set(message: String) {
    LAST_DIAGNOSTIC.with(|slot| *slot.borrow_mut() = Some(message));
}

/// Take the last diagnostic recorded on this thread
pub fn take() -> Option<String> {
    LAST_DIAGNOSTIC.with(|slot| slot.borrow_mut().take())
}

/// Join a caller-facing prefix with the collaborator's detail as "prefix (detail)".
fn compose(prefix: &str, detail: Option<String>) -> String {
    match detail {
        Some(detail) if !detail.is_empty() => format!("{prefix} ({detail})"),
        _ => prefix.to_string(),
    }
}

/// Detail text for `err`, with errno values rendered per `errno_text`.
///
/// The recorded diagnostic is only used when it was raised for `err` itself;
/// a message left behind by an earlier, recovered failure never replaces the
/// error's own text.
fn detail(err: &SysError, errno_text: ErrnoText) -> String {
    let recorded = take();
    match err {
        SysError::Os { context, errno } => format!("{context}: {}", errno_text.render(*errno)),
        _ => {
            let own = err.to_string();
            recorded.filter(|message| *message == own).unwrap_or(own)
        }
    }
}

/// Translate a collaborator error raised while staging or opening.
pub fn translate(err: SysError, prefix: &str, errno_text: ErrnoText) -> PartError {
    let message = compose(prefix, Some(detail(&err, errno_text)));
    match err {
        SysError::DeviceNotFound(_) | SysError::PermissionDenied(_) | SysError::Busy(_) => {
            PartError::Device(message)
        }
        SysError::Nesting(_) => PartError::Placement(message),
        SysError::Overlap(_) | SysError::NoSlot(_) => PartError::Capacity(message),
        SysError::OutOfRange(_) | SysError::Unsupported(_) | SysError::InvalidArgument(_) => {
            PartError::InvalidInput(message)
        }
        SysError::NoLabel(_) | SysError::CorruptLabel(_) | SysError::Os { .. } => {
            PartError::OperationFailed(message)
        }
    }
}

/// Translate a failure of one commit phase.
pub fn translate_commit(
    err: SysError,
    stage: CommitStage,
    prefix: &str,
    errno_text: ErrnoText,
) -> PartError {
    PartError::Commit {
        stage,
        message: compose(prefix, Some(detail(&err, errno_text))),
    }
}
