// SPDX-License-Identifier: GPL-3.0-only

//! Exception channel
//!
//! Label and device code announces problems here before it returns an error,
//! the same way the C partitioning libraries do. A single process-wide
//! handler receives every exception; without one, exceptions are only logged.
//! Handlers must not assume which thread they run on.

use std::sync::RwLock;

/// How serious an exception is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Information,
    Warning,
    Error,
    Fatal,
}

/// What the handler decided to do about an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionOption {
    /// The handler did not resolve the problem; the raising call fails
    Unhandled,
    /// Continue as if the problem had not occurred
    Ignore,
    /// Abort the raising call
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    pub severity: Severity,
    pub message: String,
}

pub type ExceptionHandler = fn(&Exception) -> ExceptionOption;

static HANDLER: RwLock<Option<ExceptionHandler>> = RwLock::new(None);

/// Install (or with `None`, remove) the process-wide exception handler.
pub fn set_handler(handler: Option<ExceptionHandler>) {
    match HANDLER.write() {
        Ok(mut slot) => *slot = handler,
        Err(poisoned) => *poisoned.into_inner() = handler,
    }
}

pub fn handler() -> Option<ExceptionHandler> {
    match HANDLER.read() {
        Ok(slot) => *slot,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Raise an exception and return the handler's verdict
pub fn raise(severity: Severity, message: impl Into<String>) -> ExceptionOption {
    let exception = Exception {
        severity,
        message: message.into(),
    };

    match handler() {
        Some(handler) => handler(&exception),
        None => {
            match severity {
                Severity::Information => tracing::info!("{}", exception.message),
                Severity::Warning => tracing::warn!("{}", exception.message),
                Severity::Error | Severity::Fatal => tracing::error!("{}", exception.message),
            }
            ExceptionOption::Unhandled
        }
    }
}

/// Raise `err` as an error exception and hand it back for returning.
pub(crate) fn throw(err: crate::SysError) -> crate::SysError {
    raise(Severity::Error, err.to_string());
    err
}

/// Raise a warning; returns false when the handler cancelled the operation
pub(crate) fn warn(message: impl Into<String>) -> bool {
    raise(Severity::Warning, message) != ExceptionOption::Cancel
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    thread_local! {
        static SEEN: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn collect(exception: &Exception) -> ExceptionOption {
        SEEN.with(|seen| seen.borrow_mut().push(exception.message.clone()));
        ExceptionOption::Unhandled
    }

    #[test]
    fn handler_sees_raised_messages() {
        set_handler(Some(collect));
        let verdict = raise(Severity::Error, "Can't have overlapping partitions.");
        set_handler(None);

        assert_eq!(verdict, ExceptionOption::Unhandled);
        SEEN.with(|seen| {
            assert_eq!(
                seen.borrow().as_slice(),
                ["Can't have overlapping partitions.".to_string()]
            );
        });
    }
}
