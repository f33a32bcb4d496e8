// SPDX-License-Identifier: GPL-3.0-only

//! Started/finished reports for public operations

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OperationEvent {
    Started {
        id: OperationId,
        message: String,
    },
    Finished {
        id: OperationId,
        /// "Completed" on success, the error message otherwise
        message: String,
        success: bool,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &OperationEvent);
}

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: &OperationEvent) {
        match event {
            OperationEvent::Started { id, message } => tracing::info!(%id, "{}", message),
            OperationEvent::Finished {
                id,
                message,
                success: true,
            } => tracing::info!(%id, "{}", message),
            OperationEvent::Finished { id, message, .. } => tracing::warn!(%id, "{}", message),
        }
    }
}

/// One running operation; reports `Started` on creation.
pub(crate) struct Operation<'a> {
    id: OperationId,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> Operation<'a> {
    pub(crate) fn start(reporter: &'a dyn ProgressReporter, message: String) -> Self {
        let id = OperationId::new();
        reporter.report(&OperationEvent::Started { id, message });
        Self { id, reporter }
    }

    /// Report how the operation ended and pass its result through
    pub(crate) fn finish<T>(self, result: crate::Result<T>) -> crate::Result<T> {
        let (message, success) = match &result {
            Ok(_) => ("Completed".to_string(), true),
            Err(e) => (e.to_string(), false),
        };
        self.reporter.report(&OperationEvent::Finished {
            id: self.id,
            message,
            success,
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<OperationEvent>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: &OperationEvent) {
            if let Ok(mut events) = self.0.lock() {
                events.push(event.clone());
            }
        }
    }

    #[test]
    fn operations_report_start_and_finish() {
        let recorder = Recorder::default();
        let operation = Operation::start(&recorder, "Starting creation of a new partition table on '/dev/sdx'".to_string());
        let result: crate::Result<()> =
            operation.finish(Err(crate::PartError::Device("gone".to_string())));
        assert!(result.is_err());

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        let OperationEvent::Started { id: started, .. } = &events[0] else {
            panic!("expected a start event");
        };
        assert_eq!(
            events[1],
            OperationEvent::Finished {
                id: *started,
                message: "gone".to_string(),
                success: false,
            }
        );
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let id = OperationId::new();
        let json = serde_json::to_string(&OperationEvent::Started {
            id,
            message: "x".to_string(),
        })
        .unwrap();
        assert!(json.starts_with(r#"{"event":"started""#));
    }
}
