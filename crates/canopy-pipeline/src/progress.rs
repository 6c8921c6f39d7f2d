//! Progress reporting
//!
//! Observers are passed explicitly through the
//! [`RunContext`](crate::RunContext) and are called for every place of a
//! walk, whichever execution path runs it. Without an observer nothing is
//! reported.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A step in a walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A place started resolving
    Started {
        /// Place name
        place: String,
    },
    /// A place resolved
    Finished {
        /// Place name
        place: String,
        /// Rows the place's transition excluded
        skipped_rows: usize,
    },
    /// An artifact was written
    Persisted {
        /// Place name
        place: String,
        /// Artifact location
        path: PathBuf,
    },
}

impl ProgressEvent {
    /// Place the event concerns
    #[must_use]
    pub fn place(&self) -> &str {
        match self {
            ProgressEvent::Started { place }
            | ProgressEvent::Finished { place, .. }
            | ProgressEvent::Persisted { place, .. } => place,
        }
    }
}

/// Receives progress events
///
/// Called from whichever thread runs the place, possibly concurrently.
pub trait ProgressObserver: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event);
    }
}

/// Logs progress through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { place } => tracing::info!(place, "started"),
            ProgressEvent::Finished { place, skipped_rows } => {
                tracing::info!(place, skipped_rows, "finished");
            }
            ProgressEvent::Persisted { place, path } => {
                tracing::info!(place, path = %path.display(), "persisted");
            }
        }
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct ProgressLog {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of collected events
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    /// Places that finished, in completion order
    #[must_use]
    pub fn finished(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Finished { .. }))
            .map(|e| e.place().to_string())
            .collect()
    }

    /// Number of collected events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing was collected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl ProgressObserver for ProgressLog {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.lock().push(event.clone());
    }
}
