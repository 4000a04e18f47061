// events.rs — Trigger events and notification dispatch.
//
// The evaluator emits an event whenever it changes tracking state or
// reports a course. Sinks (a JSONL log file, a host callback) subscribe
// through `NotificationSink`. Dispatch is synchronous; a failing sink is
// logged and skipped, it never fails the evaluation.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TriggerError;
use crate::ids::CourseId;
use crate::tracking::TrackingKey;

/// Events emitted by the trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// A course was seen without a responsible role for the first time.
    TrackingStarted {
        run_id: Uuid,
        key: TrackingKey,
        timestamp: DateTime<Utc>,
    },

    /// A tracked course has a responsible role again.
    TrackingCleared {
        run_id: Uuid,
        key: TrackingKey,
        tracked_secs: i64,
        timestamp: DateTime<Utc>,
    },

    /// A course stayed without a responsible role past the delay.
    CourseTriggered {
        run_id: Uuid,
        course_id: CourseId,
        missing_secs: i64,
        timestamp: DateTime<Utc>,
    },

    /// Evaluation was skipped because the configuration is unusable.
    ConfigRejected {
        run_id: Uuid,
        course_id: CourseId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl TriggerEvent {
    /// Get the event type name as a string.
    pub fn event_type(&self) -> &str {
        match self {
            TriggerEvent::TrackingStarted { .. } => "tracking_started",
            TriggerEvent::TrackingCleared { .. } => "tracking_cleared",
            TriggerEvent::CourseTriggered { .. } => "course_triggered",
            TriggerEvent::ConfigRejected { .. } => "config_rejected",
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            TriggerEvent::TrackingStarted { run_id, .. }
            | TriggerEvent::TrackingCleared { run_id, .. }
            | TriggerEvent::CourseTriggered { run_id, .. }
            | TriggerEvent::ConfigRejected { run_id, .. } => *run_id,
        }
    }
}

/// Receives trigger events.
pub trait NotificationSink: Send + Sync {
    /// Handle an event. Errors are logged but don't stop the evaluation.
    fn send(&self, event: &TriggerEvent) -> Result<(), TriggerError>;
}

/// Appends events as JSON lines to a file.
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read every event from a log written by this sink, oldest first.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<TriggerEvent>, TriggerError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(io_err(path))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(TriggerError::from))
            .collect()
    }
}

impl NotificationSink for LogSink {
    fn send(&self, event: &TriggerEvent) -> Result<(), TriggerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err(&self.path))?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json).map_err(io_err(&self.path))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> TriggerError + '_ {
    move |source| TriggerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Dispatches events to multiple sinks.
#[derive(Default)]
pub struct EventDispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Box<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    /// Dispatch an event to all sinks.
    pub fn dispatch(&self, event: &TriggerEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!(
                    run_id = %event.run_id(),
                    event_type = event.event_type(),
                    "notification sink error: {}",
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn started(course: u64) -> TriggerEvent {
        TriggerEvent::TrackingStarted {
            run_id: Uuid::new_v4(),
            key: TrackingKey::course(CourseId(course)),
            timestamp: Utc::now(),
        }
    }

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn send(&self, _event: &TriggerEvent) -> Result<(), TriggerError> {
            Err(TriggerError::store("sink", "unavailable"))
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&started(3)).unwrap();
        assert!(json.contains("\"event_type\":\"tracking_started\""));
        let restored: TriggerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.event_type(), "tracking_started");
    }

    #[test]
    fn log_sink_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("events.jsonl");
        let sink = LogSink::new(&path);

        sink.send(&started(1)).unwrap();
        sink.send(&started(2)).unwrap();

        let events = LogSink::read_all(&path).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn io_errors_name_the_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.jsonl");
        match LogSink::read_all(&missing).unwrap_err() {
            TriggerError::Io { path, .. } => assert_eq!(path, missing),
            other => panic!("expected I/O error, got {other:?}"),
        }

        // A directory where the log file should be.
        let blocked = dir.path().join("blocked");
        fs::create_dir(&blocked).unwrap();
        match LogSink::new(&blocked).send(&started(1)).unwrap_err() {
            TriggerError::Io { path, .. } => assert_eq!(path, blocked),
            other => panic!("expected I/O error, got {other:?}"),
        }
    }

    #[test]
    fn dispatcher_survives_failing_sink() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut dispatcher = EventDispatcher::new();
        dispatcher.add_sink(Box::new(FailingSink));
        dispatcher.add_sink(Box::new(LogSink::new(&path)));

        let event = started(9);
        dispatcher.dispatch(&event);

        let events = LogSink::read_all(&path).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].run_id(), event.run_id());
    }
}
