// sync.rs — Population-level tracking sync for batch passes.
//
// In `EvaluationMode::BatchPresync` the tracking table is refreshed for the
// whole population before any per-course decision is made: newly-missing
// courses get a record, recovered courses lose theirs, and courses whose
// record is older than the delay are selected as due (and their records
// removed). The per-course decision afterwards is unconditional: every due
// course triggers, every other course is Next.
//
// The sync uses the same transition table and per-key locking as the
// per-course evaluator, so both modes leave the store in the same state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evaluator::{Reconciled, Transition, TriggerEvaluator};
use crate::ids::CourseId;

/// A course the sync selected for triggering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueCourse {
    pub course_id: CourseId,
    /// How long the course had been tracked when it was selected.
    pub missing_secs: i64,
}

/// A course whose evaluation failed; the pass moved on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseFailure {
    pub course_id: CourseId,
    pub error: String,
}

/// Outcome of one population sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started: Vec<CourseId>,
    pub cleared: Vec<CourseId>,
    pub waiting: usize,
    pub due: Vec<DueCourse>,
    pub failures: Vec<CourseFailure>,
    /// Set when the configuration was unusable; nothing was synced.
    pub config_error: Option<String>,
}

impl SyncReport {
    pub fn is_due(&self, course_id: CourseId) -> bool {
        self.due.iter().any(|d| d.course_id == course_id)
    }
}

/// Refreshes tracking records for a whole population.
pub struct PopulationSync<'a> {
    evaluator: &'a TriggerEvaluator,
}

impl<'a> PopulationSync<'a> {
    pub fn new(evaluator: &'a TriggerEvaluator) -> Self {
        Self { evaluator }
    }

    /// Sync every course in `population` as of `now`.
    ///
    /// A missing role list aborts the sync before any store access; each
    /// course still gets a `ConfigRejected` event. Errors for individual
    /// courses are collected and the sync continues.
    pub fn sync(&self, population: &[CourseId], now: DateTime<Utc>) -> SyncReport {
        let run_id = self.evaluator.run_id();
        let mut report = SyncReport {
            run_id,
            ..SyncReport::default()
        };

        if let Err(err) = self.evaluator.settings().roles() {
            tracing::error!(
                run_id = %run_id,
                courses = population.len(),
                "trigger configuration error: {}; population sync skipped",
                err
            );
            let reason = err.to_string();
            for &course_id in population {
                self.evaluator.emit_config_rejected(course_id, &reason, now);
            }
            report.config_error = Some(reason);
            return report;
        }

        for &course_id in population {
            match self.evaluator.reconcile(course_id, now) {
                Ok(Reconciled::Applied { transition, .. }) => match transition {
                    Transition::TrackingStarted => report.started.push(course_id),
                    Transition::TrackingCleared { .. } => report.cleared.push(course_id),
                    Transition::Waiting { .. } => report.waiting += 1,
                    Transition::Expired { missing_secs } => report.due.push(DueCourse {
                        course_id,
                        missing_secs,
                    }),
                    _ => {}
                },
                Ok(Reconciled::Rejected(err)) => {
                    report.config_error = Some(err.to_string());
                    break;
                }
                Err(err) => {
                    tracing::warn!(run_id = %run_id, course_id = %course_id, "sync failed: {}", err);
                    report.failures.push(CourseFailure {
                        course_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            run_id = %run_id,
            started = report.started.len(),
            cleared = report.cleared.len(),
            waiting = report.waiting,
            due = report.due.len(),
            failures = report.failures.len(),
            "population sync complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TriggerConfig, TriggerSettings};
    use crate::roles::{ContextRoleChecker, RoleDirectory};
    use crate::tracking::{MemoryTrackingStore, TrackingKey, TrackingRecord, TrackingStore};
    use chrono::Duration;
    use std::sync::Arc;

    fn directory() -> RoleDirectory {
        serde_json::from_str(
            r#"{
                "courses": [{ "id": 1 }, { "id": 2 }, { "id": 3 }, { "id": 4 }],
                "assignments": [
                    { "context": { "course": 2 }, "role": "teacher" },
                    { "context": { "course": 4 }, "role": "editingteacher" }
                ]
            }"#,
        )
        .unwrap()
    }

    fn evaluator(config: &TriggerConfig, store: Arc<MemoryTrackingStore>) -> TriggerEvaluator {
        TriggerEvaluator::new(
            TriggerSettings::load(config).unwrap(),
            Arc::new(ContextRoleChecker::new(&directory())),
            store,
        )
    }

    #[test]
    fn sync_inserts_clears_and_selects_due() {
        let now = Utc::now();
        let config = TriggerConfig {
            delay_secs: 100,
            ..TriggerConfig::recommended()
        };
        // Course 1: untracked, no teacher → started.
        // Course 2: tracked, has teacher → cleared.
        // Course 3: tracked 101s, no teacher → due.
        // Course 4: untracked, has teacher → untouched.
        let store = Arc::new(MemoryTrackingStore::from_records([
            TrackingRecord::new(TrackingKey::course(CourseId(2)), now - Duration::seconds(500)),
            TrackingRecord::new(TrackingKey::course(CourseId(3)), now - Duration::seconds(101)),
        ]));
        let evaluator = evaluator(&config, store.clone());

        let population = [CourseId(1), CourseId(2), CourseId(3), CourseId(4)];
        let report = PopulationSync::new(&evaluator).sync(&population, now);

        assert_eq!(report.started, vec![CourseId(1)]);
        assert_eq!(report.cleared, vec![CourseId(2)]);
        assert_eq!(
            report.due,
            vec![DueCourse {
                course_id: CourseId(3),
                missing_secs: 101
            }]
        );
        assert!(report.is_due(CourseId(3)));
        assert!(!report.is_due(CourseId(1)));

        let remaining: Vec<_> = store.list().unwrap().iter().map(|r| r.course_id()).collect();
        assert_eq!(remaining, vec![CourseId(1)]);
    }

    #[test]
    fn sync_with_missing_roles_does_nothing() {
        let store = Arc::new(MemoryTrackingStore::new());
        let evaluator = evaluator(&TriggerConfig::default(), store.clone());

        let report = PopulationSync::new(&evaluator).sync(&[CourseId(1), CourseId(3)], Utc::now());
        assert!(report.config_error.is_some());
        assert!(report.started.is_empty());
        assert!(store.is_empty());
    }
}
