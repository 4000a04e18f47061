// pass.rs — One scheduler pass over a course population.
//
// The host scheduler calls `TriggerPass::run()` periodically with the
// courses it wants checked. Settings are resolved once when the pass is
// built and shared by every evaluation in it. A failing course is recorded
// and skipped so one bad record cannot stop the rest of the batch; the
// report tells the host which courses to delete and which to retry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ConfigProvider, EvaluationMode, TriggerSettings};
use crate::error::ConfigError;
use crate::evaluator::{EvaluationResult, Transition, TriggerEvaluator};
use crate::events::EventDispatcher;
use crate::ids::CourseId;
use crate::roles::RoleChecker;
use crate::sync::{CourseFailure, PopulationSync};
use crate::tracking::TrackingStore;

/// Summary of one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub run_id: Uuid,
    pub mode: EvaluationMode,
    pub evaluated_at: DateTime<Utc>,
    pub evaluated: usize,
    /// Courses the host should delete.
    pub triggered: Vec<CourseId>,
    pub tracking_started: usize,
    pub tracking_cleared: usize,
    pub waiting: usize,
    /// Evaluations skipped because the configuration is unusable.
    pub config_errors: usize,
    /// The configuration error message, reported once per pass.
    pub config_error: Option<String>,
    pub failures: Vec<CourseFailure>,
}

impl PassReport {
    fn new(run_id: Uuid, mode: EvaluationMode, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            mode,
            evaluated_at,
            evaluated: 0,
            triggered: Vec::new(),
            tracking_started: 0,
            tracking_cleared: 0,
            waiting: 0,
            config_errors: 0,
            config_error: None,
            failures: Vec::new(),
        }
    }
}

/// A scheduler pass bound to one settings snapshot.
pub struct TriggerPass {
    evaluator: TriggerEvaluator,
}

impl TriggerPass {
    /// Resolve settings from `config` and prepare a pass with a fresh run id.
    pub fn new(
        config: &dyn ConfigProvider,
        roles: Arc<dyn RoleChecker>,
        store: Arc<dyn TrackingStore>,
    ) -> Result<Self, ConfigError> {
        let settings = TriggerSettings::load(config)?;
        Ok(Self {
            evaluator: TriggerEvaluator::new(settings, roles, store),
        })
    }

    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.evaluator = self.evaluator.with_events(events);
        self
    }

    pub fn evaluator(&self) -> &TriggerEvaluator {
        &self.evaluator
    }

    pub fn run_id(&self) -> Uuid {
        self.evaluator.run_id()
    }

    pub fn run(&self, population: &[CourseId]) -> PassReport {
        self.run_at(population, Utc::now())
    }

    /// Evaluate `population` in the configured mode as of `now`.
    pub fn run_at(&self, population: &[CourseId], now: DateTime<Utc>) -> PassReport {
        let mode = self.evaluator.settings().mode;
        tracing::info!(
            run_id = %self.run_id(),
            ?mode,
            courses = population.len(),
            "starting trigger pass"
        );

        let report = match mode {
            EvaluationMode::PerCourse => self.run_per_course(population, now),
            EvaluationMode::BatchPresync => self.run_presynced(population, now),
        };

        tracing::info!(
            run_id = %report.run_id,
            evaluated = report.evaluated,
            triggered = report.triggered.len(),
            failures = report.failures.len(),
            config_errors = report.config_errors,
            "trigger pass complete"
        );
        report
    }

    fn run_per_course(&self, population: &[CourseId], now: DateTime<Utc>) -> PassReport {
        let mut report = PassReport::new(self.run_id(), EvaluationMode::PerCourse, now);

        for &course_id in population {
            let evaluation = match self.evaluator.evaluate_with_trace(course_id, now) {
                Ok(evaluation) => evaluation,
                Err(err) => {
                    tracing::warn!(
                        run_id = %report.run_id,
                        course_id = %course_id,
                        "evaluation failed: {}",
                        err
                    );
                    report.failures.push(CourseFailure {
                        course_id,
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            report.evaluated += 1;
            match evaluation.transition {
                Transition::TrackingStarted => report.tracking_started += 1,
                Transition::TrackingCleared { .. } => report.tracking_cleared += 1,
                Transition::Waiting { .. } => report.waiting += 1,
                Transition::ConfigRejected { reason } => {
                    report.config_errors += 1;
                    report.config_error.get_or_insert(reason);
                }
                Transition::Untracked | Transition::Expired { .. } | Transition::Presynced => {}
            }
            if evaluation.result == EvaluationResult::Trigger {
                report.triggered.push(course_id);
            }
        }
        report
    }

    fn run_presynced(&self, population: &[CourseId], now: DateTime<Utc>) -> PassReport {
        let mut report = PassReport::new(self.run_id(), EvaluationMode::BatchPresync, now);
        let sync = PopulationSync::new(&self.evaluator).sync(population, now);

        if let Some(reason) = sync.config_error {
            report.config_errors = population.len();
            report.config_error = Some(reason);
            report.evaluated = population.len();
            return report;
        }

        report.tracking_started = sync.started.len();
        report.tracking_cleared = sync.cleared.len();
        report.waiting = sync.waiting;
        report.evaluated = population.len() - sync.failures.len();
        report.failures = sync.failures;

        for due in &sync.due {
            let evaluation = self.evaluator.evaluate_presynced(due, now);
            report.triggered.push(evaluation.course_id);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriggerConfig;
    use crate::error::TriggerError;
    use crate::ids::RoleSet;
    use crate::tracking::{MemoryTrackingStore, TrackingKey, TrackingRecord};
    use chrono::Duration;

    /// Has a role for even course ids, fails the lookup for course 13.
    struct EvenCoursesTaught;

    impl RoleChecker for EvenCoursesTaught {
        fn has_responsible_role(
            &self,
            course_id: CourseId,
            _roles: &RoleSet,
            _include_inherited: bool,
        ) -> Result<bool, TriggerError> {
            if course_id == CourseId(13) {
                return Err(TriggerError::RoleLookup {
                    course_id,
                    message: "timeout".to_string(),
                });
            }
            Ok(course_id.0 % 2 == 0)
        }
    }

    fn store_with_old_records(now: DateTime<Utc>) -> Arc<MemoryTrackingStore> {
        Arc::new(MemoryTrackingStore::from_records([
            TrackingRecord::new(TrackingKey::course(CourseId(3)), now - Duration::days(365)),
            TrackingRecord::new(TrackingKey::course(CourseId(4)), now - Duration::days(365)),
            TrackingRecord::new(TrackingKey::course(CourseId(5)), now - Duration::seconds(10)),
        ]))
    }

    fn population() -> Vec<CourseId> {
        (1..=5).chain([13]).map(CourseId).collect()
    }

    fn assert_same_outcome(report: &PassReport, store: &MemoryTrackingStore) {
        assert_eq!(report.triggered, vec![CourseId(3)]);
        assert_eq!(report.tracking_started, 1); // course 1
        assert_eq!(report.tracking_cleared, 1); // course 4
        assert_eq!(report.waiting, 1); // course 5
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].course_id, CourseId(13));
        assert_eq!(report.evaluated, 5);

        let tracked: Vec<_> = store.list().unwrap().iter().map(|r| r.course_id()).collect();
        assert_eq!(tracked, vec![CourseId(1), CourseId(5)]);
    }

    #[test]
    fn per_course_pass_continues_past_failures() {
        let now = Utc::now();
        let store = store_with_old_records(now);
        let pass = TriggerPass::new(
            &TriggerConfig::recommended(),
            Arc::new(EvenCoursesTaught),
            store.clone(),
        )
        .unwrap();

        let report = pass.run_at(&population(), now);
        assert_eq!(report.mode, EvaluationMode::PerCourse);
        assert_same_outcome(&report, &store);
    }

    #[test]
    fn batch_presync_pass_matches_per_course_outcome() {
        let now = Utc::now();
        let store = store_with_old_records(now);
        let config = TriggerConfig {
            mode: EvaluationMode::BatchPresync,
            ..TriggerConfig::recommended()
        };
        let pass = TriggerPass::new(&config, Arc::new(EvenCoursesTaught), store.clone()).unwrap();

        let report = pass.run_at(&population(), now);
        assert_eq!(report.mode, EvaluationMode::BatchPresync);
        assert_same_outcome(&report, &store);
    }

    #[test]
    fn config_error_is_counted_and_reported_once() {
        let now = Utc::now();
        let store = store_with_old_records(now);
        let pass = TriggerPass::new(
            &TriggerConfig::default(),
            Arc::new(EvenCoursesTaught),
            store.clone(),
        )
        .unwrap();

        let report = pass.run_at(&population(), now);
        assert!(report.triggered.is_empty());
        assert_eq!(report.config_errors, 6);
        assert_eq!(
            report.config_error.as_deref(),
            Some("no responsible roles defined")
        );
        assert!(report.failures.is_empty());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn config_error_is_logged_as_events_in_both_modes() {
        use crate::events::{LogSink, TriggerEvent};
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let now = Utc::now();
        for mode in [EvaluationMode::PerCourse, EvaluationMode::BatchPresync] {
            let log = dir.path().join(format!("{:?}.jsonl", mode));
            let mut events = EventDispatcher::new();
            events.add_sink(Box::new(LogSink::new(&log)));
            let config = TriggerConfig {
                mode,
                ..TriggerConfig::default()
            };
            let pass = TriggerPass::new(
                &config,
                Arc::new(EvenCoursesTaught),
                store_with_old_records(now),
            )
            .unwrap()
            .with_events(events);

            pass.run_at(&population(), now);

            let rejected: Vec<CourseId> = LogSink::read_all(&log)
                .unwrap()
                .into_iter()
                .map(|event| match event {
                    TriggerEvent::ConfigRejected { course_id, reason, .. } => {
                        assert_eq!(reason, "no responsible roles defined");
                        course_id
                    }
                    other => panic!("unexpected event in {:?} mode: {:?}", mode, other),
                })
                .collect();
            assert_eq!(rejected, population(), "{:?} mode", mode);
        }
    }

    #[test]
    fn unrepresentable_delay_fails_pass_construction() {
        let config = TriggerConfig {
            delay_secs: u64::MAX,
            ..TriggerConfig::recommended()
        };
        let result = TriggerPass::new(
            &config,
            Arc::new(EvenCoursesTaught),
            Arc::new(MemoryTrackingStore::new()),
        );
        assert!(matches!(result, Err(ConfigError::InvalidDelay { .. })));
    }
}
