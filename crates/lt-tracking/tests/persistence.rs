// persistence.rs — Tracking state survives between scheduler runs.

use std::sync::Arc;

use chrono::{Duration, Utc};
use lt_byrole::{
    CourseId, EvaluationResult, RoleChecker, RoleSet, TrackingKey, TrackingStore, TriggerConfig,
    TriggerError, TriggerEvaluator, TriggerSettings,
};
use lt_tracking::JsonTrackingStore;
use tempfile::tempdir;

struct NobodyTeaches;

impl RoleChecker for NobodyTeaches {
    fn has_responsible_role(
        &self,
        _course_id: CourseId,
        _roles: &RoleSet,
        _include_inherited: bool,
    ) -> Result<bool, TriggerError> {
        Ok(false)
    }
}

fn evaluator(dir: &std::path::Path) -> TriggerEvaluator {
    TriggerEvaluator::new(
        TriggerSettings::load(&TriggerConfig::recommended()).unwrap(),
        Arc::new(NobodyTeaches),
        Arc::new(JsonTrackingStore::new(dir).unwrap()),
    )
}

#[test]
fn tracking_survives_reopening_the_store() {
    let dir = tempdir().unwrap();
    let t0 = Utc::now();

    let first_run = evaluator(dir.path());
    assert_eq!(
        first_run.evaluate_at(CourseId(8), t0).unwrap(),
        EvaluationResult::Next
    );
    drop(first_run);

    let reopened = JsonTrackingStore::new(dir.path()).unwrap();
    let record = reopened
        .get(&TrackingKey::course(CourseId(8)))
        .unwrap()
        .unwrap();
    assert_eq!(record.first_missing_at, t0);

    let second_run = evaluator(dir.path());
    let after_delay = t0 + Duration::seconds(2_419_201);
    assert_eq!(
        second_run.evaluate_at(CourseId(8), after_delay).unwrap(),
        EvaluationResult::Trigger
    );
    assert!(reopened.list().unwrap().is_empty());
}
