// evaluator.rs — Per-course trigger evaluation.
//
// `TriggerEvaluator::evaluate()` decides, for one course, whether it should
// be handed to the host for deletion. The decision is a small state machine
// over two booleans:
//
//   tracked  — a TrackingRecord exists for the course's key
//   watched  — the course lacks a responsible role (with `invert`, it has one)
//
//   tracked | watched | action                               | result
//   --------+---------+--------------------------------------+--------
//   no      | no      | none                                 | Next
//   no      | yes     | create record (first_missing_at=now) | Next
//   yes     | no      | delete record                        | Next
//   yes     | yes     | age > delay: delete record, report   | Trigger
//   yes     | yes     | otherwise none                       | Next
//
// Role recovery wins over expiry: a course that regains its role is cleared
// even when its record is already past the delay. Each call creates or
// deletes at most one record. With no responsible roles configured the
// evaluator touches nothing and returns Next.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TriggerSettings;
use crate::error::{ConfigError, TriggerError};
use crate::events::{EventDispatcher, TriggerEvent};
use crate::ids::CourseId;
use crate::roles::RoleChecker;
use crate::sync::DueCourse;
use crate::tracking::{TrackingKey, TrackingRecord, TrackingStore};

/// The outcome of one evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationResult {
    /// No action; evaluate again on a later run.
    Next,
    /// The course should proceed to deletion.
    Trigger,
}

/// What happened to the tracking state during an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    /// Not tracked and not missing a role.
    Untracked,
    /// A new tracking record was created.
    TrackingStarted,
    /// The course has a responsible role again; its record was removed.
    TrackingCleared { tracked_secs: i64 },
    /// Still missing a role, delay not yet elapsed.
    Waiting { missing_secs: i64 },
    /// Missing a role past the delay; record removed and course reported.
    Expired { missing_secs: i64 },
    /// Nothing evaluated because the configuration is unusable.
    ConfigRejected { reason: String },
    /// Reported by a batch pass after the population sync selected it.
    Presynced,
}

/// Full record of one evaluation, for logs and pass reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub course_id: CourseId,
    pub key: TrackingKey,
    pub result: EvaluationResult,
    /// `None` when the role lookup was not performed.
    pub has_role: Option<bool>,
    pub transition: Transition,
}

/// Result of applying the transition table for one course.
pub(crate) enum Reconciled {
    /// Configuration unusable; nothing was read or written.
    Rejected(ConfigError),
    Applied { has_role: bool, transition: Transition },
}

/// Evaluates courses against the run-scoped trigger settings.
///
/// The evaluator is `Sync`: one instance can evaluate many courses from
/// several threads. Same-key evaluations are serialized through the store's
/// key locks, also across evaluators sharing the store.
pub struct TriggerEvaluator {
    settings: TriggerSettings,
    roles: Arc<dyn RoleChecker>,
    store: Arc<dyn TrackingStore>,
    events: EventDispatcher,
    run_id: Uuid,
}

impl TriggerEvaluator {
    pub fn new(
        settings: TriggerSettings,
        roles: Arc<dyn RoleChecker>,
        store: Arc<dyn TrackingStore>,
    ) -> Self {
        Self {
            settings,
            roles,
            store,
            events: EventDispatcher::new(),
            run_id: Uuid::new_v4(),
        }
    }

    /// Send tracking and trigger events to `events`.
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    pub fn settings(&self) -> &TriggerSettings {
        &self.settings
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Evaluate a course now.
    pub fn evaluate(&self, course_id: CourseId) -> Result<EvaluationResult, TriggerError> {
        self.evaluate_at(course_id, Utc::now())
    }

    /// Evaluate a course as of `now`.
    pub fn evaluate_at(
        &self,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<EvaluationResult, TriggerError> {
        self.evaluate_with_trace(course_id, now).map(|e| e.result)
    }

    /// Evaluate a course and return the full trace.
    ///
    /// Store and role-lookup failures propagate; the store is left as it was
    /// before the failing operation.
    pub fn evaluate_with_trace(
        &self,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, TriggerError> {
        let key = self.settings.key_for(course_id);
        let (has_role, transition) = match self.reconcile(course_id, now)? {
            Reconciled::Applied {
                has_role,
                transition,
            } => (has_role, transition),
            Reconciled::Rejected(err) => return Ok(self.config_rejected(course_id, key, err, now)),
        };

        let result = match transition {
            Transition::Expired { missing_secs } => {
                tracing::info!(
                    run_id = %self.run_id,
                    course_id = %course_id,
                    missing_secs,
                    "course has had no responsible role past the delay; triggering"
                );
                self.events.dispatch(&TriggerEvent::CourseTriggered {
                    run_id: self.run_id,
                    course_id,
                    missing_secs,
                    timestamp: now,
                });
                EvaluationResult::Trigger
            }
            _ => EvaluationResult::Next,
        };

        tracing::debug!(
            run_id = %self.run_id,
            course_id = %course_id,
            has_role,
            ?transition,
            ?result,
            "evaluated course"
        );

        Ok(Evaluation {
            course_id,
            key,
            result,
            has_role: Some(has_role),
            transition,
        })
    }

    /// Decision for a course the population sync already selected as due.
    ///
    /// Used by batch passes only: the sync has removed the record, so the
    /// per-course decision is unconditional.
    pub fn evaluate_presynced(&self, due: &DueCourse, now: DateTime<Utc>) -> Evaluation {
        tracing::info!(
            run_id = %self.run_id,
            course_id = %due.course_id,
            missing_secs = due.missing_secs,
            "course selected by population sync; triggering"
        );
        self.events.dispatch(&TriggerEvent::CourseTriggered {
            run_id: self.run_id,
            course_id: due.course_id,
            missing_secs: due.missing_secs,
            timestamp: now,
        });
        Evaluation {
            course_id: due.course_id,
            key: self.settings.key_for(due.course_id),
            result: EvaluationResult::Trigger,
            has_role: None,
            transition: Transition::Presynced,
        }
    }

    /// Look up the role and apply the transition table to the store.
    ///
    /// Touches nothing when no responsible roles are configured. `Expired`
    /// means this call deleted the record; reporting the course is left to
    /// the caller. A record that vanished before our delete yields
    /// `Untracked`.
    pub(crate) fn reconcile(
        &self,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Reconciled, TriggerError> {
        let roles = match self.settings.roles() {
            Ok(roles) => roles,
            Err(err) => return Ok(Reconciled::Rejected(err)),
        };

        let has_role = self.roles.has_responsible_role(
            course_id,
            roles,
            self.settings.include_inherited_roles,
        )?;
        let watched = has_role == self.settings.invert;
        let key = self.settings.key_for(course_id);

        let _guard = self.store.key_locks().lock(key);
        let transition = match (self.store.get(&key)?, watched) {
            (None, false) => Transition::Untracked,
            (None, true) => {
                self.store.put(&TrackingRecord::new(key, now))?;
                tracing::info!(run_id = %self.run_id, key = %key, "started tracking course");
                self.events.dispatch(&TriggerEvent::TrackingStarted {
                    run_id: self.run_id,
                    key,
                    timestamp: now,
                });
                Transition::TrackingStarted
            }
            (Some(record), false) => {
                if !self.store.delete(&key)? {
                    return Ok(Reconciled::Applied {
                        has_role,
                        transition: self.lost_race(key),
                    });
                }
                let tracked_secs = record.age(now).num_seconds();
                tracing::info!(
                    run_id = %self.run_id,
                    key = %key,
                    tracked_secs,
                    "responsible role present again; cleared tracking"
                );
                self.events.dispatch(&TriggerEvent::TrackingCleared {
                    run_id: self.run_id,
                    key,
                    tracked_secs,
                    timestamp: now,
                });
                Transition::TrackingCleared { tracked_secs }
            }
            (Some(record), true) => {
                let missing_secs = record.age(now).num_seconds();
                if !record.is_expired(now, self.settings.delay) {
                    Transition::Waiting { missing_secs }
                } else if self.store.delete(&key)? {
                    Transition::Expired { missing_secs }
                } else {
                    self.lost_race(key)
                }
            }
        };
        Ok(Reconciled::Applied {
            has_role,
            transition,
        })
    }

    /// Another writer removed the record between our read and our delete.
    fn lost_race(&self, key: TrackingKey) -> Transition {
        tracing::warn!(
            run_id = %self.run_id,
            key = %key,
            "tracking record removed by another writer; leaving the course to it"
        );
        Transition::Untracked
    }

    pub(crate) fn emit_config_rejected(
        &self,
        course_id: CourseId,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        self.events.dispatch(&TriggerEvent::ConfigRejected {
            run_id: self.run_id,
            course_id,
            reason: reason.to_string(),
            timestamp: now,
        });
    }

    fn config_rejected(
        &self,
        course_id: CourseId,
        key: TrackingKey,
        err: ConfigError,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let reason = err.to_string();
        tracing::error!(
            run_id = %self.run_id,
            course_id = %course_id,
            "trigger configuration error: {}; course left unchanged",
            reason
        );
        self.emit_config_rejected(course_id, &reason, now);
        Evaluation {
            course_id,
            key,
            result: EvaluationResult::Next,
            has_role: None,
            transition: Transition::ConfigRejected { reason },
        }
    }
}
