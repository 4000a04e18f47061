//! # lt-byrole
//!
//! Course lifecycle trigger that flags courses for deletion once they have
//! been without a responsible person (a teacher, by default) for longer than
//! a configured delay.
//!
//! The [`TriggerEvaluator`] checks one course at a time: a course that loses
//! its responsible role gets a [`TrackingRecord`]; a course that stays
//! without one past the delay is reported with [`EvaluationResult::Trigger`];
//! a course that regains one is cleared. The host owns course enumeration
//! and the actual deletion. It plugs in through [`RoleChecker`],
//! [`TrackingStore`] and [`ConfigProvider`].
//!
//! ## Key invariants
//!
//! - **One record per key**: evaluating the same course twice never creates
//!   a second record; same-key evaluations over one store are serialized.
//! - **Reported once**: a course is triggered only by the evaluation whose
//!   delete actually removed its record.
//! - **Strict delay**: a record exactly `delay` old does not trigger.
//! - **Recovery wins**: regaining a role clears tracking even past the delay.
//! - **Config errors are safe**: with no responsible roles configured,
//!   evaluation returns `Next` and never touches the store.

pub mod config;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod ids;
pub mod locks;
pub mod pass;
pub mod roles;
pub mod sync;
pub mod tracking;

pub use config::{ConfigProvider, EvaluationMode, TriggerConfig, TriggerSettings};
pub use error::{ConfigError, TriggerError};
pub use evaluator::{Evaluation, EvaluationResult, Transition, TriggerEvaluator};
pub use events::{EventDispatcher, LogSink, NotificationSink, TriggerEvent};
pub use ids::{CategoryId, CourseId, RoleId, RoleSet, TriggerInstanceId};
pub use locks::{KeyGuard, KeyLocks};
pub use pass::{PassReport, TriggerPass};
pub use roles::{ContextRoleChecker, RoleChecker, RoleContext, RoleDirectory};
pub use sync::{CourseFailure, DueCourse, PopulationSync, SyncReport};
pub use tracking::{MemoryTrackingStore, TrackingKey, TrackingRecord, TrackingScope, TrackingStore};
